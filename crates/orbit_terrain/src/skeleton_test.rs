use glam::{I64Vec3, Vec3};
use orbit_ids::KeyedVec;

use super::*;
use crate::icosahedron::create_skeleton_icosahedron;

fn make_ico() -> (SubdivSkeleton, [TriId; 20]) {
  let mut positions: KeyedVec<VrtxId, I64Vec3> = KeyedVec::new();
  let mut normals: KeyedVec<VrtxId, Vec3> = KeyedVec::new();
  let (skeleton, _vrtx, _groups, tris) =
    create_skeleton_icosahedron(50.0, 10, &mut positions, &mut normals);
  (skeleton, tris)
}

fn subdiv(skeleton: &mut SubdivSkeleton, tri: TriId) -> ([MaybeNewId<VrtxId>; 3], TriGroupId) {
  let corners = skeleton.tri_at(tri).vertices;
  let middles = skeleton.vrtx_create_middles(&corners);
  let group = skeleton.tri_subdiv(tri, [middles[0].id, middles[1].id, middles[2].id]);
  (middles, group)
}

fn assert_neighbor_symmetry(skeleton: &SubdivSkeleton) {
  for group in skeleton.tri_group_ids().iter() {
    for sibling in 0..4 {
      let sktri = tri_id(group, sibling);
      for neighbor in skeleton.tri_at(sktri).neighbors.into_iter().flatten() {
        let back = skeleton.tri_at(neighbor).find_neighbor_index(sktri);
        assert!(
          back.is_some(),
          "{sktri:?} links to {neighbor:?} but not back"
        );
      }
    }
  }
}

/// Children keep the canonical layout: corner child i holds parent vertex i,
/// the center child holds the three midpoints.
#[test]
fn test_subdiv_child_layout() {
  let (mut skeleton, tris) = make_ico();
  let parent = tris[0];
  let [v0, v1, v2] = skeleton.tri_at(parent).vertices;

  let (middles, group) = subdiv(&mut skeleton, parent);
  let [m0, m1, m2] = [middles[0].id, middles[1].id, middles[2].id];

  assert_eq!(skeleton.tri_at(parent).children, Some(group));
  let g = skeleton.tri_group_at(group);
  assert_eq!(g.parent, Some(parent));
  assert_eq!(g.depth, 1);

  assert_eq!(g.triangles[0].vertices, [v0, m0, m2]);
  assert_eq!(g.triangles[1].vertices, [m0, v1, m1]);
  assert_eq!(g.triangles[2].vertices, [m2, m1, v2]);
  assert_eq!(g.triangles[3].vertices, [m0, m1, m2]);

  // Sibling links: corner children face the center, which faces them back
  let child = |i| tri_id(group, i);
  assert_eq!(g.triangles[0].neighbors, [None, Some(child(3)), None]);
  assert_eq!(g.triangles[1].neighbors, [None, None, Some(child(3))]);
  assert_eq!(g.triangles[2].neighbors, [Some(child(3)), None, None]);
  assert_eq!(
    g.triangles[3].neighbors,
    [Some(child(1)), Some(child(2)), Some(child(0))]
  );
}

/// Adjacent triangles get the same midpoint id for their shared edge.
#[test]
fn test_midpoint_dedup_across_shared_edge() {
  let (mut skeleton, tris) = make_ico();
  let a = tris[0];
  let b = skeleton.tri_at(a).neighbors[0].unwrap();
  let edge_b = skeleton.tri_at(b).find_neighbor_index(a).unwrap();

  let (middles_a, _) = subdiv(&mut skeleton, a);
  let (middles_b, _) = subdiv(&mut skeleton, b);

  assert!(middles_a[0].is_new);
  assert!(!middles_b[edge_b].is_new, "shared midpoint must deduplicate");
  assert_eq!(middles_a[0].id, middles_b[edge_b].id);

  // 3 + 3 midpoints, one shared
  assert_eq!(skeleton.vrtx_ids().count(), 12 + 5);
}

/// Cross-group links after both sides subdivide are symmetric and pair the
/// reversed-orientation children.
#[test]
fn test_group_set_neighboring() {
  let (mut skeleton, tris) = make_ico();
  let a = tris[0];
  let b = skeleton.tri_at(a).neighbors[0].unwrap();
  let edge_a = 0;
  let edge_b = skeleton.tri_at(b).find_neighbor_index(a).unwrap();

  let (_, group_a) = subdiv(&mut skeleton, a);
  let (_, group_b) = subdiv(&mut skeleton, b);

  let (ec_a, ec_b) = skeleton.tri_group_set_neighboring((group_a, edge_a), (group_b, edge_b));

  assert_eq!(skeleton.tri_at(ec_a.child_a).neighbors[edge_a], Some(ec_b.child_b));
  assert_eq!(skeleton.tri_at(ec_b.child_b).neighbors[edge_b], Some(ec_a.child_a));
  assert_eq!(skeleton.tri_at(ec_a.child_b).neighbors[edge_a], Some(ec_b.child_a));
  assert_eq!(skeleton.tri_at(ec_b.child_a).neighbors[edge_b], Some(ec_a.child_b));

  // Paired children actually share both endpoints of the split edge
  let va = skeleton.tri_at(ec_a.child_a).vertices;
  let vb = skeleton.tri_at(ec_b.child_b).vertices;
  let shared: Vec<_> = va.iter().filter(|v| vb.contains(v)).collect();
  assert_eq!(shared.len(), 2);

  assert_neighbor_symmetry(&skeleton);
}

/// Un-subdividing releases midpoints back to the registry and severs links
/// from the neighbor's children.
#[test]
fn test_unsubdiv_releases_and_severs() {
  let (mut skeleton, tris) = make_ico();
  let a = tris[0];
  let b = skeleton.tri_at(a).neighbors[0].unwrap();
  let edge_b = skeleton.tri_at(b).find_neighbor_index(a).unwrap();

  let (_, group_a) = subdiv(&mut skeleton, a);
  let (_, group_b) = subdiv(&mut skeleton, b);
  skeleton.tri_group_set_neighboring((group_a, 0), (group_b, edge_b));

  skeleton.tri_unsubdiv(a);

  assert_eq!(skeleton.tri_at(a).children, None);
  // b's own link to a is untouched; only child links were severed
  assert_eq!(skeleton.tri_at(b).neighbors[edge_b], Some(a));
  for sibling in [edge_b, (edge_b + 1) % 3] {
    let child = tri_id(group_b, sibling);
    assert_eq!(skeleton.tri_at(child).neighbors[edge_b], None);
  }

  // The shared midpoint survives through b's children; a's two private
  // midpoints were freed
  assert_eq!(skeleton.vrtx_ids().count(), 12 + 3);

  skeleton.tri_unsubdiv(b);
  assert_eq!(skeleton.vrtx_ids().count(), 12);
  assert_eq!(skeleton.tri_group_ids().count(), 5);
  assert_neighbor_symmetry(&skeleton);
}

/// Freed group and vertex ids are recycled by later subdivisions.
#[test]
fn test_ids_recycle_after_unsubdiv() {
  let (mut skeleton, tris) = make_ico();
  let a = tris[0];

  let (_, group_first) = subdiv(&mut skeleton, a);
  skeleton.tri_unsubdiv(a);
  let capacity_groups = skeleton.tri_group_ids().capacity();
  let capacity_vrtx = skeleton.vrtx_ids().capacity();

  let (_, group_second) = subdiv(&mut skeleton, a);
  assert_eq!(group_first, group_second);
  assert_eq!(skeleton.tri_group_ids().capacity(), capacity_groups);
  assert_eq!(skeleton.vrtx_ids().capacity(), capacity_vrtx);
}

/// A parent whose child is itself subdivided cannot be un-subdivided.
#[test]
#[should_panic]
fn test_unsubdiv_with_subdivided_child_panics() {
  let (mut skeleton, tris) = make_ico();
  let a = tris[0];
  let (_, group) = subdiv(&mut skeleton, a);
  subdiv(&mut skeleton, tri_id(group, 0));

  skeleton.tri_unsubdiv(a);
}

/// Subdividing twice is a caller bug.
#[test]
#[should_panic]
fn test_double_subdiv_panics() {
  let (mut skeleton, tris) = make_ico();
  subdiv(&mut skeleton, tris[0]);
  subdiv(&mut skeleton, tris[0]);
}
