//! Subdivision skeleton: triangles, four-child groups, and the vertex
//! subdivision tree.
//!
//! The skeleton offers topology primitives only; which triangles subdivide
//! and when is the LOD controller's business.
//!
//! Triangle ids are `group * 4 + sibling`. Edge indexing is canonical: edge
//! `e` of a triangle runs between its vertices `e` and `(e + 1) % 3`.
//! Subdividing a triangle with corner vertices `v0 v1 v2` and edge midpoints
//! `m0 m1 m2` produces four children in a fixed layout:
//!
//! ```text
//!             v0
//!             /\
//!            /c0\
//!       m2  /____\  m0
//!          /\ c3 /\
//!         /c2\  /c1\
//!        /____\/____\
//!      v2     m1     v1
//! ```
//!
//! Children 0-2 are corner children (child `i` keeps parent vertex `i`),
//! child 3 is the center. Along parent edge `e`, the two children touching
//! that edge are `e` and `(e + 1) % 3` - rule checks and cross-group
//! neighbor linking both lean on this ordering.
//!
//! Midpoint vertices are deduplicated through the subdivision tree
//! (`(min(a, b), max(a, b)) -> mid`) and reference-counted by the triangles
//! that hold them; a midpoint with no remaining triangles is evicted and its
//! id recycled.

use std::collections::HashMap;

use orbit_ids::{define_id, IdRegistry, KeyedVec};

define_id!(
  /// A skeleton vertex.
  pub struct VrtxId
);
define_id!(
  /// A skeleton triangle; `group * 4 + sibling`.
  pub struct TriId
);
define_id!(
  /// Four sibling triangles produced by one subdivision.
  pub struct TriGroupId
);

/// Triangle id of `sibling` (0..4) within a group.
#[inline]
pub fn tri_id(group: TriGroupId, sibling: usize) -> TriId {
  debug_assert!(sibling < 4);
  TriId(group.0 * 4 + sibling as u32)
}

/// Group a triangle belongs to.
#[inline]
pub fn tri_group_id(tri: TriId) -> TriGroupId {
  TriGroupId(tri.0 / 4)
}

/// Position of a triangle within its group (0..4; 3 is the center child).
#[inline]
pub fn tri_sibling_index(tri: TriId) -> usize {
  (tri.0 % 4) as usize
}

/// An id that may have just been allocated by a create-or-get operation.
#[derive(Clone, Copy, Debug)]
pub struct MaybeNewId<I> {
  pub id: I,
  pub is_new: bool,
}

/// One triangle: three vertices, up to three same-level neighbors, and an
/// optional group of four children.
#[derive(Clone, Copy, Default, Debug)]
pub struct SkeletonTriangle {
  pub vertices: [VrtxId; 3],
  pub neighbors: [Option<TriId>; 3],
  pub children: Option<TriGroupId>,
}

impl SkeletonTriangle {
  /// Which edge of `self` borders `other`, if any.
  pub fn find_neighbor_index(&self, other: TriId) -> Option<usize> {
    self.neighbors.iter().position(|&n| n == Some(other))
  }
}

/// Four sibling triangles, their parent, and their depth (0 for roots).
#[derive(Clone, Default, Debug)]
pub struct TriGroup {
  pub triangles: [SkeletonTriangle; 4],
  pub parent: Option<TriId>,
  pub depth: u8,
}

/// The two children of a group that touch one of its parent's edges.
/// `child_a` is sibling `edge`, `child_b` is sibling `(edge + 1) % 3`.
#[derive(Clone, Copy, Debug)]
pub struct EdgeChildren {
  pub child_a: TriId,
  pub child_b: TriId,
}

/// Hierarchical triangle mesh with vertex dedup and id recycling.
#[derive(Default)]
pub struct SubdivSkeleton {
  vrtx_ids: IdRegistry<VrtxId>,
  vrtx_refcount: KeyedVec<VrtxId, u32>,
  /// `Some((a, b))` for midpoints created between vertices a < b.
  vrtx_parents: KeyedVec<VrtxId, Option<(VrtxId, VrtxId)>>,
  /// Subdivision tree: ordered parent pair to the deduplicated midpoint.
  middles: HashMap<(VrtxId, VrtxId), VrtxId>,

  group_ids: IdRegistry<TriGroupId>,
  groups: KeyedVec<TriGroupId, TriGroup>,
}

impl SubdivSkeleton {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub fn vrtx_ids(&self) -> &IdRegistry<VrtxId> {
    &self.vrtx_ids
  }

  #[inline]
  pub fn tri_group_ids(&self) -> &IdRegistry<TriGroupId> {
    &self.group_ids
  }

  /// Exclusive upper bound of triangle ids; sizes side arrays and bitsets.
  #[inline]
  pub fn tri_capacity(&self) -> usize {
    self.group_ids.capacity() * 4
  }

  #[inline]
  pub fn tri_at(&self, tri: TriId) -> &SkeletonTriangle {
    debug_assert!(
      self.group_ids.exists(tri_group_id(tri)),
      "triangle id points into a freed group"
    );
    &self.groups[tri_group_id(tri)].triangles[tri_sibling_index(tri)]
  }

  pub(crate) fn tri_at_mut(&mut self, tri: TriId) -> &mut SkeletonTriangle {
    debug_assert!(
      self.group_ids.exists(tri_group_id(tri)),
      "triangle id points into a freed group"
    );
    &mut self.groups[tri_group_id(tri)].triangles[tri_sibling_index(tri)]
  }

  #[inline]
  pub fn tri_group_at(&self, group: TriGroupId) -> &TriGroup {
    debug_assert!(self.group_ids.exists(group));
    &self.groups[group]
  }

  /// Seed one vertex with no parents; used for the icosahedron corners.
  pub fn add_root_vertex(&mut self) -> VrtxId {
    let id = self.vrtx_ids.create();
    self.vrtx_refcount.resize_default(self.vrtx_ids.capacity());
    self.vrtx_parents.resize_default(self.vrtx_ids.capacity());
    self.vrtx_refcount[id] = 0;
    self.vrtx_parents[id] = None;
    id
  }

  fn vrtx_acquire(&mut self, vrtx: VrtxId) {
    self.vrtx_refcount[vrtx] += 1;
  }

  fn vrtx_release(&mut self, vrtx: VrtxId) {
    let count = &mut self.vrtx_refcount[vrtx];
    debug_assert!(*count > 0, "releasing a vertex with no references");
    *count -= 1;
    if *count == 0 {
      // Midpoints die with their last triangle; roots stay allocated
      if let Some(parents) = self.vrtx_parents[vrtx].take() {
        self.middles.remove(&parents);
        self.vrtx_ids.remove(vrtx);
      }
    }
  }

  fn vrtx_middle(&mut self, a: VrtxId, b: VrtxId) -> MaybeNewId<VrtxId> {
    let key = if a < b { (a, b) } else { (b, a) };
    if let Some(&id) = self.middles.get(&key) {
      return MaybeNewId { id, is_new: false };
    }
    let id = self.vrtx_ids.create();
    self.vrtx_refcount.resize_default(self.vrtx_ids.capacity());
    self.vrtx_parents.resize_default(self.vrtx_ids.capacity());
    self.vrtx_refcount[id] = 0;
    self.vrtx_parents[id] = Some(key);
    self.middles.insert(key, id);
    MaybeNewId { id, is_new: true }
  }

  /// Midpoints of edges `(v0, v1)`, `(v1, v2)`, `(v2, v0)`, deduplicated
  /// through the subdivision tree. Adjacent triangles sharing an edge get
  /// the same midpoint id.
  pub fn vrtx_create_middles(&mut self, corners: &[VrtxId; 3]) -> [MaybeNewId<VrtxId>; 3] {
    [
      self.vrtx_middle(corners[0], corners[1]),
      self.vrtx_middle(corners[1], corners[2]),
      self.vrtx_middle(corners[2], corners[0]),
    ]
  }

  /// Create a group holding four triangles with the given vertices.
  /// Neighbors start unset.
  pub(crate) fn tri_group_create(
    &mut self,
    depth: u8,
    parent: Option<TriId>,
    vertices: [[VrtxId; 3]; 4],
  ) -> TriGroupId {
    let group = self.group_ids.create();
    self.groups.resize_default(self.group_ids.capacity());

    let mut triangles = [SkeletonTriangle::default(); 4];
    for (tri, verts) in triangles.iter_mut().zip(vertices) {
      tri.vertices = verts;
    }
    self.groups[group] = TriGroup {
      triangles,
      parent,
      depth,
    };

    for verts in vertices {
      for vrtx in verts {
        self.vrtx_acquire(vrtx);
      }
    }
    group
  }

  /// Subdivide `tri` into four children using the given edge midpoints.
  /// Sibling links are set; outward neighbor links are the caller's job
  /// (via [`Self::tri_group_set_neighboring`] once the neighbor side is
  /// subdivided too).
  pub fn tri_subdiv(&mut self, tri: TriId, middles: [VrtxId; 3]) -> TriGroupId {
    let parent_tri = *self.tri_at(tri);
    assert!(
      parent_tri.children.is_none(),
      "subdividing a triangle that is already subdivided"
    );
    let depth = self.tri_group_at(tri_group_id(tri)).depth + 1;

    let [v0, v1, v2] = parent_tri.vertices;
    let [m0, m1, m2] = middles;

    let group = self.tri_group_create(
      depth,
      Some(tri),
      [
        [v0, m0, m2], // corner child 0
        [m0, v1, m1], // corner child 1
        [m2, m1, v2], // corner child 2
        [m0, m1, m2], // center child
      ],
    );

    // Sibling links: each corner child faces the center across the edge
    // opposite its kept corner
    let child = |sibling| tri_id(group, sibling);
    self.groups[group].triangles[0].neighbors = [None, Some(child(3)), None];
    self.groups[group].triangles[1].neighbors = [None, None, Some(child(3))];
    self.groups[group].triangles[2].neighbors = [Some(child(3)), None, None];
    self.groups[group].triangles[3].neighbors = [Some(child(1)), Some(child(2)), Some(child(0))];

    self.tri_at_mut(tri).children = Some(group);
    group
  }

  /// Link the children of two freshly adjacent subdivided triangles across
  /// their shared edge, both directions. Orientation flips across the edge,
  /// so `a`'s first child pairs with `b`'s second and vice versa.
  pub fn tri_group_set_neighboring(
    &mut self,
    (group_a, edge_a): (TriGroupId, usize),
    (group_b, edge_b): (TriGroupId, usize),
  ) -> (EdgeChildren, EdgeChildren) {
    let a = EdgeChildren {
      child_a: tri_id(group_a, edge_a),
      child_b: tri_id(group_a, (edge_a + 1) % 3),
    };
    let b = EdgeChildren {
      child_a: tri_id(group_b, edge_b),
      child_b: tri_id(group_b, (edge_b + 1) % 3),
    };

    self.tri_at_mut(a.child_a).neighbors[edge_a] = Some(b.child_b);
    self.tri_at_mut(b.child_b).neighbors[edge_b] = Some(a.child_a);
    self.tri_at_mut(a.child_b).neighbors[edge_a] = Some(b.child_a);
    self.tri_at_mut(b.child_a).neighbors[edge_b] = Some(a.child_b);

    (a, b)
  }

  /// Delete `tri`'s child group. The children must not themselves be
  /// subdivided. Outward neighbor links into the group are severed, vertex
  /// references released, and the group id recycled.
  pub fn tri_unsubdiv(&mut self, tri: TriId) {
    let group = self
      .tri_at(tri)
      .children
      .expect("un-subdividing a triangle with no children");
    let snapshot = self.groups[group].clone();

    for child in &snapshot.triangles {
      assert!(
        child.children.is_none(),
        "un-subdividing a triangle whose children are subdivided"
      );
    }

    for (sibling, child) in snapshot.triangles.iter().enumerate() {
      let child_id = tri_id(group, sibling);
      for neighbor in child.neighbors.into_iter().flatten() {
        if tri_group_id(neighbor) == group {
          continue; // sibling links die with the group
        }
        let back = self
          .tri_at(neighbor)
          .find_neighbor_index(child_id)
          .expect("neighbor links must be symmetric");
        self.tri_at_mut(neighbor).neighbors[back] = None;
      }
    }

    for child in &snapshot.triangles {
      for vrtx in child.vertices {
        self.vrtx_release(vrtx);
      }
    }

    self.tri_at_mut(tri).children = None;
    self.groups[group] = TriGroup::default();
    self.group_ids.remove(group);
  }
}

#[cfg(test)]
#[path = "skeleton_test.rs"]
mod skeleton_test;
