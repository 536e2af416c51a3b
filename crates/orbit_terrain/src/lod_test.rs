use glam::I64Vec3;

use super::*;
use crate::terrain::init_ico_terrain;

fn setup() -> (TerrainCtx, TerrainIco) {
  init_ico_terrain(50.0, 2.0, 10)
}

fn frame_at(position: I64Vec3) -> SurfaceFrame {
  SurfaceFrame {
    position,
    active: true,
  }
}

/// Observer on the surface at the north pole, in fixed-point.
fn pole_frame() -> SurfaceFrame {
  frame_at(I64Vec3::new(0, 0, 50 * 1024))
}

fn max_depth(terrain: &TerrainCtx) -> u8 {
  terrain
    .skeleton
    .tri_group_ids()
    .iter()
    .map(|group| terrain.skeleton.tri_group_at(group).depth)
    .max()
    .unwrap_or(0)
}

fn assert_neighbor_symmetry(terrain: &TerrainCtx) {
  let skeleton = &terrain.skeleton;
  for group in skeleton.tri_group_ids().iter() {
    for sibling in 0..4 {
      let sktri = tri_id(group, sibling);
      for neighbor in skeleton.tri_at(sktri).neighbors.into_iter().flatten() {
        assert!(
          skeleton.tri_at(neighbor).find_neighbor_index(sktri).is_some(),
          "{sktri:?} links to {neighbor:?} but not back"
        );
      }
    }
  }
}

fn assert_queues_empty(terrain: &TerrainCtx) {
  for level in &terrain.levels {
    assert!(level.distance_test_next.is_empty());
  }
}

/// Skeleton digest for idempotence comparison: live groups with parentage,
/// the subdivided triangle set, and the vertex count.
fn digest(terrain: &TerrainCtx) -> (Vec<(u32, Option<TriId>, u8)>, Vec<u32>, usize) {
  let skeleton = &terrain.skeleton;
  let mut groups: Vec<_> = skeleton
    .tri_group_ids()
    .iter()
    .map(|g| {
      let group = skeleton.tri_group_at(g);
      (g.0, group.parent, group.depth)
    })
    .collect();
  groups.sort();

  let mut subdivided: Vec<u32> = Vec::new();
  for g in skeleton.tri_group_ids().iter() {
    for sibling in 0..4 {
      let sktri = tri_id(g, sibling);
      if skeleton.tri_at(sktri).children.is_some() {
        subdivided.push(sktri.0);
      }
    }
  }
  subdivided.sort();

  (groups, subdivided, skeleton.vrtx_ids().count())
}

/// Seeding alone: 12 vertices, 20 root triangles, all neighbors present,
/// everything at depth 0.
#[test]
fn test_init_ico_terrain_seed() {
  let (terrain, ico) = setup();

  assert_eq!(terrain.skeleton.vrtx_ids().count(), 12);
  assert_eq!(ico.tris.len(), 20);
  assert_eq!(max_depth(&terrain), 0);
  for &tri in &ico.tris {
    assert!(terrain.skeleton.tri_at(tri).neighbors.iter().all(Option::is_some));
  }

  // Root centers were computed: the top-cap triangle center is up high
  let top_center = terrain.tri_center[ico.tris[0]];
  assert!(top_center.z > 0);
}

/// An inactive surface frame skips the update entirely.
#[test]
fn test_inactive_frame_is_noop() {
  let (mut terrain, ico) = setup();
  let frame = SurfaceFrame {
    position: I64Vec3::new(0, 0, 50 * 1024),
    active: false,
  };

  let before = digest(&terrain);
  let update = update_terrain(&mut terrain, &ico, &frame);

  assert!(update.new_subdivs.is_empty());
  assert_eq!(update.stats.distance_checks, 0);
  assert_eq!(digest(&terrain), before);
}

/// Observer on the surface: the skeleton subdivides adaptively around the
/// pole, within the level cap, and both rules hold everywhere.
#[test]
fn test_adaptive_subdivide_at_pole() {
  let (mut terrain, ico) = setup();

  let update = update_terrain(&mut terrain, &ico, &pole_frame());

  assert!(update.stats.subdivides > 0);
  assert_eq!(update.stats.subdivides, update.new_subdivs.len());

  let depth = max_depth(&terrain);
  assert!(depth >= 4, "expected deep subdivision near the pole, got {depth}");
  assert!(depth <= 8, "expansion must stop at the level cap, got {depth}");

  debug_check_rules(&terrain);
  assert_neighbor_symmetry(&terrain);
  assert_queues_empty(&terrain);

  // The pole vertex is a corner of the deepest triangles: subdivision
  // concentrated where the observer is
  let pole = ico.vrtx[0];
  let deepest = terrain
    .skeleton
    .tri_group_ids()
    .iter()
    .filter(|&g| terrain.skeleton.tri_group_at(g).depth == depth)
    .any(|g| {
      terrain
        .skeleton
        .tri_group_at(g)
        .triangles
        .iter()
        .any(|t| t.vertices.contains(&pole))
    });
  assert!(deepest, "deepest groups should touch the pole");
}

/// Re-running the update with the same observer is a fixed point.
#[test]
fn test_update_idempotent() {
  let (mut terrain, ico) = setup();
  let frame = pole_frame();

  update_terrain(&mut terrain, &ico, &frame);
  let first = digest(&terrain);

  let second_update = update_terrain(&mut terrain, &ico, &frame);

  assert!(second_update.new_subdivs.is_empty(), "second update must not subdivide");
  assert_eq!(second_update.stats.unsubdivides, 0);
  assert_eq!(digest(&terrain), first);
}

/// Moving the observer far away contracts everything back to the 20 roots
/// and releases every midpoint vertex.
#[test]
fn test_round_trip_far_observer() {
  let (mut terrain, ico) = setup();

  update_terrain(&mut terrain, &ico, &pole_frame());
  assert!(max_depth(&terrain) > 0);

  let update = update_terrain(&mut terrain, &ico, &frame_at(I64Vec3::new(0, 0, 4_000_000_000)));

  assert!(update.stats.unsubdivides > 0);
  assert_eq!(max_depth(&terrain), 0);
  assert_eq!(terrain.skeleton.tri_group_ids().count(), 5);
  assert_eq!(terrain.skeleton.vrtx_ids().count(), 12);
  for &tri in &ico.tris {
    assert!(terrain.skeleton.tri_at(tri).children.is_none());
  }
  debug_check_rules(&terrain);
  assert_neighbor_symmetry(&terrain);
}

/// Rules and symmetry hold across a sequence of observer motions, including
/// partial contraction at mid-range.
#[test]
fn test_rules_hold_as_observer_moves() {
  let (mut terrain, ico) = setup();

  let positions = [
    I64Vec3::new(0, 0, 50 * 1024),      // on the pole
    I64Vec3::new(0, 0, 80 * 1024),      // backing away
    I64Vec3::new(36_000, 0, 36_000),    // mid-latitude, on the sphere-ish
    I64Vec3::new(0, 0, 400 * 1024),     // distant
    I64Vec3::new(0, 0, -50 * 1024),     // south pole
  ];

  for position in positions {
    update_terrain(&mut terrain, &ico, &frame_at(position));
    debug_check_rules(&terrain);
    assert_neighbor_symmetry(&terrain);
    assert_queues_empty(&terrain);
  }
}

/// The timed wrapper fills in wall-clock stats.
#[test]
fn test_update_timed() {
  let (mut terrain, ico) = setup();
  let update = update_terrain_timed(&mut terrain, &ico, &pole_frame());
  assert!(update.stats.subdivides > 0);
}
