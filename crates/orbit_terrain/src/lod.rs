//! LOD controller: contract then expand the skeleton around the observer.
//!
//! One [`update_terrain`] call runs two phases:
//!
//! 1. **Contract**, deepest level first. Floodfill-collect subdivided
//!    triangles that drifted past the un-subdivide threshold, re-add the
//!    ones whose removal would violate rule A or rule B, then delete the
//!    rest.
//! 2. **Expand**, level 0 upward. Distance-test each level's queue against
//!    the subdivide threshold; subdividing can recursively force neighbor
//!    subdivisions (rule A) and parent-neighbor subdivisions one level down
//!    (rule B), which re-enters lower levels through `level_need_process`.
//!
//! The subdivide threshold is ~75% of the level's edge length (a good-enough
//! bounding sphere); the un-subdivide threshold is 50% beyond that, so
//! triangles don't flap at the boundary. Both phases share one
//! distance-test-done bitset so no triangle is tested twice per phase.

use std::mem;

use glam::I64Vec3;
use orbit_ids::{BitVec, Id};
use smallvec::SmallVec;
use web_time::Instant;

use crate::fixed::{int_2pow, is_distance_near};
use crate::icosahedron::{ico_calc_middles, TerrainIco, ICO_MAX_EDGE_VS_LEVEL};
use crate::skeleton::{
  tri_group_id, tri_id, tri_sibling_index, MaybeNewId, SubdivSkeleton, TriGroupId, TriId, VrtxId,
};
use crate::terrain::{calculate_centers, SurfaceFrame, TerrainCtx, SUBDIV_LEVELS};

/// Expansion stops queueing children past this level.
pub const MAX_EXPAND_LEVEL: usize = 8;

/// One subdivision performed during an update; downstream geometry
/// consumers read these.
#[derive(Clone, Copy, Debug)]
pub struct NewSubdiv {
  pub corners: [VrtxId; 3],
  pub middles: [MaybeNewId<VrtxId>; 3],
  pub tri: TriId,
  pub group: TriGroupId,
}

/// Counters from one update.
#[derive(Clone, Copy, Default, Debug)]
pub struct TerrainUpdateStats {
  pub distance_checks: usize,
  pub levels_processed: usize,
  pub subdivides: usize,
  pub unsubdivides: usize,
  pub total_us: u64,
}

/// Result of one update.
#[derive(Default)]
pub struct TerrainUpdate {
  pub new_subdivs: Vec<NewSubdiv>,
  pub stats: TerrainUpdateStats,
}

#[derive(Default)]
struct SubdivScratch {
  new_subdivs: Vec<NewSubdiv>,
  distance_test_done: BitVec,
  stats: TerrainUpdateStats,
}

/// Run one full LOD update for the given observer. No-op while the surface
/// frame is inactive.
pub fn update_terrain(
  terrain: &mut TerrainCtx,
  ico: &TerrainIco,
  frame: &SurfaceFrame,
) -> TerrainUpdate {
  if !frame.active {
    return TerrainUpdate::default();
  }

  let mut scratch = SubdivScratch::default();
  scratch.distance_test_done.resize(terrain.skeleton.tri_capacity());

  contract_levels(terrain, ico, frame, &mut scratch);
  if cfg!(debug_assertions) {
    debug_check_rules(terrain);
  }

  scratch.distance_test_done.clear();
  expand_levels(terrain, ico, frame, &mut scratch);
  if cfg!(debug_assertions) {
    debug_check_rules(terrain);
  }

  tracing::debug!(
    distance_checks = scratch.stats.distance_checks,
    subdivides = scratch.stats.subdivides,
    unsubdivides = scratch.stats.unsubdivides,
    "terrain update"
  );

  TerrainUpdate {
    new_subdivs: scratch.new_subdivs,
    stats: scratch.stats,
  }
}

/// [`update_terrain`] plus wall-clock time in the stats.
pub fn update_terrain_timed(
  terrain: &mut TerrainCtx,
  ico: &TerrainIco,
  frame: &SurfaceFrame,
) -> TerrainUpdate {
  let start = Instant::now();
  let mut update = update_terrain(terrain, ico, frame);
  update.stats.total_us = start.elapsed().as_micros() as u64;
  update
}

// =============================================================================
// Phase 1: contract
// =============================================================================

/// Queue a triangle for the contraction distance test if it qualifies: not
/// yet tested, subdivided, and none of its children subdivided.
fn maybe_distance_check(
  terrain: &mut TerrainCtx,
  scratch: &mut SubdivScratch,
  level: usize,
  sktri: TriId,
) {
  if scratch.distance_test_done.test(sktri.index()) {
    return;
  }
  let Some(children) = terrain.skeleton.tri_at(sktri).children else {
    return; // must be subdivided to be un-subdividable
  };
  let group = terrain.skeleton.tri_group_at(children);
  if group.triangles.iter().any(|tri| tri.children.is_some()) {
    return; // children must go first
  }

  terrain.levels[level].distance_test_next.push(sktri);
  scratch.distance_test_done.set(sktri.index());
}

/// Would removing `sktri`'s children violate rule A or rule B, pretending
/// every candidate not yet re-added is already gone?
fn unsubdiv_violates_rules(
  skeleton: &SubdivSkeleton,
  try_unsubdiv: &BitVec,
  cant_unsubdiv: &BitVec,
  sktri: TriId,
) -> bool {
  let tri = *skeleton.tri_at(sktri);
  let mut subdived_neighbors = 0;

  for neighbor in tri.neighbors.into_iter().flatten() {
    let Some(neighbor_children) = skeleton.tri_at(neighbor).children else {
      continue;
    };
    // Candidates count as removed unless already re-added
    if try_unsubdiv.test(neighbor.index()) && !cant_unsubdiv.test(neighbor.index()) {
      continue;
    }
    subdived_neighbors += 1;

    // Rule B: the neighbor's two children along the shared edge would be
    // left pointing at nothing one level deeper
    let neighbor_edge = skeleton
      .tri_at(neighbor)
      .find_neighbor_index(sktri)
      .expect("neighbor links must be symmetric");
    let neighbor_group = skeleton.tri_group_at(neighbor_children);
    if neighbor_group.triangles[neighbor_edge].children.is_some()
      || neighbor_group.triangles[(neighbor_edge + 1) % 3].children.is_some()
    {
      return true;
    }
  }

  // Rule A
  subdived_neighbors >= 2
}

/// Re-add `sktri` if its removal breaks the rules, then recheck candidate
/// neighbors whose verdict may have depended on it.
fn readd_violations_recurse(
  skeleton: &SubdivSkeleton,
  try_unsubdiv: &BitVec,
  cant_unsubdiv: &mut BitVec,
  sktri: TriId,
) {
  if !unsubdiv_violates_rules(skeleton, try_unsubdiv, cant_unsubdiv, sktri) {
    return;
  }
  cant_unsubdiv.set(sktri.index());

  let tri = *skeleton.tri_at(sktri);
  for neighbor in tri.neighbors.into_iter().flatten() {
    if try_unsubdiv.test(neighbor.index()) && !cant_unsubdiv.test(neighbor.index()) {
      readd_violations_recurse(skeleton, try_unsubdiv, cant_unsubdiv, neighbor);
    }
  }
}

/// Delete one triangle's children and clear the freed ids from the next
/// level's bookkeeping.
fn apply_unsubdiv(terrain: &mut TerrainCtx, level: usize, sktri: TriId) {
  let capacity = terrain.skeleton.tri_capacity();
  let group = terrain.skeleton.tri_at(sktri).children
    .expect("contraction candidates are subdivided");

  let next_level = &mut terrain.levels[level + 1];
  next_level.has_subdived_neighbor.resize(capacity);
  next_level.has_nonsubdived_neighbor.resize(capacity);
  for sibling in 0..4 {
    let child = tri_id(group, sibling);
    next_level.has_subdived_neighbor.reset(child.index());
    next_level.has_nonsubdived_neighbor.reset(child.index());
  }

  terrain.skeleton.tri_unsubdiv(sktri);

  let lvl = &mut terrain.levels[level];
  lvl.has_subdived_neighbor.resize(capacity);
  lvl.has_nonsubdived_neighbor.resize(capacity);
  lvl.has_nonsubdived_neighbor.reset(sktri.index());
}

/// After a batch of un-subdivisions, rebuild the neighbor bookkeeping
/// around each removed triangle so later passes can still find the
/// remaining subdivided neighbors.
fn reseed_unsubdivided(terrain: &mut TerrainCtx, level: usize, applied: &[TriId]) {
  for &sktri in applied {
    let neighbors = terrain.skeleton.tri_at(sktri).neighbors;
    let mut any_subdived = false;

    for neighbor in neighbors.into_iter().flatten() {
      if terrain.skeleton.tri_at(neighbor).children.is_some() {
        any_subdived = true;
        terrain.levels[level].has_nonsubdived_neighbor.set(neighbor.index());
      } else {
        let neighbor_tri = *terrain.skeleton.tri_at(neighbor);
        let still_has_subdived = neighbor_tri
          .neighbors
          .into_iter()
          .flatten()
          .any(|other| terrain.skeleton.tri_at(other).children.is_some());
        if !still_has_subdived {
          terrain.levels[level].has_subdived_neighbor.reset(neighbor.index());
        }
      }
    }

    if any_subdived {
      terrain.levels[level].has_subdived_neighbor.set(sktri.index());
    } else {
      terrain.levels[level].has_subdived_neighbor.reset(sktri.index());
    }
  }
}

fn contract_levels(
  terrain: &mut TerrainCtx,
  ico: &TerrainIco,
  frame: &SurfaceFrame,
  scratch: &mut SubdivScratch,
) {
  let capacity = terrain.skeleton.tri_capacity();
  let mut try_unsubdiv = BitVec::new();
  let mut cant_unsubdiv = BitVec::new();
  try_unsubdiv.resize(capacity);
  cant_unsubdiv.resize(capacity);

  for level in (0..SUBDIV_LEVELS).rev() {
    // Un-subdivide threshold sits 50% past the subdivide threshold
    let bound_radius = ICO_MAX_EDGE_VS_LEVEL[level] as f64 * ico.radius as f64 * 0.75 * 1.5;
    let bound = (bound_radius * int_2pow(terrain.scale) as f64) as u64;

    debug_assert!(terrain.levels[level].distance_test_next.is_empty());

    // Step 1: floodfill-select candidates past the threshold, seeded from
    // subdivided triangles known to border non-subdivided ones
    let seeds: Vec<usize> = terrain.levels[level].has_nonsubdived_neighbor.ones().collect();
    for seed in seeds {
      maybe_distance_check(terrain, scratch, level, TriId::from_index(seed));
    }

    while !terrain.levels[level].distance_test_next.is_empty() {
      {
        let lvl = &mut terrain.levels[level];
        mem::swap(&mut lvl.distance_test_processing, &mut lvl.distance_test_next);
        lvl.distance_test_next.clear();
      }
      let processing = mem::take(&mut terrain.levels[level].distance_test_processing);

      for &sktri in &processing {
        debug_assert!(
          terrain.skeleton.tri_at(sktri).children.is_some(),
          "non-subdivided triangles must not be distance-tested for contraction"
        );
        let center = terrain.tri_center[sktri];
        scratch.stats.distance_checks += 1;

        if !is_distance_near(frame.position, center, bound) {
          try_unsubdiv.set(sktri.index());

          // Floodfill into subdivided neighbors
          let neighbors = terrain.skeleton.tri_at(sktri).neighbors;
          for neighbor in neighbors.into_iter().flatten() {
            maybe_distance_check(terrain, scratch, level, neighbor);
          }
        }
      }
      terrain.levels[level].distance_test_processing = processing;
    }

    // Step 2: pretend every candidate is removed, then re-add the ones
    // whose removal breaks rule A or rule B
    let candidates: Vec<usize> = try_unsubdiv.ones().collect();
    for &candidate in &candidates {
      if !cant_unsubdiv.test(candidate) {
        readd_violations_recurse(
          &terrain.skeleton,
          &try_unsubdiv,
          &mut cant_unsubdiv,
          TriId::from_index(candidate),
        );
      }
    }

    // Step 3: apply
    let mut applied: SmallVec<[TriId; 16]> = SmallVec::new();
    for candidate in candidates {
      if !cant_unsubdiv.test(candidate) {
        let sktri = TriId::from_index(candidate);
        apply_unsubdiv(terrain, level, sktri);
        applied.push(sktri);
        scratch.stats.unsubdivides += 1;
      }
    }
    reseed_unsubdivided(terrain, level, &applied);

    try_unsubdiv.clear();
    cant_unsubdiv.clear();
  }

  scratch.distance_test_done.clear();
}

// =============================================================================
// Phase 2: expand
// =============================================================================

/// Subdivide one triangle and restore the invariants around it, recursing
/// into neighbors (rule A) and parent neighbors one level down (rule B).
fn subdivide(
  terrain: &mut TerrainCtx,
  ico: &TerrainIco,
  scratch: &mut SubdivScratch,
  sktri: TriId,
  level: usize,
) {
  let tri = *terrain.skeleton.tri_at(sktri);
  assert!(tri.children.is_none(), "triangle is already subdivided");
  let corners = tri.vertices;
  let neighbors = tri.neighbors;

  let middles = terrain.skeleton.vrtx_create_middles(&corners);
  let group = terrain
    .skeleton
    .tri_subdiv(sktri, [middles[0].id, middles[1].id, middles[2].id]);

  let tri_capacity = terrain.skeleton.tri_capacity();
  let vrtx_capacity = terrain.skeleton.vrtx_ids().capacity();
  scratch.distance_test_done.resize(tri_capacity);
  terrain.levels[level].has_subdived_neighbor.resize(tri_capacity);
  terrain.levels[level].has_nonsubdived_neighbor.resize(tri_capacity);
  terrain.levels[level + 1].has_subdived_neighbor.resize(tri_capacity);
  terrain.positions.resize_default(vrtx_capacity);
  terrain.normals.resize_default(vrtx_capacity);
  terrain.tri_center.resize_default(tri_capacity);

  ico_calc_middles(
    ico.radius,
    terrain.scale,
    &corners,
    &middles,
    &mut terrain.positions,
    &mut terrain.normals,
  );
  calculate_centers(group, terrain, ico.radius + ico.height, ico.height);

  scratch.new_subdivs.push(NewSubdiv {
    corners,
    middles,
    tri: sktri,
    group,
  });
  scratch.stats.subdivides += 1;

  terrain.levels[level].has_subdived_neighbor.reset(sktri.index());

  // Link or mark each of the three neighbors
  let mut has_nonsubdived_neighbor = false;
  for edge in 0..3 {
    let Some(neighbor) = neighbors[edge] else {
      continue; // settled by the rule pass below
    };

    if let Some(neighbor_group) = terrain.skeleton.tri_at(neighbor).children {
      let neighbor_edge = terrain
        .skeleton
        .tri_at(neighbor)
        .find_neighbor_index(sktri)
        .expect("neighbor links must be symmetric");

      let (self_edge, other_edge) = terrain
        .skeleton
        .tri_group_set_neighboring((group, edge), (neighbor_group, neighbor_edge));

      // Our new children may immediately border subdivided grandchildren
      if terrain.skeleton.tri_at(other_edge.child_b).children.is_some() {
        terrain.levels[level + 1].has_subdived_neighbor.set(self_edge.child_a.index());
      }
      if terrain.skeleton.tri_at(other_edge.child_a).children.is_some() {
        terrain.levels[level + 1].has_subdived_neighbor.set(self_edge.child_b.index());
      }
    } else {
      has_nonsubdived_neighbor = true;
      terrain.levels[level].has_subdived_neighbor.set(neighbor.index());
    }
  }

  if has_nonsubdived_neighbor {
    terrain.levels[level].has_nonsubdived_neighbor.set(sktri.index());
  } else {
    terrain.levels[level].has_nonsubdived_neighbor.reset(sktri.index());
  }

  // Rule pass; can subdivide further triangles immediately
  for edge in 0..3 {
    match terrain.skeleton.tri_at(sktri).neighbors[edge] {
      Some(neighbor) => {
        if terrain.skeleton.tri_at(neighbor).children.is_some() {
          continue;
        }
        // Rule A: the neighbor may not keep two subdivided neighbors
        let neighbor_neighbors = terrain.skeleton.tri_at(neighbor).neighbors;
        let other_subdivided = neighbor_neighbors.into_iter().flatten().any(|other| {
          other != sktri && terrain.skeleton.tri_at(other).children.is_some()
        });

        if other_subdivided {
          subdivide(terrain, ico, scratch, neighbor, level);
          scratch.distance_test_done.resize(terrain.skeleton.tri_capacity());
          scratch.distance_test_done.set(neighbor.index());
        } else if !scratch.distance_test_done.test(neighbor.index()) {
          terrain.levels[level].distance_test_next.push(neighbor);
          scratch.distance_test_done.set(neighbor.index());
        }
      }
      None => {
        // Rule B: this edge leaves the parent, so the parent's neighbor
        // there must be subdivided to provide ours
        debug_assert!(
          tri_sibling_index(sktri) != 3,
          "center children are surrounded by their siblings"
        );
        assert!(level != 0, "root triangles always have neighbors");

        let parent = terrain
          .skeleton
          .tri_group_at(tri_group_id(sktri))
          .parent
          .expect("non-root triangles have a parent");
        let parent_neighbor = terrain.skeleton.tri_at(parent).neighbors[edge]
          .expect("parent triangle must have a neighbor along this edge");

        // Queues distance tests one level down
        subdivide(terrain, ico, scratch, parent_neighbor, level - 1);
        scratch.distance_test_done.resize(terrain.skeleton.tri_capacity());
        scratch.distance_test_done.set(parent_neighbor.index());

        terrain.level_need_process = terrain.level_need_process.min(level - 1);
      }
    }
  }
}

/// Drain one level's distance-test queue, subdividing near triangles and
/// queueing their children for the next level. Re-enters lower levels
/// whenever a rule B fixup rewinds `level_need_process`.
fn subdivide_level(
  terrain: &mut TerrainCtx,
  ico: &TerrainIco,
  scratch: &mut SubdivScratch,
  frame_position: I64Vec3,
  level: usize,
) {
  debug_assert!(level + 1 < SUBDIV_LEVELS);
  debug_assert_eq!(level, terrain.level_need_process);

  // A good-enough bounding sphere is ~75% of the edge length
  let bound_radius = ICO_MAX_EDGE_VS_LEVEL[level] as f64 * ico.radius as f64 * 0.75;
  let bound = (bound_radius * int_2pow(terrain.scale) as f64) as u64;

  while !terrain.levels[level].distance_test_next.is_empty() {
    {
      let lvl = &mut terrain.levels[level];
      mem::swap(&mut lvl.distance_test_processing, &mut lvl.distance_test_next);
      lvl.distance_test_next.clear();
    }
    scratch.distance_test_done.resize(terrain.skeleton.tri_capacity());
    terrain.tri_center.resize_default(terrain.skeleton.tri_capacity());

    let processing = mem::take(&mut terrain.levels[level].distance_test_processing);
    for &sktri in &processing {
      debug_assert!(scratch.distance_test_done.test(sktri.index()));
      let center = terrain.tri_center[sktri];
      scratch.stats.distance_checks += 1;

      if is_distance_near(frame_position, center, bound) {
        if terrain.skeleton.tri_at(sktri).children.is_none() {
          subdivide(terrain, ico, scratch, sktri, level);
        }
        let children = terrain
          .skeleton
          .tri_at(sktri)
          .children
          .expect("near triangles are subdivided by now");

        if level != MAX_EXPAND_LEVEL {
          scratch.distance_test_done.resize(terrain.skeleton.tri_capacity());
          for sibling in 0..4 {
            let child = tri_id(children, sibling);
            terrain.levels[level + 1].distance_test_next.push(child);
            scratch.distance_test_done.set(child.index());
          }
        }
      }

      // Settle rule B work queued on lower levels before moving on
      while terrain.level_need_process != level {
        let lower = terrain.level_need_process;
        subdivide_level(terrain, ico, scratch, frame_position, lower);
      }
    }
    terrain.levels[level].distance_test_processing = processing;
  }

  debug_assert_eq!(level, terrain.level_need_process);
  terrain.level_need_process += 1;
  scratch.stats.levels_processed += 1;
}

fn expand_levels(
  terrain: &mut TerrainCtx,
  ico: &TerrainIco,
  frame: &SurfaceFrame,
  scratch: &mut SubdivScratch,
) {
  scratch.distance_test_done.resize(terrain.skeleton.tri_capacity());
  for &sktri in &ico.tris {
    terrain.levels[0].distance_test_next.push(sktri);
    scratch.distance_test_done.set(sktri.index());
  }
  terrain.level_need_process = 0;

  for level in 0..SUBDIV_LEVELS - 1 {
    if level > 7 {
      terrain.levels[level].distance_test_next.clear();
    }
    subdivide_level(terrain, ico, scratch, frame.position, level);

    if cfg!(debug_assertions) {
      for lower in 0..=level {
        debug_assert!(terrain.levels[lower].distance_test_next.is_empty());
      }
    }
  }
}

// =============================================================================
// Invariant checking
// =============================================================================

/// Walk every live triangle and panic on a rule A or rule B violation, or
/// on stale neighbor links.
pub fn debug_check_rules(terrain: &TerrainCtx) {
  let skeleton = &terrain.skeleton;

  for group in skeleton.tri_group_ids().iter() {
    for sibling in 0..4 {
      let sktri = tri_id(group, sibling);
      let tri = skeleton.tri_at(sktri);
      if tri.children.is_some() {
        continue;
      }

      let mut subdived_neighbors = 0;
      for edge in 0..3 {
        match tri.neighbors[edge] {
          Some(neighbor) => {
            if skeleton.tri_at(neighbor).children.is_some() {
              subdived_neighbors += 1;
            }
          }
          None => {
            // A missing neighbor is only legal when the parent's neighbor
            // along this edge exists and is not subdivided (otherwise a
            // link should have been made)
            let parent = skeleton
              .tri_group_at(group)
              .parent
              .expect("root triangles have all three neighbors");
            let Some(parent_neighbor) = skeleton.tri_at(parent).neighbors[edge] else {
              panic!("rule B violation: missing neighbor and missing parent neighbor");
            };
            assert!(
              skeleton.tri_at(parent_neighbor).children.is_none(),
              "stale neighbor links: parent's neighbor is subdivided but no child link exists"
            );
          }
        }
      }

      assert!(
        subdived_neighbors < 2,
        "rule A violation: {subdived_neighbors} subdivided neighbors"
      );
    }
  }
}

#[cfg(test)]
#[path = "lod_test.rs"]
mod lod_test;
