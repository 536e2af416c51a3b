//! Terrain context: skeleton plus per-vertex/per-triangle arrays and the
//! per-level LOD bookkeeping.

use glam::{I64Vec3, Vec3};
use orbit_ids::{BitVec, KeyedVec};

use crate::fixed::int_2pow;
use crate::icosahedron::{
  create_skeleton_icosahedron, TerrainIco, ICO_TOWER_OVER_HORIZON_VS_LEVEL,
};
use crate::skeleton::{tri_id, SubdivSkeleton, TriGroupId, TriId, VrtxId};

/// Subdivision levels tracked by the controller (0 = roots).
pub const SUBDIV_LEVELS: usize = 10;

/// Per-level bookkeeping for the LOD controller.
#[derive(Default)]
pub struct PerSubdivLevel {
  /// Triangles of this level, not subdivided, with at least one subdivided
  /// neighbor.
  pub has_subdived_neighbor: BitVec,
  /// Triangles of this level, subdivided, with at least one non-subdivided
  /// neighbor. Bits may outlive the condition; they only seed distance
  /// tests that re-verify the actual state.
  pub has_nonsubdived_neighbor: BitVec,
  pub distance_test_processing: Vec<TriId>,
  pub distance_test_next: Vec<TriId>,
}

/// All mutable terrain state for one planet.
pub struct TerrainCtx {
  pub skeleton: SubdivSkeleton,
  /// Fixed-point vertex positions (world units shifted by `2^scale`).
  pub positions: KeyedVec<VrtxId, I64Vec3>,
  /// Outward unit normals per vertex.
  pub normals: KeyedVec<VrtxId, Vec3>,
  /// Per-triangle distance-test centers, biased toward the max-height
  /// midpoint of the terrain above the flat triangle.
  pub tri_center: KeyedVec<TriId, I64Vec3>,
  pub levels: [PerSubdivLevel; SUBDIV_LEVELS],
  /// Lowest level that still needs an expansion pass.
  pub level_need_process: usize,
  /// Power-of-two shift from float world units to fixed-point.
  pub scale: u8,
}

/// Observer position in the planet's fixed-point frame.
#[derive(Clone, Copy, Default, Debug)]
pub struct SurfaceFrame {
  pub position: I64Vec3,
  pub active: bool,
}

/// Seed a planet: icosahedron skeleton, vertex arrays, and root triangle
/// centers. `height` is the maximum terrain displacement above the sphere.
pub fn init_ico_terrain(radius: f32, height: f32, scale: u8) -> (TerrainCtx, TerrainIco) {
  let mut positions = KeyedVec::new();
  let mut normals = KeyedVec::new();
  let (skeleton, vrtx, groups, tris) =
    create_skeleton_icosahedron(radius, scale, &mut positions, &mut normals);

  let mut terrain = TerrainCtx {
    skeleton,
    positions,
    normals,
    tri_center: KeyedVec::new(),
    levels: Default::default(),
    level_need_process: 0,
    scale,
  };
  terrain.tri_center.resize_default(terrain.skeleton.tri_capacity());

  let ico = TerrainIco {
    radius,
    height,
    vrtx,
    groups,
    tris,
  };
  for group in ico.groups {
    calculate_centers(group, &mut terrain, radius + height, height);
  }

  (terrain, ico)
}

/// Compute distance-test centers for the four triangles of a group.
///
/// The center is the integer average of the three corners (per-component
/// thirds, no overflow) plus a rise along the summed normal to the midpoint
/// of the terrain's height range over this level.
pub fn calculate_centers(
  group: TriGroupId,
  terrain: &mut TerrainCtx,
  max_radius: f32,
  height: f32,
) {
  let depth = terrain.skeleton.tri_group_at(group).depth as usize;

  for sibling in 0..4 {
    let sktri = tri_id(group, sibling);
    let [va, vb, vc] = terrain.skeleton.tri_group_at(group).triangles[sibling].vertices;

    let pos_avg =
      terrain.positions[va] / 3 + terrain.positions[vb] / 3 + terrain.positions[vc] / 3;
    let nrm_sum = terrain.normals[va] + terrain.normals[vb] + terrain.normals[vc];

    let terrain_max_height = height + max_radius * ICO_TOWER_OVER_HORIZON_VS_LEVEL[depth];

    // 0.5 * terrain_max_height: halve for the midpoint
    // int_2pow(scale): fixed-point conversion
    // / 3.0: the normal sum is three unit vectors
    let rise = nrm_sum * (0.5 * terrain_max_height * int_2pow(terrain.scale) as f32 / 3.0);

    terrain.tri_center[sktri] =
      pos_avg + I64Vec3::new(rise.x as i64, rise.y as i64, rise.z as i64);
  }
}
