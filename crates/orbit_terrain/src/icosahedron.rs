//! Icosahedron seeding and per-level geometric constants.
//!
//! Twelve vertices Blender-style: a vertex on top, one on the bottom, and a
//! sandwich of two pentagons each `1/sqrt(5)` above/below the origin. The
//! pentagon "radius" is `2/5 * sqrt(5)` of the sphere radius so the corners
//! stay at unit distance. Constants follow the regular-pentagon equations
//! (c1, c2, s1, s2) multiplied through:
//!
//! ```text
//! pnt = 2/5 * sqrt(5)
//! hei = 1 / sqrt(5)
//! cxA = 1/2 - sqrt(5)/10          syA = sqrt(10 * (5 + sqrt(5))) / 10
//! cxB = 1/2 + sqrt(5)/10          syB = sqrt(10 * (5 - sqrt(5))) / 10
//! ```
//!
//! Twenty root triangles in five depth-0 groups. Neighbor wiring is derived
//! from shared vertex pairs at seeding time rather than kept as a second
//! table that could drift from the triangle list.

use glam::{DVec3, I64Vec3, Vec3};
use orbit_ids::KeyedVec;

use crate::fixed::int_2pow;
use crate::skeleton::{tri_id, MaybeNewId, SubdivSkeleton, TriGroupId, TriId, VrtxId};

pub const ICO_VRTX_COUNT: usize = 12;
pub const ICO_TRI_COUNT: usize = 20;
pub const ICO_GROUP_COUNT: usize = 5;

/// Triangle corners: top cap, middle band, bottom cap. Winding faces
/// outward; only edge-sharing consistency is load-bearing here.
const ICO_TRI_LUT: [[u8; 3]; ICO_TRI_COUNT] = [
  [0, 2, 1],
  [0, 3, 2],
  [0, 4, 3],
  [0, 5, 4],
  [0, 1, 5],
  [8, 1, 2],
  [2, 7, 8],
  [7, 2, 3],
  [3, 6, 7],
  [6, 3, 4],
  [4, 10, 6],
  [10, 4, 5],
  [5, 9, 10],
  [9, 5, 1],
  [1, 8, 9],
  [11, 7, 6],
  [11, 8, 7],
  [11, 9, 8],
  [11, 10, 9],
  [11, 6, 10],
];

/// Longest triangle edge at each subdivision level, as a fraction of the
/// sphere radius. Level 0 is the icosahedron edge `4 / sqrt(10 + 2*sqrt(5))`;
/// each subdivision at most halves it.
pub const ICO_MAX_EDGE_VS_LEVEL: [f32; 10] = [
  1.0514622,
  0.5257311,
  0.26286554,
  0.13143277,
  0.065716386,
  0.032858193,
  0.016429096,
  0.008214548,
  0.004107274,
  0.002053637,
];

/// How far the sphere surface rises above a flat triangle of each level, as
/// a fraction of the radius (sagitta over the triangle's circumscribed arc).
pub const ICO_TOWER_OVER_HORIZON_VS_LEVEL: [f32; 10] = [
  0.20534,
  0.047178,
  0.0115835,
  0.0028832,
  0.00072003,
  0.00017996,
  0.000044986,
  0.000011246,
  0.0000028116,
  0.0000007029,
];

/// Root skeleton handles plus the planet's shape parameters.
pub struct TerrainIco {
  pub radius: f32,
  pub height: f32,
  pub vrtx: [VrtxId; ICO_VRTX_COUNT],
  pub groups: [TriGroupId; ICO_GROUP_COUNT],
  pub tris: [TriId; ICO_TRI_COUNT],
}

fn icosahedron_vertices(radius: f64) -> [DVec3; ICO_VRTX_COUNT] {
  let pnt = radius * (2.0 / 5.0 * 5.0f64.sqrt());
  let hei = radius * (1.0 / 5.0f64.sqrt());
  let cx_a = radius * (0.5 - 5.0f64.sqrt() / 10.0);
  let cx_b = radius * (0.5 + 5.0f64.sqrt() / 10.0);
  let sy_a = radius * ((10.0 * (5.0 + 5.0f64.sqrt())).sqrt() / 10.0);
  let sy_b = radius * ((10.0 * (5.0 - 5.0f64.sqrt())).sqrt() / 10.0);

  [
    DVec3::new(0.0, 0.0, radius), // top point
    DVec3::new(pnt, 0.0, hei),    // top pentagon
    DVec3::new(cx_a, -sy_a, hei),
    DVec3::new(-cx_b, -sy_b, hei),
    DVec3::new(-cx_b, sy_b, hei),
    DVec3::new(cx_a, sy_a, hei),
    DVec3::new(-pnt, 0.0, -hei), // bottom pentagon
    DVec3::new(-cx_a, -sy_a, -hei),
    DVec3::new(cx_b, -sy_b, -hei),
    DVec3::new(cx_b, sy_b, -hei),
    DVec3::new(-cx_a, sy_a, -hei),
    DVec3::new(0.0, 0.0, -radius), // bottom point
  ]
}

fn shared_edge(a: [VrtxId; 3], b: [VrtxId; 3]) -> Option<(usize, usize)> {
  for edge_a in 0..3 {
    let pair_a = (a[edge_a], a[(edge_a + 1) % 3]);
    for edge_b in 0..3 {
      let pair_b = (b[edge_b], b[(edge_b + 1) % 3]);
      if pair_a == (pair_b.1, pair_b.0) || pair_a == pair_b {
        return Some((edge_a, edge_b));
      }
    }
  }
  None
}

/// Seed the skeleton: 12 corner vertices and 20 root triangles with full
/// neighbor wiring. Fixed-point positions and unit normals are written into
/// the given arrays.
pub fn create_skeleton_icosahedron(
  radius: f32,
  scale: u8,
  positions: &mut KeyedVec<VrtxId, I64Vec3>,
  normals: &mut KeyedVec<VrtxId, Vec3>,
) -> (
  SubdivSkeleton,
  [VrtxId; ICO_VRTX_COUNT],
  [TriGroupId; ICO_GROUP_COUNT],
  [TriId; ICO_TRI_COUNT],
) {
  let mut skeleton = SubdivSkeleton::new();

  let vrtx: [VrtxId; ICO_VRTX_COUNT] = std::array::from_fn(|_| skeleton.add_root_vertex());

  positions.resize_default(skeleton.vrtx_ids().capacity());
  normals.resize_default(skeleton.vrtx_ids().capacity());
  let corners = icosahedron_vertices(radius as f64);
  let factor = int_2pow(scale) as f64;
  for (i, corner) in corners.iter().enumerate() {
    positions[vrtx[i]] = (*corner * factor).as_i64vec3();
    normals[vrtx[i]] = (*corner / radius as f64).as_vec3();
  }

  let groups: [TriGroupId; ICO_GROUP_COUNT] = std::array::from_fn(|g| {
    let vertices: [[VrtxId; 3]; 4] = std::array::from_fn(|i| {
      let corners = ICO_TRI_LUT[g * 4 + i];
      [
        vrtx[corners[0] as usize],
        vrtx[corners[1] as usize],
        vrtx[corners[2] as usize],
      ]
    });
    skeleton.tri_group_create(0, None, vertices)
  });

  let tris: [TriId; ICO_TRI_COUNT] = std::array::from_fn(|i| tri_id(groups[i / 4], i % 4));

  // Wire neighbors from shared vertex pairs
  for a in 0..ICO_TRI_COUNT {
    for b in (a + 1)..ICO_TRI_COUNT {
      let verts_a = skeleton.tri_at(tris[a]).vertices;
      let verts_b = skeleton.tri_at(tris[b]).vertices;
      if let Some((edge_a, edge_b)) = shared_edge(verts_a, verts_b) {
        skeleton.tri_at_mut(tris[a]).neighbors[edge_a] = Some(tris[b]);
        skeleton.tri_at_mut(tris[b]).neighbors[edge_b] = Some(tris[a]);
      }
    }
  }
  for &tri in &tris {
    assert!(
      skeleton.tri_at(tri).neighbors.iter().all(Option::is_some),
      "icosahedron root triangles must have all three neighbors"
    );
  }

  (skeleton, vrtx, groups, tris)
}

/// Write positions and normals for newly created edge midpoints: the chord
/// midpoint projected onto the sphere of radius `radius * 2^scale`, with the
/// outward unit normal. Midpoints that already existed keep their values.
pub fn ico_calc_middles(
  radius: f32,
  scale: u8,
  corners: &[VrtxId; 3],
  middles: &[MaybeNewId<VrtxId>; 3],
  positions: &mut KeyedVec<VrtxId, I64Vec3>,
  normals: &mut KeyedVec<VrtxId, Vec3>,
) {
  let scaled_radius = radius as f64 * int_2pow(scale) as f64;

  for edge in 0..3 {
    let middle = middles[edge];
    if !middle.is_new {
      continue;
    }
    let a = positions[corners[edge]].as_dvec3();
    let b = positions[corners[(edge + 1) % 3]].as_dvec3();
    let avg = (a + b) * 0.5;
    let length = avg.length();

    positions[middle.id] = (avg * (scaled_radius / length)).as_i64vec3();
    normals[middle.id] = (avg / length).as_vec3();
  }
}

#[cfg(test)]
#[path = "icosahedron_test.rs"]
mod icosahedron_test;
