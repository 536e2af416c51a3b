//! orbit_terrain - adaptive icosahedral terrain subdivision.
//!
//! A planet surface is a *subdivision skeleton*: twenty root triangles over
//! an icosahedron, each subdividable into a group of four children, repeated
//! per level as the observer approaches. The LOD controller expands and
//! contracts the skeleton while keeping the leaf mesh free of T-junctions by
//! maintaining two invariants across every shared edge:
//!
//! - **Rule A**: a non-subdivided triangle has at most one subdivided
//!   neighbor
//! - **Rule B**: subdivision depth differs by at most one level across any
//!   edge (a subdivided triangle's outward child edges require the matching
//!   neighbor to be subdivided too)
//!
//! Positions are 64-bit fixed-point (`I64Vec3`, world units shifted by
//! `2^scale`), so planet-scale distances need the overflow-safe predicate in
//! [`fixed`] - a naive squared distance overflows at this range.
//!
//! Per-frame flow: [`terrain::init_ico_terrain`] once, then
//! [`lod::update_terrain`] with the observer's [`terrain::SurfaceFrame`].

pub mod fixed;
pub mod icosahedron;
pub mod lod;
pub mod skeleton;
pub mod terrain;

pub use fixed::{absdelta, int_2pow, is_distance_near};
pub use icosahedron::{create_skeleton_icosahedron, ico_calc_middles, TerrainIco};
pub use lod::{debug_check_rules, update_terrain, update_terrain_timed, NewSubdiv, TerrainUpdate, TerrainUpdateStats};
pub use skeleton::{
  tri_group_id, tri_id, tri_sibling_index, MaybeNewId, SkeletonTriangle, SubdivSkeleton, TriGroup,
  TriGroupId, TriId, VrtxId,
};
pub use terrain::{init_ico_terrain, PerSubdivLevel, SurfaceFrame, TerrainCtx, SUBDIV_LEVELS};
