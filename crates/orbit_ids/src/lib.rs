//! orbit_ids - dense integer handles and the containers built around them.
//!
//! Both sandbox cores (the task executor and the terrain skeleton) replace
//! pointer graphs with small integer handles into arena-style arrays. This
//! crate provides the three primitives they share:
//!
//! - [`IdRegistry`]: allocates dense ids and recycles freed ones
//! - [`KeyedVec`]: a `Vec` indexed by an id type instead of `usize`
//! - [`BitVec`]: a growable bitset with an iterator over set bits
//!
//! Handles are declared with [`define_id!`], which generates a `u32` newtype
//! implementing [`Id`]. Structures hold ids, never references, so they stay
//! valid across array growth.

pub mod bitvec;
pub mod keyed;
pub mod registry;

pub use bitvec::BitVec;
pub use keyed::KeyedVec;
pub use registry::{Id, IdRegistry};
