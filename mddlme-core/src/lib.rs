//! Core data structures and traits for mddlme
//!
//! This crate provides the fundamental types shared by the partitioned
//! simplification pipeline: points, triangle meshes, axis-aligned bounds,
//! and the common error type.

pub mod point;
pub mod mesh;
pub mod bounds;
pub mod traits;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use bounds::*;
pub use traits::*;
pub use error::*;
