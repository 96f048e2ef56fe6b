//! Partitioned mesh simplification
//!
//! This crate reduces triangle meshes by quadric edge collapse, one spatial
//! partition at a time:
//! - Quadric error model
//! - Grid partitioning with border-vertex detection
//! - Local border-preserving edge collapse (LME)
//! - Merging of simplified partitions into one mesh

pub mod quadric;
pub mod partition;
pub mod lme;
pub mod merge;
pub mod parallel;
pub mod pipeline;

pub use quadric::*;
pub use partition::*;
pub use lme::*;
pub use merge::*;
pub use parallel::*;
pub use pipeline::*;

use mddlme_core::{TriangleMesh, Result};

/// Simplify a mesh by reducing its vertex count
pub trait MeshSimplifier {
    /// Simplify mesh toward `target_ratio`, the fraction of vertices to retain
    /// (values of 1.0 or more leave the mesh unchanged).
    fn simplify(&self, mesh: &TriangleMesh, target_ratio: f32) -> Result<TriangleMesh>;
}
