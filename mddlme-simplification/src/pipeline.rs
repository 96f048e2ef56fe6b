//! Partition, simplify and merge
//!
//! The full pipeline: validate the input, split it into grid partitions
//! (border detection completes before any partition is simplified), run the
//! local simplifier once per partition and weld the results.

use crate::lme::{LmeConfig, LmeSimplifier};
use crate::merge::{BorderMatching, MergeStats, MeshMerger, PartitionResult};
use crate::parallel::ParallelConfig;
use crate::partition::MeshPartitioner;
use crate::MeshSimplifier;
use log::{debug, info, warn};
use mddlme_core::{Error, Result, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Default number of requested partitions
pub const DEFAULT_NUM_PARTITIONS: usize = 8;

/// Configuration for the partitioned simplification pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Requested partition count, rounded to a cubic grid
    pub num_partitions: usize,
    /// Settings for each partition's simplifier
    pub lme: LmeConfig,
    /// How border vertices are recovered at merge time
    pub border_matching: BorderMatching,
    pub parallel: ParallelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_partitions: DEFAULT_NUM_PARTITIONS,
            lme: LmeConfig::default(),
            border_matching: BorderMatching::default(),
            parallel: ParallelConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partitions(mut self, num_partitions: usize) -> Self {
        self.num_partitions = num_partitions;
        self
    }

    pub fn with_lme(mut self, lme: LmeConfig) -> Self {
        self.lme = lme;
        self
    }

    pub fn with_border_matching(mut self, matching: BorderMatching) -> Self {
        self.border_matching = matching;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Per-partition counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    pub partition_id: usize,
    pub input_vertices: usize,
    pub input_faces: usize,
    pub border_vertices: usize,
    pub output_vertices: usize,
    pub output_faces: usize,
    pub collapses: usize,
    /// Whether the partition reached its vertex target
    pub target_reached: bool,
}

/// Summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub input_vertices: usize,
    pub input_faces: usize,
    pub output_vertices: usize,
    pub output_faces: usize,
    /// Grid divisions per axis
    pub divisions: usize,
    /// Distinct border vertices before simplification
    pub border_vertices: usize,
    pub partitions: Vec<PartitionReport>,
    pub merge: MergeStats,
    /// Wall-clock time in seconds
    pub processing_time: f32,
}

impl PipelineReport {
    /// Partitions that stopped before reaching their target
    pub fn short_partitions(&self) -> impl Iterator<Item = &PartitionReport> {
        self.partitions.iter().filter(|p| !p.target_reached)
    }

    /// Output vertex count relative to the input
    pub fn vertex_ratio(&self) -> f32 {
        if self.input_vertices == 0 {
            1.0
        } else {
            self.output_vertices as f32 / self.input_vertices as f32
        }
    }
}

/// Result of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub mesh: TriangleMesh,
    pub report: PipelineReport,
}

/// Partitioned, border-preserving simplifier
#[derive(Debug, Clone, Default)]
pub struct PartitionedSimplifier {
    pub config: PipelineConfig,
}

impl PartitionedSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline and report what each stage did.
    pub fn run(&self, mesh: &TriangleMesh, target_ratio: f32) -> Result<PipelineOutput> {
        let start_time = Instant::now();

        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        if target_ratio.is_nan() || target_ratio <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "Target ratio must be in (0, 1], got {}",
                target_ratio
            )));
        }
        mesh.validate()?;

        let partitioning = MeshPartitioner::new(mesh, self.config.num_partitions)?.partition();
        let submeshes = partitioning.submeshes();
        info!(
            "Split {} vertices / {} faces into {} partitions ({} border vertices)",
            mesh.vertex_count(),
            mesh.face_count(),
            partitioning.len(),
            partitioning.border_vertex_count()
        );

        let simplifier = LmeSimplifier::with_config(self.config.lme.clone());
        let parts: Vec<PartitionResult> = self.config.parallel.try_map(&submeshes, |submesh| {
            let simplified = simplifier.simplify_submesh(submesh, target_ratio)?;
            Ok(PartitionResult {
                submesh: submesh.clone(),
                simplified,
            })
        })?;

        let partition_reports: Vec<PartitionReport> = parts
            .iter()
            .map(|part| {
                let report = PartitionReport {
                    partition_id: part.submesh.partition_id,
                    input_vertices: part.submesh.vertex_count(),
                    input_faces: part.submesh.face_count(),
                    border_vertices: part.submesh.border_count(),
                    output_vertices: part.simplified.vertex_count(),
                    output_faces: part.simplified.face_count(),
                    collapses: part.simplified.collapses,
                    target_reached: part.simplified.target_reached,
                };
                debug!(
                    "Partition {}: {} -> {} vertices, {} -> {} faces ({} border)",
                    report.partition_id,
                    report.input_vertices,
                    report.output_vertices,
                    report.input_faces,
                    report.output_faces,
                    report.border_vertices
                );
                if !report.target_reached {
                    warn!(
                        "Partition {} stopped at {} vertices before reaching its target",
                        report.partition_id, report.output_vertices
                    );
                }
                report
            })
            .collect();

        let merger = MeshMerger::new(self.config.border_matching);
        let (merged, merge_stats) = merger.merge(&parts)?;

        let report = PipelineReport {
            input_vertices: mesh.vertex_count(),
            input_faces: mesh.face_count(),
            output_vertices: merged.vertex_count(),
            output_faces: merged.face_count(),
            divisions: partitioning.divisions,
            border_vertices: partitioning.border_vertex_count(),
            partitions: partition_reports,
            merge: merge_stats,
            processing_time: start_time.elapsed().as_secs_f32(),
        };
        info!(
            "Simplified to {} vertices / {} faces ({:.1}% of input vertices) in {:.3}s",
            report.output_vertices,
            report.output_faces,
            100.0 * report.vertex_ratio(),
            report.processing_time
        );

        Ok(PipelineOutput {
            mesh: merged,
            report,
        })
    }
}

impl MeshSimplifier for PartitionedSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, target_ratio: f32) -> Result<TriangleMesh> {
        self.run(mesh, target_ratio).map(|out| out.mesh)
    }
}

/// Simplify a mesh with default settings and the given partition count.
pub fn simplify_mesh_with_partitioning(
    mesh: &TriangleMesh,
    target_ratio: f32,
    num_partitions: usize,
) -> Result<TriangleMesh> {
    let config = PipelineConfig::default().with_partitions(num_partitions);
    PartitionedSimplifier::with_config(config).simplify(mesh, target_ratio)
}
