//! Recombination of independently simplified partitions
//!
//! Every partition comes back in its own local index space. The merger
//! recovers which surviving vertices are border vertices, gives each border
//! identity exactly one slot in the output, appends interior vertices per
//! partition and rewrites all faces into the shared index space.

use crate::lme::SimplifiedSubmesh;
use crate::partition::Submesh;
use log::{debug, warn};
use mddlme_core::{Error, Point3f, Result, TriangleMesh};
use rstar::RTree;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default distance below which a simplified vertex is matched to an
/// original border vertex in proximity mode.
pub const DEFAULT_MATCH_TOLERANCE: f32 = 1e-5;

/// How surviving vertices are identified with original border vertices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BorderMatching {
    /// Follow the `source` index each surviving vertex carries.
    Identity,
    /// Nearest original border position within `tolerance`.
    Proximity { tolerance: f32 },
}

impl Default for BorderMatching {
    fn default() -> Self {
        BorderMatching::Identity
    }
}

impl BorderMatching {
    pub fn proximity() -> Self {
        BorderMatching::Proximity {
            tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }
}

/// One partition ready for merging: the extracted submesh and what the
/// simplifier made of it.
#[derive(Debug, Clone)]
pub struct PartitionResult {
    pub submesh: Submesh,
    pub simplified: SimplifiedSubmesh,
}

/// Counters describing a merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Distinct border identities in the output
    pub border_vertices: usize,
    /// Interior vertices appended from all partitions
    pub interior_vertices: usize,
    pub faces: usize,
    /// Local vertices that matched a border identity already claimed in
    /// the same partition
    pub ambiguous_matches: usize,
    /// Original border vertices no surviving vertex was identified with
    pub unmatched_border: usize,
    /// Border identities whose position differs between partitions
    pub displaced_border: usize,
}

/// Original border vertex stored in the proximity index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BorderSample {
    position: Point3f,
    global: usize,
}

impl rstar::Point for BorderSample {
    type Scalar = f32;
    const DIMENSIONS: usize = 3;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        Self {
            position: Point3f::new(generator(0), generator(1), generator(2)),
            global: usize::MAX,
        }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.position[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.position[index]
    }
}

/// Welds simplified partitions back into one mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshMerger {
    pub matching: BorderMatching,
}

impl MeshMerger {
    pub fn new(matching: BorderMatching) -> Self {
        Self { matching }
    }

    /// Merge partitions in the given order. Border slots come first, in
    /// ascending global index, followed by each partition's interior
    /// vertices.
    pub fn merge(&self, parts: &[PartitionResult]) -> Result<(TriangleMesh, MergeStats)> {
        let mut stats = MergeStats::default();

        let mut identities = Vec::with_capacity(parts.len());
        for part in parts {
            check_consistency(part)?;
            identities.push(self.identify_border(part, &mut stats));
        }

        // One slot per border identity; first partition wins the position.
        let mut border: BTreeMap<usize, Point3f> = BTreeMap::new();
        for (part, ids) in parts.iter().zip(&identities) {
            for (local, id) in ids.iter().enumerate() {
                let Some(global) = *id else { continue };
                let position = part.simplified.vertices[local];
                match border.get(&global) {
                    None => {
                        border.insert(global, position);
                    }
                    Some(existing) if *existing != position => {
                        stats.displaced_border += 1;
                        let distance = (existing - position).norm();
                        if let BorderMatching::Proximity { tolerance } = self.matching {
                            if distance > tolerance {
                                warn!(
                                    "Border vertex {} differs by {:.3e} between partitions",
                                    global, distance
                                );
                            }
                        }
                    }
                    Some(_) => {}
                }
            }
        }

        let mut vertices: Vec<Point3f> = Vec::with_capacity(border.len());
        let mut border_slot: HashMap<usize, usize> = HashMap::with_capacity(border.len());
        for (global, position) in &border {
            border_slot.insert(*global, vertices.len());
            vertices.push(*position);
        }
        stats.border_vertices = border.len();

        let mut faces = Vec::new();
        for (part, ids) in parts.iter().zip(&identities) {
            let slots: Vec<usize> = ids
                .iter()
                .enumerate()
                .map(|(local, id)| match id {
                    Some(global) => border_slot[global],
                    None => {
                        vertices.push(part.simplified.vertices[local]);
                        stats.interior_vertices += 1;
                        vertices.len() - 1
                    }
                })
                .collect();
            faces.extend(part.simplified.faces.iter().map(|f| f.map(|v| slots[v])));
        }
        stats.faces = faces.len();

        if stats.ambiguous_matches > 0 || stats.unmatched_border > 0 {
            warn!(
                "Merge finished with {} ambiguous and {} unmatched border vertices",
                stats.ambiguous_matches, stats.unmatched_border
            );
        }
        debug!(
            "Merged {} partitions: {} border + {} interior vertices, {} faces",
            parts.len(),
            stats.border_vertices,
            stats.interior_vertices,
            stats.faces
        );

        Ok((TriangleMesh::from_vertices_and_faces(vertices, faces), stats))
    }

    /// Global border identity of each surviving local vertex, if any.
    fn identify_border(&self, part: &PartitionResult, stats: &mut MergeStats) -> Vec<Option<usize>> {
        let submesh = &part.submesh;
        let simplified = &part.simplified;

        let mut ids: Vec<Option<usize>> = match self.matching {
            BorderMatching::Identity => simplified
                .source
                .iter()
                .map(|&src| submesh.anchored[src].then(|| submesh.index_map.to_global(src)))
                .collect(),
            BorderMatching::Proximity { tolerance } => {
                let samples: Vec<BorderSample> = (0..submesh.vertex_count())
                    .filter(|&local| submesh.anchored[local])
                    .map(|local| BorderSample {
                        position: submesh.vertices[local],
                        global: submesh.index_map.to_global(local),
                    })
                    .collect();
                let tree = RTree::bulk_load(samples);
                simplified
                    .vertices
                    .iter()
                    .map(|p| {
                        let query = BorderSample {
                            position: *p,
                            global: usize::MAX,
                        };
                        tree.nearest_neighbor(&query)
                            .filter(|s| (s.position - p).norm() < tolerance)
                            .map(|s| s.global)
                    })
                    .collect()
            }
        };

        let mut claimed: HashMap<usize, usize> = HashMap::new();
        for (local, id) in ids.iter_mut().enumerate() {
            let Some(global) = *id else { continue };
            if let Some(&first) = claimed.get(&global) {
                warn!(
                    "Partition {}: vertices {} and {} both match border vertex {}",
                    submesh.partition_id, first, local, global
                );
                stats.ambiguous_matches += 1;
                *id = None;
            } else {
                claimed.insert(global, local);
            }
        }

        let unmatched = submesh.border_count() - claimed.len();
        if unmatched > 0 {
            debug!(
                "Partition {}: {} border vertices without a surviving match",
                submesh.partition_id, unmatched
            );
            stats.unmatched_border += unmatched;
        }
        ids
    }
}

fn check_consistency(part: &PartitionResult) -> Result<()> {
    let submesh = &part.submesh;
    let simplified = &part.simplified;
    if simplified.source.len() != simplified.vertices.len() {
        return Err(Error::InvalidData(format!(
            "Partition {}: {} source indices for {} vertices",
            submesh.partition_id,
            simplified.source.len(),
            simplified.vertices.len()
        )));
    }
    if simplified.source.iter().any(|&src| src >= submesh.vertex_count()) {
        return Err(Error::InvalidData(format!(
            "Partition {}: source index out of range",
            submesh.partition_id
        )));
    }
    let n = simplified.vertices.len();
    if simplified.faces.iter().any(|f| f.iter().any(|&v| v >= n)) {
        return Err(Error::InvalidData(format!(
            "Partition {}: face index out of range",
            submesh.partition_id
        )));
    }
    Ok(())
}
