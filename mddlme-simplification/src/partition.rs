//! Spatial mesh partitioning
//!
//! Splits a mesh into the cells of a uniform grid laid over its bounding box.
//! Each face belongs to exactly one cell (the one containing its centroid);
//! vertices referenced from more than one cell are border vertices and stay
//! fixed while the cells are simplified independently.

use log::debug;
use mddlme_core::{Aabb, Drawable, Error, Point3f, Result, TriangleMesh};
use std::collections::{BTreeMap, HashMap};

/// Number of grid divisions per axis for a requested partition count:
/// the rounded cube root, never less than one.
pub fn grid_divisions(num_partitions: usize) -> usize {
    ((num_partitions as f64).cbrt().round() as usize).max(1)
}

/// Bijection between a partition's dense local vertex indices and the
/// global mesh indices they came from.
#[derive(Debug, Clone, Default)]
pub struct VertexIndexMap {
    local_to_global: Vec<usize>,
    global_to_local: HashMap<usize, usize>,
}

impl VertexIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map built from distinct global indices; local order follows `globals`.
    pub fn from_globals(globals: Vec<usize>) -> Self {
        let global_to_local = globals
            .iter()
            .enumerate()
            .map(|(local, &global)| (global, local))
            .collect();
        Self {
            local_to_global: globals,
            global_to_local,
        }
    }

    pub fn to_global(&self, local: usize) -> usize {
        self.local_to_global[local]
    }

    pub fn to_local(&self, global: usize) -> Option<usize> {
        self.global_to_local.get(&global).copied()
    }

    pub fn len(&self) -> usize {
        self.local_to_global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_to_global.is_empty()
    }

    /// Global indices in local order
    pub fn globals(&self) -> &[usize] {
        &self.local_to_global
    }
}

/// One non-empty grid cell and the faces assigned to it.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Linear cell id, `x + d * (y + d * z)`
    pub id: usize,
    pub cell: [usize; 3],
    pub bounds: Aabb,
    /// Global face indices, ascending
    pub faces: Vec<usize>,
    /// Global border vertices referenced by this partition, ascending
    pub border_vertices: Vec<usize>,
}

impl Partition {
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

/// A partition extracted as a standalone mesh in local index space.
#[derive(Debug, Clone)]
pub struct Submesh {
    pub partition_id: usize,
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub index_map: VertexIndexMap,
    /// `anchored[local]` is true for border vertices
    pub anchored: Vec<bool>,
}

impl Submesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn border_count(&self) -> usize {
        self.anchored.iter().filter(|&&a| a).count()
    }
}

/// Grid partitioner over a validated mesh.
pub struct MeshPartitioner<'a> {
    mesh: &'a TriangleMesh,
    num_partitions: usize,
}

impl<'a> MeshPartitioner<'a> {
    pub fn new(mesh: &'a TriangleMesh, num_partitions: usize) -> Result<Self> {
        if num_partitions == 0 {
            return Err(Error::InvalidParameter(
                "Number of partitions must be at least 1".to_string(),
            ));
        }
        Ok(Self { mesh, num_partitions })
    }

    /// Assign every face to a grid cell, drop empty cells and detect border
    /// vertices. Meshes with fewer occupied cells than requested silently
    /// produce fewer partitions.
    pub fn partition(&self) -> Partitioning<'a> {
        let mesh = self.mesh;
        let divisions = grid_divisions(self.num_partitions);
        let bounds = mesh.bounding_box();

        let mut cells: BTreeMap<usize, ([usize; 3], Vec<usize>)> = BTreeMap::new();
        for fi in 0..mesh.faces.len() {
            let cell = cell_of(&bounds, divisions, &mesh.face_centroid(fi));
            let id = cell[0] + divisions * (cell[1] + divisions * cell[2]);
            cells.entry(id).or_insert_with(|| (cell, Vec::new())).1.push(fi);
        }

        let mut partitions: Vec<Partition> = cells
            .into_iter()
            .map(|(id, (cell, faces))| Partition {
                id,
                cell,
                bounds: cell_bounds(&bounds, divisions, cell),
                faces,
                border_vertices: Vec::new(),
            })
            .collect();

        let border = detect_border_vertices(mesh, &partitions);
        for partition in &mut partitions {
            let mut verts: Vec<usize> = partition
                .faces
                .iter()
                .flat_map(|&fi| mesh.faces[fi])
                .filter(|&v| border[v])
                .collect();
            verts.sort_unstable();
            verts.dedup();
            partition.border_vertices = verts;
        }

        let border_count = border.iter().filter(|&&b| b).count();
        debug!(
            "Partitioned {} faces into {} cells ({}^3 grid), {} border vertices",
            mesh.faces.len(),
            partitions.len(),
            divisions,
            border_count
        );

        Partitioning {
            mesh,
            divisions,
            bounds,
            partitions,
            border,
        }
    }
}

/// The result of partitioning: non-empty partitions ordered by cell id
/// plus the global border-vertex flags.
#[derive(Debug, Clone)]
pub struct Partitioning<'a> {
    mesh: &'a TriangleMesh,
    pub divisions: usize,
    pub bounds: Aabb,
    pub partitions: Vec<Partition>,
    border: Vec<bool>,
}

impl<'a> Partitioning<'a> {
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn is_border(&self, vertex: usize) -> bool {
        self.border.get(vertex).copied().unwrap_or(false)
    }

    pub fn border_vertex_count(&self) -> usize {
        self.border.iter().filter(|&&b| b).count()
    }

    /// Renumber a partition's faces into a dense local vertex space. Local
    /// indices follow ascending global order.
    pub fn extract_submesh(&self, partition: &Partition) -> Submesh {
        let mut globals: Vec<usize> = partition
            .faces
            .iter()
            .flat_map(|&fi| self.mesh.faces[fi])
            .collect();
        globals.sort_unstable();
        globals.dedup();
        let index_map = VertexIndexMap::from_globals(globals);

        let faces: Vec<[usize; 3]> = partition
            .faces
            .iter()
            .map(|&fi| self.mesh.faces[fi].map(|v| index_map.global_to_local[&v]))
            .collect();
        let vertices = index_map
            .globals()
            .iter()
            .map(|&g| self.mesh.vertices[g])
            .collect();
        let anchored = index_map.globals().iter().map(|&g| self.border[g]).collect();

        Submesh {
            partition_id: partition.id,
            vertices,
            faces,
            index_map,
            anchored,
        }
    }

    /// Extract every partition, in partition order.
    pub fn submeshes(&self) -> Vec<Submesh> {
        self.partitions
            .iter()
            .map(|p| self.extract_submesh(p))
            .collect()
    }
}

/// Flag vertices referenced by faces of two or more partitions.
fn detect_border_vertices(mesh: &TriangleMesh, partitions: &[Partition]) -> Vec<bool> {
    let mut owner: Vec<Option<usize>> = vec![None; mesh.vertices.len()];
    let mut border = vec![false; mesh.vertices.len()];
    for partition in partitions {
        for &fi in &partition.faces {
            for v in mesh.faces[fi] {
                match owner[v] {
                    None => owner[v] = Some(partition.id),
                    Some(id) if id != partition.id => border[v] = true,
                    Some(_) => {}
                }
            }
        }
    }
    border
}

fn cell_of(bounds: &Aabb, divisions: usize, p: &Point3f) -> [usize; 3] {
    let size = bounds.size();
    let mut cell = [0usize; 3];
    for axis in 0..3 {
        let extent = size[axis] as f64;
        if extent <= 0.0 {
            continue;
        }
        let t = (p[axis] - bounds.min[axis]) as f64 / extent;
        let idx = (t * divisions as f64).floor();
        cell[axis] = if idx <= 0.0 {
            0
        } else {
            (idx as usize).min(divisions - 1)
        };
    }
    cell
}

fn cell_bounds(bounds: &Aabb, divisions: usize, cell: [usize; 3]) -> Aabb {
    let size = bounds.size();
    let mut min = bounds.min;
    let mut max = bounds.min;
    for axis in 0..3 {
        let step = size[axis] / divisions as f32;
        min[axis] = bounds.min[axis] + step * cell[axis] as f32;
        max[axis] = if cell[axis] + 1 == divisions {
            bounds.max[axis]
        } else {
            bounds.min[axis] + step * (cell[axis] + 1) as f32
        };
    }
    Aabb::new(min, max)
}
