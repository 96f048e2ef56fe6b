//! Mesh file I/O
//!
//! Loads the input mesh and persists the simplified result. PLY is the
//! supported format (ASCII and binary read, ASCII or binary write).

pub mod ply;

pub use ply::{PlyEncoding, PlyReader, PlyWriter};

use log::info;
use mddlme_core::{Error, Result, TriangleMesh};
use mddlme_simplification::{PartitionedSimplifier, PipelineConfig, PipelineReport};
use std::path::Path;

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyReader::read_mesh(path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("ply") => PlyWriter::write_mesh(mesh, path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}

/// Read a PLY mesh, simplify it with the given pipeline settings and
/// write the result.
pub fn process_mesh_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    target_ratio: f32,
    config: PipelineConfig,
) -> Result<PipelineReport> {
    let input = input.as_ref();
    let output = output.as_ref();

    let mesh = read_mesh(input)?;
    info!(
        "Loaded {}: {} vertices, {} faces",
        input.display(),
        mesh.vertex_count(),
        mesh.face_count()
    );

    let result = PartitionedSimplifier::with_config(config).run(&mesh, target_ratio)?;
    write_mesh(&result.mesh, output)?;
    info!("Wrote {}", output.display());

    Ok(result.report)
}

/// Simplify a PLY file with default settings and `num_partitions`
/// partitions.
pub fn process_ply_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    target_ratio: f32,
    num_partitions: usize,
) -> Result<PipelineReport> {
    let config = PipelineConfig::default().with_partitions(num_partitions);
    process_mesh_file(input, output, target_ratio, config)
}
