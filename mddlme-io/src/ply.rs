//! PLY format support

use crate::{MeshReader, MeshWriter};
use log::debug;
use mddlme_core::{Error, Point3f, Result, TriangleMesh};
use ply_rs::{
    parser::Parser,
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub struct PlyReader;
pub struct PlyWriter;

/// On-disk encoding used when writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlyEncoding {
    #[default]
    Ascii,
    BinaryLittleEndian,
}

impl From<PlyEncoding> for Encoding {
    fn from(encoding: PlyEncoding) -> Self {
        match encoding {
            PlyEncoding::Ascii => Encoding::Ascii,
            PlyEncoding::BinaryLittleEndian => Encoding::BinaryLittleEndian,
        }
    }
}

impl MeshReader for PlyReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        // Header and payload, ASCII or binary
        let parser = Parser::<DefaultElement>::new();
        let ply = parser.read_ply(&mut reader)?;

        let mut vertices = Vec::new();
        if let Some(vertex_element) = ply.payload.get("vertex") {
            vertices.reserve(vertex_element.len());
            for vertex in vertex_element {
                let x = extract_property_value(vertex, "x")?;
                let y = extract_property_value(vertex, "y")?;
                let z = extract_property_value(vertex, "z")?;
                vertices.push(Point3f::new(x, y, z));
            }
        }

        let mut faces = Vec::new();
        if let Some(face_element) = ply.payload.get("face") {
            faces.reserve(face_element.len());
            for (fi, face) in face_element.iter().enumerate() {
                let indices = extract_face_indices(face)?;
                match indices.as_slice() {
                    &[a, b, c] => faces.push([a, b, c]),
                    other => {
                        return Err(Error::InvalidData(format!(
                            "Face {} has {} vertices; only triangles are supported",
                            fi,
                            other.len()
                        )))
                    }
                }
            }
        }

        debug!("Read PLY mesh: {} vertices, {} faces", vertices.len(), faces.len());
        Ok(TriangleMesh::from_vertices_and_faces(vertices, faces))
    }
}

impl MeshWriter for PlyWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        Self::write_mesh_encoded(mesh, path, PlyEncoding::Ascii)
    }
}

impl PlyWriter {
    /// Write a mesh with an explicit encoding.
    pub fn write_mesh_encoded<P: AsRef<Path>>(
        mesh: &TriangleMesh,
        path: P,
        encoding: PlyEncoding,
    ) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = encoding.into();

        // Define vertex element
        let mut vertex_element = ElementDef::new("vertex".to_string());
        vertex_element.count = mesh.vertices.len();
        for name in ["x", "y", "z"] {
            vertex_element.properties.add(PropertyDef::new(
                name.to_string(),
                PropertyType::Scalar(ScalarType::Float),
            ));
        }
        ply.header.elements.add(vertex_element);

        // Define face element
        let mut face_element = ElementDef::new("face".to_string());
        face_element.count = mesh.faces.len();
        face_element.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face_element);

        let vertices = mesh
            .vertices
            .iter()
            .map(|vertex| {
                let mut element = DefaultElement::new();
                element.insert("x".to_string(), Property::Float(vertex.x));
                element.insert("y".to_string(), Property::Float(vertex.y));
                element.insert("z".to_string(), Property::Float(vertex.z));
                element
            })
            .collect();
        ply.payload.insert("vertex".to_string(), vertices);

        let mut faces = Vec::with_capacity(mesh.faces.len());
        for face in &mesh.faces {
            let indices = face
                .iter()
                .map(|&v| {
                    i32::try_from(v).map_err(|_| {
                        Error::InvalidData(format!("Vertex index {} does not fit a PLY int", v))
                    })
                })
                .collect::<Result<Vec<i32>>>()?;
            let mut element = DefaultElement::new();
            element.insert("vertex_indices".to_string(), Property::ListInt(indices));
            faces.push(element);
        }
        ply.payload.insert("face".to_string(), faces);

        let writer_instance = Writer::new();
        writer_instance.write_ply(&mut writer, &mut ply)?;
        writer.flush()?;

        Ok(())
    }
}

/// Extract a property value as f32 from a PLY element
fn extract_property_value(element: &DefaultElement, name: &str) -> Result<f32> {
    match element.get(name) {
        Some(Property::Float(val)) => Ok(*val),
        Some(Property::Double(val)) => Ok(*val as f32),
        Some(Property::Int(val)) => Ok(*val as f32),
        Some(Property::UInt(val)) => Ok(*val as f32),
        Some(Property::Short(val)) => Ok(*val as f32),
        Some(Property::UShort(val)) => Ok(*val as f32),
        _ => Err(Error::InvalidData(format!(
            "Property '{}' not found or invalid type",
            name
        ))),
    }
}

fn to_index<T: TryInto<usize> + Copy + std::fmt::Display>(idx: T) -> Result<usize> {
    idx.try_into()
        .map_err(|_| Error::InvalidData(format!("Invalid face index {}", idx)))
}

/// Extract face indices from a PLY face element
fn extract_face_indices(element: &DefaultElement) -> Result<Vec<usize>> {
    match element.get("vertex_indices").or_else(|| element.get("vertex_index")) {
        Some(Property::ListInt(indices)) => indices.iter().map(|&i| to_index(i)).collect(),
        Some(Property::ListUInt(indices)) => indices.iter().map(|&i| to_index(i)).collect(),
        Some(Property::ListShort(indices)) => indices.iter().map(|&i| to_index(i)).collect(),
        Some(Property::ListUShort(indices)) => indices.iter().map(|&i| to_index(i)).collect(),
        Some(Property::ListUChar(indices)) => indices.iter().map(|&i| to_index(i)).collect(),
        _ => Err(Error::InvalidData("Face indices not found".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_quad() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.5),
                Point3f::new(0.0, 1.0, -0.25),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_ascii_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quad.ply");
        let mesh = make_quad();
        PlyWriter::write_mesh(&mesh, &path).unwrap();
        let loaded = PlyReader::read_mesh(&path).unwrap();
        assert_eq!(loaded, mesh);
    }

    #[test]
    fn test_binary_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quad_bin.ply");
        let mesh = make_quad();
        PlyWriter::write_mesh_encoded(&mesh, &path, PlyEncoding::BinaryLittleEndian).unwrap();
        let header = std::fs::read(&path).unwrap();
        assert!(header.windows(20).any(|w| w == b"binary_little_endian"));
        assert_eq!(PlyReader::read_mesh(&path).unwrap(), mesh);
    }

    #[test]
    fn test_reads_hand_written_ascii() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("square.ply");
        let ply_content = "ply
format ascii 1.0
comment extra vertex properties are ignored
element vertex 4
property float x
property float y
property float z
property uchar red
element face 2
property list uchar int vertex_indices
end_header
0.0 0.0 0.0 255
1.0 0.0 0.0 0
1.0 1.0 0.0 0
0.0 1.0 0.0 255
3 0 1 2
3 0 2 3
";
        std::fs::write(&path, ply_content).unwrap();
        let mesh = PlyReader::read_mesh(&path).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_rejects_polygon_faces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("polygon.ply");
        let ply_content = "ply
format ascii 1.0
element vertex 4
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
1 1 0
0 1 0
4 0 1 2 3
";
        std::fs::write(&path, ply_content).unwrap();
        assert!(matches!(PlyReader::read_mesh(&path), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_rejects_negative_indices() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("negative.ply");
        let ply_content = "ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
0 0 0
1 0 0
1 1 0
3 0 -1 2
";
        std::fs::write(&path, ply_content).unwrap();
        assert!(matches!(PlyReader::read_mesh(&path), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let result = PlyReader::read_mesh(dir.path().join("absent.ply"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
