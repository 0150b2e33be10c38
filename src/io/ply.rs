//! PLY (Stanford polygon) format support.
//!
//! Only the ASCII encoding is accepted. Vertices contribute their `x`, `y`
//! and `z` properties; any other vertex property is ignored. Face records are
//! interpreted by their list length: two indices make an edge, three make a
//! triangle, and anything else is skipped. An optional `edge` element with
//! `vertex1`/`vertex2` properties is read as edges too.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use log::debug;
use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Encoding, Property};

use super::{MeshData, MeshFormat};
use crate::error::{MeshError, Result};
use crate::mesh::{build_from_data, Mesh, MeshIndex};

/// The ASCII PLY format.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlyAscii;

impl MeshFormat for PlyAscii {
    fn read<R: BufRead>(&self, reader: &mut R) -> Result<MeshData> {
        read(reader)
    }

    fn write<W: Write>(&self, writer: &mut W, data: &MeshData) -> Result<()> {
        write(writer, data)
    }
}

fn format_error(message: impl Into<String>) -> MeshError {
    MeshError::PlyFormat {
        message: message.into(),
    }
}

/// Parse ASCII PLY geometry from a stream.
pub fn read<R: BufRead>(reader: &mut R) -> Result<MeshData> {
    let parser = Parser::<DefaultElement>::new();
    let header = parser
        .read_header(reader)
        .map_err(|e| format_error(format!("bad header: {}", e)))?;

    if !matches!(header.encoding, Encoding::Ascii) {
        return Err(format_error("only ASCII encoding is supported"));
    }
    if !header.elements.contains_key("vertex") {
        return Err(format_error("no vertex element"));
    }

    let payload = parser
        .read_payload(reader, &header)
        .map_err(|e| format_error(e.to_string()))?;

    let vertex_element = payload
        .get("vertex")
        .ok_or_else(|| format_error("no vertex element"))?;

    let mut positions: Vec<Point3<f64>> = Vec::with_capacity(vertex_element.len());
    for (i, vertex) in vertex_element.iter().enumerate() {
        let coord = |name: &str| {
            get_float_property(vertex, name)
                .ok_or_else(|| format_error(format!("vertex {} is missing {}", i, name)))
        };
        positions.push(Point3::new(coord("x")?, coord("y")?, coord("z")?));
    }

    let count = positions.len();
    let mut data = MeshData::new(positions, Vec::new());

    if let Some(faces) = payload.get("face") {
        for (record, face) in faces.iter().enumerate() {
            let indices = get_list_property(face, "vertex_indices")
                .or_else(|| get_list_property(face, "vertex_index"))
                .ok_or_else(|| {
                    format_error(format!("face {} has no vertex_indices list", record))
                })?;

            match indices.len() {
                2 => {
                    let [a, b] = checked_indices::<2>(&indices, record, count, edge_error)?;
                    if a == b {
                        return Err(edge_error(record, "both endpoints are the same vertex"));
                    }
                    data.edges.push([a, b]);
                }
                3 => {
                    let [a, b, c] = checked_indices::<3>(&indices, record, count, triangle_error)?;
                    if a == b || b == c || a == c {
                        return Err(triangle_error(record, "repeated vertex index"));
                    }
                    data.triangles.push([a, b, c]);
                }
                n => debug!("skipping face record {} with {} indices", record, n),
            }
        }
    }

    if let Some(edges) = payload.get("edge") {
        for (record, edge) in edges.iter().enumerate() {
            let a = get_int_property(edge, "vertex1");
            let b = get_int_property(edge, "vertex2");
            let (Some(a), Some(b)) = (a, b) else {
                return Err(edge_error(record, "missing vertex1 or vertex2"));
            };
            let [a, b] = checked_indices::<2>(&[a, b], record, count, edge_error)?;
            if a == b {
                return Err(edge_error(record, "both endpoints are the same vertex"));
            }
            data.edges.push([a, b]);
        }
    }

    debug!(
        "read PLY: {} vertices, {} triangles, {} edges",
        data.positions.len(),
        data.triangles.len(),
        data.edges.len()
    );
    Ok(data)
}

fn edge_error(record: usize, message: &str) -> MeshError {
    MeshError::PlyEdge {
        record,
        message: message.to_string(),
    }
}

fn triangle_error(record: usize, message: &str) -> MeshError {
    MeshError::PlyTriangle {
        record,
        message: message.to_string(),
    }
}

/// Convert raw list entries to vertex indices below `count`.
fn checked_indices<const N: usize>(
    raw: &[i64],
    record: usize,
    count: usize,
    record_error: fn(usize, &str) -> MeshError,
) -> Result<[usize; N]> {
    let mut out = [0usize; N];
    for (slot, &value) in out.iter_mut().zip(raw) {
        if value < 0 {
            return Err(record_error(record, "negative vertex index"));
        }
        let index = value as usize;
        if index >= count {
            return Err(MeshError::VertexIndexOutOfRange {
                record,
                index,
                count,
            });
        }
        *slot = index;
    }
    Ok(out)
}

fn get_float_property(element: &DefaultElement, name: &str) -> Option<f64> {
    match element.get(name)? {
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        _ => None,
    }
}

fn get_int_property(element: &DefaultElement, name: &str) -> Option<i64> {
    match element.get(name)? {
        Property::Int(v) => Some(*v as i64),
        Property::UInt(v) => Some(*v as i64),
        Property::Short(v) => Some(*v as i64),
        Property::UShort(v) => Some(*v as i64),
        Property::Char(v) => Some(*v as i64),
        Property::UChar(v) => Some(*v as i64),
        _ => None,
    }
}

fn get_list_property(element: &DefaultElement, name: &str) -> Option<Vec<i64>> {
    match element.get(name)? {
        Property::ListInt(v) => Some(v.iter().map(|&x| x as i64).collect()),
        Property::ListUInt(v) => Some(v.iter().map(|&x| x as i64).collect()),
        Property::ListShort(v) => Some(v.iter().map(|&x| x as i64).collect()),
        Property::ListUShort(v) => Some(v.iter().map(|&x| x as i64).collect()),
        Property::ListChar(v) => Some(v.iter().map(|&x| x as i64).collect()),
        Property::ListUChar(v) => Some(v.iter().map(|&x| x as i64).collect()),
        _ => None,
    }
}

/// Write geometry as ASCII PLY.
///
/// When `data.colors` is set, each vertex also carries `red`, `green`,
/// `blue` and `alpha` as `uchar`. Only triangles are written as faces.
pub fn write<W: Write>(writer: &mut W, data: &MeshData) -> Result<()> {
    let colors = match &data.colors {
        Some(c) if c.len() != data.positions.len() => {
            return Err(MeshError::invalid_param(
                "colors",
                c.len(),
                "need exactly one color per vertex",
            ));
        }
        other => other.as_deref(),
    };

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "comment Generated by lapmesh")?;
    writeln!(writer, "element vertex {}", data.positions.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    if colors.is_some() {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
        writeln!(writer, "property uchar alpha")?;
    }
    writeln!(writer, "element face {}", data.triangles.len())?;
    writeln!(writer, "property list uchar int vertex_indices")?;
    writeln!(writer, "end_header")?;

    match colors {
        Some(colors) => {
            for (p, [r, g, b, a]) in data.positions.iter().zip(colors) {
                writeln!(writer, "{} {} {} {} {} {} {}", p.x, p.y, p.z, r, g, b, a)?;
            }
        }
        None => {
            for p in &data.positions {
                writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
            }
        }
    }

    for f in &data.triangles {
        writeln!(writer, "3 {} {} {}", f[0], f[1], f[2])?;
    }
    Ok(())
}

/// Load a mesh from a PLY file.
///
/// # Example
///
/// ```no_run
/// use lapmesh::io::ply;
/// use lapmesh::mesh::Mesh;
///
/// let mesh: Mesh = ply::load("model.ply").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<Mesh<I>> {
    let path = path.as_ref();
    let wrap = |e: MeshError| MeshError::LoadError {
        path: path.to_path_buf(),
        source: Box::new(e),
    };
    let file = File::open(path).map_err(|e| wrap(e.into()))?;
    let data = read(&mut BufReader::new(file)).map_err(wrap)?;
    build_from_data(&data).map_err(wrap)
}
