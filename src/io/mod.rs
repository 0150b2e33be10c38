//! Mesh file I/O.
//!
//! This module provides functions for loading and saving meshes.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | PLY | `.ply` | ✓ | ✓ | ASCII only; optional RGBA vertex colors on save |
//!
//! Every format implements [`MeshFormat`], which reads and writes the plain
//! [`MeshData`] form; the mesh itself is built with
//! [`build_from_data`](crate::mesh::build_from_data).
//!
//! # Usage
//!
//! ```no_run
//! use lapmesh::io::{load, save};
//! use lapmesh::mesh::{Mesh, PositionSource};
//!
//! let mesh: Mesh = load("model.ply").unwrap();
//! save(&mesh, "output.ply", PositionSource::Reconstructed).unwrap();
//! ```

pub mod ply;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{MeshError, Result};
pub use crate::mesh::MeshData;
use crate::mesh::{build_from_data, to_data, Mesh, MeshIndex, PositionSource};

/// A file format that can read and write [`MeshData`].
pub trait MeshFormat {
    /// Parse geometry from a stream.
    fn read<R: BufRead>(&self, reader: &mut R) -> Result<MeshData>;

    /// Serialize geometry to a stream.
    fn write<W: Write>(&self, writer: &mut W, data: &MeshData) -> Result<()>;
}

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// PLY (Stanford polygon) format, ASCII encoding.
    Ply,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "ply" => Some(Format::Ply),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }

    fn detect(path: &Path) -> Result<Format> {
        Format::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
            extension: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)")
                .to_string(),
        })
    }
}

/// Read geometry from a file with automatic format detection.
pub fn load_data<P: AsRef<Path>>(path: P) -> Result<MeshData> {
    let path = path.as_ref();
    let format = Format::detect(path)?;

    let read = || -> Result<MeshData> {
        let mut reader = BufReader::new(File::open(path)?);
        match format {
            Format::Ply => ply::PlyAscii.read(&mut reader),
        }
    };
    read().map_err(|e| MeshError::LoadError {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

/// Load a mesh from a file with automatic format detection.
///
/// # Example
///
/// ```no_run
/// use lapmesh::io::load;
/// use lapmesh::mesh::Mesh;
///
/// let mesh: Mesh = load("model.ply").unwrap();
/// ```
pub fn load<P: AsRef<Path>, I: MeshIndex>(path: P) -> Result<Mesh<I>> {
    let path = path.as_ref();
    let data = load_data(path)?;
    build_from_data(&data).map_err(|e| MeshError::LoadError {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

/// Write geometry to a file with automatic format detection.
pub fn save_data<P: AsRef<Path>>(data: &MeshData, path: P) -> Result<()> {
    let path = path.as_ref();
    let format = Format::detect(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        Format::Ply => ply::PlyAscii.write(&mut writer, data)?,
    }
    writer.flush()?;
    Ok(())
}

/// Save a mesh to a file with automatic format detection.
pub fn save<P: AsRef<Path>, I: MeshIndex>(
    mesh: &Mesh<I>,
    path: P,
    source: PositionSource,
) -> Result<()> {
    save_data(&to_data(mesh, source), path)
}

/// Write one `x y z` line per live vertex, in id order.
///
/// Coordinates are printed with six decimals, with no header or faces.
pub fn write_points<W: Write, I: MeshIndex>(
    writer: &mut W,
    mesh: &Mesh<I>,
    source: PositionSource,
) -> Result<()> {
    for p in to_data(mesh, source).positions {
        writeln!(writer, "{:.6} {:.6} {:.6}", p.x, p.y, p.z)?;
    }
    Ok(())
}
