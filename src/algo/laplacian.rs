//! Laplacian (differential) coordinates and their quantization.
//!
//! The Laplacian coordinate of a vertex is its position minus the mean of its
//! one-ring neighbors (the umbrella operator):
//!
//! ```text
//! δ(v) = v - (1 / |N(v)|) Σ_{n ∈ N(v)} n
//! ```
//!
//! Quantization snaps each axis independently onto a uniform grid spanning
//! that axis's range of coordinates, so the worst-case error is known up
//! front.

use log::debug;
use nalgebra::{Point3, Vector3};

use crate::error::{MeshError, Result};
use crate::mesh::{Mesh, MeshIndex, VertexId};

/// Uniform Laplacian coordinate of one vertex.
///
/// Zero for a vertex without neighbors. Uses the cached adjacency list.
pub fn laplacian_coordinate<I: MeshIndex>(mesh: &Mesh<I>, v: VertexId<I>) -> Vector3<f64> {
    let neighbors = mesh.neighbors(v);
    umbrella(mesh.position(v), neighbors.iter().map(|&n| mesh.position(n)))
}

/// `p` minus the mean of `neighbors` (zero when there are none).
pub(crate) fn umbrella<'a>(
    p: &Point3<f64>,
    neighbors: impl Iterator<Item = &'a Point3<f64>>,
) -> Vector3<f64> {
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for n in neighbors {
        sum += n.coords;
        count += 1;
    }
    if count == 0 {
        return Vector3::zeros();
    }
    p.coords - sum / count as f64
}

/// Compute and store the Laplacian coordinate of every vertex.
///
/// Requires current adjacency lists.
pub fn compute_laplacian_coordinates<I: MeshIndex>(mesh: &mut Mesh<I>) -> Result<()> {
    mesh.require_neighbors()?;
    let deltas: Vec<(VertexId<I>, Vector3<f64>)> = mesh
        .vertex_ids()
        .map(|v| (v, laplacian_coordinate(mesh, v)))
        .collect();
    for (v, d) in deltas {
        mesh.vertex_mut(v).laplacian = d;
    }
    Ok(())
}

/// Per-axis uniform quantizer.
///
/// For each axis, `step = (max - min) * 2^-bits` and a value maps to
/// `round((x - min) / step) * step + min`. An axis with zero range is left
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantizer {
    bits: u32,
    min: Vector3<f64>,
    step: Vector3<f64>,
}

impl Quantizer {
    /// Largest supported bit count; beyond this the step underflows f64 precision.
    pub const MAX_BITS: u32 = 52;

    /// Fit a quantizer to the per-axis range of `values`.
    ///
    /// An empty input gives a quantizer that leaves every value unchanged.
    pub fn fit<It>(values: It, bits: u32) -> Result<Self>
    where
        It: IntoIterator<Item = Vector3<f64>>,
    {
        if bits == 0 || bits > Self::MAX_BITS {
            return Err(MeshError::invalid_param(
                "bits",
                bits,
                "must be between 1 and 52",
            ));
        }

        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return Ok(Self {
                bits,
                min: Vector3::zeros(),
                step: Vector3::zeros(),
            });
        };
        let (min, max) = iter.fold((first, first), |(lo, hi), v| (lo.inf(&v), hi.sup(&v)));

        let scale = (-(bits as f64)).exp2();
        Ok(Self {
            bits,
            min,
            step: (max - min) * scale,
        })
    }

    /// Number of bits per axis.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Per-axis minimum of the fitted values.
    pub fn min(&self) -> Vector3<f64> {
        self.min
    }

    /// Per-axis grid step (the quantization error unit).
    pub fn step(&self) -> Vector3<f64> {
        self.step
    }

    /// Per-axis worst-case absolute error, half a step.
    pub fn max_error(&self) -> Vector3<f64> {
        self.step * 0.5
    }

    /// Snap a value onto the grid.
    pub fn quantize(&self, v: &Vector3<f64>) -> Vector3<f64> {
        Vector3::from_fn(|i, _| quantize_axis(v[i], self.min[i], self.step[i]))
    }
}

#[inline]
fn quantize_axis(x: f64, min: f64, step: f64) -> f64 {
    if step == 0.0 {
        return x;
    }
    ((x - min) / step).round() * step + min
}

/// Quantize every vertex's Laplacian coordinate with a quantizer fitted to the mesh.
///
/// The result is stored in each vertex's `quantized_laplacian`.
pub fn quantize_laplacian<I: MeshIndex>(mesh: &mut Mesh<I>, bits: u32) -> Result<Quantizer> {
    let quantizer = Quantizer::fit(mesh.vertices().map(|(_, v)| v.laplacian), bits)?;
    for vertex in mesh.vertices.iter_mut().flatten() {
        vertex.quantized_laplacian = quantizer.quantize(&vertex.laplacian);
    }
    debug!(
        "quantized Laplacian coordinates at {} bits, step {:?}",
        bits,
        quantizer.step().as_slice()
    );
    Ok(quantizer)
}
