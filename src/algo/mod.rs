//! Laplacian compression algorithms.
//!
//! This module contains the stages of Laplacian-coordinate mesh compression:
//!
//! - **Laplacian coordinates**: umbrella-operator deltas and their quantization
//! - **Anchors**: greedy maximum-error selection, BFS distance layering
//! - **Reconstruction**: sparse least-squares solves, global or per block
//! - **Segmentation**: farthest-point seeds, balanced region growing, packets
//! - **Metrics**: Mq, Sq, Evis and approximate Hausdorff distances
//! - **Curvature**: angle-deficit curvature and dihedral angle statistics
//!
//! [`pipeline::compress`] chains them.

pub mod anchor;
pub mod curvature;
pub mod laplacian;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod reconstruct;
pub mod segment;
pub mod sparse;

pub use progress::Progress;
