//! # stairseg algorithms
//!
//! Geometric scene decomposition of 3D range scans.
//!
//! This crate turns a filtered point cloud into spatial clusters and each
//! cluster into a bounded set of planes: RANSAC plane fitting, consolidation
//! of repeated detections, iterative extract-and-deflate, Euclidean
//! clustering and the frame-level pipeline that ties them together.

pub mod filtering;
pub mod normals;
pub mod nearest_neighbor;
pub mod smoothing;
pub mod segmentation;
pub mod consolidation;
pub mod extraction;
pub mod clustering;
pub mod decomposition;
pub mod pipeline;

// Re-export commonly used items
pub use filtering::*;
pub use normals::*;
pub use nearest_neighbor::*;
pub use smoothing::*;
pub use segmentation::*;
pub use consolidation::*;
pub use extraction::*;
pub use clustering::*;
pub use decomposition::*;
pub use pipeline::*;
