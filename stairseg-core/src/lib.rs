//! Core data structures and traits for stairseg
//!
//! This crate provides the fundamental types shared by the perception pipeline:
//! points, point clouds, range frames, the error type and the neighbor search trait.

pub mod point;
pub mod point_cloud;
pub mod frame;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use frame::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Vector4, Matrix3};

// Type aliases for easier imports
pub type Point = Point3f;
