//! Point cloud containers
//!
//! A [`PointCloud`] is the PointSet of the pipeline: an ordered sequence of
//! points owned by the stage that produced it. Stages never edit a cloud in
//! place; they build a new one, usually through [`PointCloud::select`].

use crate::point::*;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// A generic point cloud container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A point cloud with 3D points
pub type PointCloud3f = PointCloud<Point3f>;

/// A point cloud with normal vectors
pub type NormalPointCloud3f = PointCloud<NormalPoint3f>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create a new point cloud with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create a point cloud from a vector of points
    pub fn from_points(points: Vec<T>) -> Self {
        Self { points }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }

    /// Borrow the points as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.points
    }
}

impl<T: Clone> PointCloud<T> {
    /// Build a new cloud from the points at `indices`, in the order given.
    ///
    /// Panics if an index is out of range; callers pass indices they obtained
    /// from this same cloud.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            points: indices.iter().map(|&i| self.points[i].clone()).collect(),
        }
    }
}

impl PointCloud<NormalPoint3f> {
    /// Drop the normals and keep the positions
    pub fn positions(&self) -> PointCloud<Point3f> {
        self.points.iter().map(|p| p.position).collect()
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> Extend<T> for PointCloud<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            points: Vec::from_iter(iter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_cloud(n: usize) -> PointCloud<Point3f> {
        (0..n).map(|i| Point3f::new(i as f32, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_select_keeps_given_order() {
        let cloud = line_cloud(5);
        let subset = cloud.select(&[4, 1, 2]);
        assert_eq!(subset.len(), 3);
        assert_eq!(subset[0].x, 4.0);
        assert_eq!(subset[1].x, 1.0);
        assert_eq!(subset[2].x, 2.0);
    }

    #[test]
    fn test_positions_from_normal_cloud() {
        let cloud = PointCloud::from_points(vec![NormalPoint3f::default(); 4]);
        let positions = cloud.positions();
        assert_eq!(positions.len(), 4);
        assert_eq!(positions[0], Point3f::origin());
    }
}
