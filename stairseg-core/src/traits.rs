//! Core traits for stairseg

use crate::{point::*, point_cloud::*};

/// Trait for nearest neighbor search functionality
///
/// Results are `(index, distance)` pairs where `index` refers to the point
/// slice the structure was built from.
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point, closest first
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Find all neighbors within a given radius (inclusive)
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}

/// Axis-aligned extent of a geometric object
pub trait Bounded {
    /// Get the bounding box of the object as `(min, max)`
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the bounding box
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }
}

impl<T> Bounded for PointCloud<T>
where
    T: Clone + Copy,
    Point3f: From<T>,
{
    fn bounding_box(&self) -> (Point3f, Point3f) {
        if self.is_empty() {
            return (Point3f::origin(), Point3f::origin());
        }

        let first_point = Point3f::from(self.points[0]);
        let mut min = first_point;
        let mut max = first_point;

        for point in &self.points {
            let p = Point3f::from(*point);
            min = min.inf(&p);
            max = max.sup(&p);
        }

        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_box() {
        let cloud = PointCloud::from_points(vec![
            Point3f::new(-1.0, 2.0, 0.5),
            Point3f::new(3.0, -2.0, 0.0),
            Point3f::new(0.0, 0.0, 4.0),
        ]);
        let (min, max) = cloud.bounding_box();
        assert_eq!(min, Point3f::new(-1.0, -2.0, 0.0));
        assert_eq!(max, Point3f::new(3.0, 2.0, 4.0));

        let center = cloud.center();
        assert_relative_eq!(center.x, 1.0);
        assert_relative_eq!(center.y, 0.0);
        assert_relative_eq!(center.z, 2.0);
    }

    #[test]
    fn test_bounding_box_of_normal_cloud() {
        let cloud = PointCloud::from_points(vec![NormalPoint3f::default()]);
        let (min, max) = cloud.bounding_box();
        assert_eq!(min, max);
    }

    #[test]
    fn test_empty_bounding_box() {
        let cloud = PointCloud::<Point3f>::new();
        assert_eq!(cloud.bounding_box(), (Point3f::origin(), Point3f::origin()));
    }
}
