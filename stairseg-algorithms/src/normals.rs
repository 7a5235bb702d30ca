//! Normal estimation algorithms

use nalgebra::Matrix3;
use rayon::prelude::*;
use stairseg_core::{
    Error, NearestNeighborSearch, NormalPoint3f, Point3f, PointCloud, Result, Vector3f,
};

use crate::nearest_neighbor::RTreeSearch;

/// Least-squares plane through a set of points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPlane {
    pub centroid: Point3f,
    /// Unit normal, direction of least variance
    pub normal: Vector3f,
    /// Smallest eigenvalue over the eigenvalue sum, 0 for a perfect plane
    pub curvature: f32,
}

/// Fit a plane to `points` by principal component analysis.
///
/// Returns `None` for fewer than 3 points or when the points do not span a
/// plane (all coincident).
pub fn fit_local_plane<'a, I>(points: I) -> Option<LocalPlane>
where
    I: IntoIterator<Item = &'a Point3f>,
    I::IntoIter: Clone,
{
    let iter = points.into_iter();
    let mut count = 0usize;
    let mut sum = Vector3f::zeros();
    for p in iter.clone() {
        sum += p.coords;
        count += 1;
    }
    if count < 3 {
        return None;
    }
    let centroid = Point3f::from(sum / count as f32);

    let mut covariance = Matrix3::<f32>::zeros();
    for p in iter {
        let d = p - centroid;
        covariance += d * d.transpose();
    }
    covariance /= count as f32;

    let eigen = covariance.symmetric_eigen();
    let (min_index, min_value) = eigen
        .eigenvalues
        .iter()
        .copied()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;

    let total: f32 = eigen.eigenvalues.iter().sum();
    if !(total > f32::EPSILON) {
        return None;
    }

    let normal = eigen.eigenvectors.column(min_index).into_owned();
    let norm = normal.norm();
    if norm < 1e-8 || !norm.is_finite() {
        return None;
    }

    Some(LocalPlane {
        centroid,
        normal: normal / norm,
        curvature: (min_value / total).max(0.0),
    })
}

/// Estimate normals for a point cloud using k-nearest neighbors
///
/// Each normal is the least-variance direction of the point's `k` nearest
/// neighbors (the point included). Points whose neighborhood is degenerate get
/// the default +Z normal. Normals are unoriented.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `k` - Neighborhood size, at least 3
pub fn estimate_normals(cloud: &PointCloud<Point3f>, k: usize) -> Result<PointCloud<NormalPoint3f>> {
    if k < 3 {
        return Err(Error::InvalidData(
            "k must be at least 3 for normal estimation".to_string(),
        ));
    }
    if cloud.is_empty() {
        return Ok(PointCloud::new());
    }

    let search = RTreeSearch::new(&cloud.points);
    let points = &cloud.points;

    let normals: Vec<NormalPoint3f> = points
        .par_iter()
        .map(|point| {
            let neighbors = search.find_k_nearest(point, k);
            let normal = fit_local_plane(neighbors.iter().map(|(i, _)| &points[*i]))
                .map(|plane| plane.normal)
                .unwrap_or_else(|| Vector3f::new(0.0, 0.0, 1.0));
            NormalPoint3f {
                position: *point,
                normal,
            }
        })
        .collect();

    Ok(PointCloud::from_points(normals))
}
