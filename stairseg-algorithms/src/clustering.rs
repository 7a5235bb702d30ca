//! Spatial clustering
//!
//! Euclidean cluster extraction: region growing over radius neighbors, with
//! an optional normal-compatibility condition. Clusters outside the size
//! bounds are dropped whole.

use log::debug;
use serde::{Deserialize, Serialize};
use stairseg_core::{
    Error, NearestNeighborSearch, NormalPoint3f, Point3f, PointCloud, Result, Vector3f,
};

use crate::nearest_neighbor::RTreeSearch;
use crate::normals::estimate_normals;

/// Accepted cluster sizes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClusterSizeBounds {
    /// Fixed point counts, both inclusive
    Absolute { min: usize, max: usize },
    /// Fractions of the input cloud: `[n / min_divisor, n / max_divisor]`
    Relative { min_divisor: usize, max_divisor: usize },
}

impl Default for ClusterSizeBounds {
    fn default() -> Self {
        ClusterSizeBounds::Relative {
            min_divisor: 10,
            max_divisor: 2,
        }
    }
}

impl ClusterSizeBounds {
    /// Concrete `(min, max)` for a cloud of `cloud_len` points
    pub fn resolve(&self, cloud_len: usize) -> (usize, usize) {
        match *self {
            ClusterSizeBounds::Absolute { min, max } => (min, max),
            ClusterSizeBounds::Relative {
                min_divisor,
                max_divisor,
            } => (
                cloud_len / min_divisor.max(1),
                cloud_len / max_divisor.max(1),
            ),
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            ClusterSizeBounds::Absolute { min, max } if min > max => Err(Error::InvalidData(
                format!("cluster size bounds are inverted: [{}, {}]", min, max),
            )),
            ClusterSizeBounds::Relative {
                min_divisor,
                max_divisor,
            } if min_divisor == 0 || max_divisor == 0 || min_divisor < max_divisor => {
                Err(Error::InvalidData(format!(
                    "relative cluster bounds need min_divisor >= max_divisor > 0, got {} and {}",
                    min_divisor, max_divisor
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Clustering parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Maximum distance between neighboring members of one cluster
    pub tolerance: f32,
    pub size: ClusterSizeBounds,
    /// When set, neighbors also need normals within this many degrees
    /// (orientation ignored)
    pub normal_angle_deg: Option<f32>,
    /// Neighborhood size for normal estimation on the conditional path
    pub normal_k: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            tolerance: 0.09,
            size: ClusterSizeBounds::default(),
            normal_angle_deg: None,
            normal_k: 50,
        }
    }
}

impl ClusterParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return Err(Error::InvalidData(
                "cluster tolerance must be positive".to_string(),
            ));
        }
        if let Some(angle) = self.normal_angle_deg {
            if !(angle > 0.0 && angle <= 90.0) {
                return Err(Error::InvalidData(format!(
                    "normal angle must be in (0, 90] degrees, got {}",
                    angle
                )));
            }
        }
        self.size.validate()
    }
}

/// `ClusterSizeOutOfBounds` unless `min <= size <= max`
pub fn check_cluster_size(size: usize, min: usize, max: usize) -> Result<()> {
    if size < min || size > max {
        return Err(Error::ClusterSizeOutOfBounds { size, min, max });
    }
    Ok(())
}

/// Region growing over the radius graph.
///
/// `joins(a, b)` is consulted for every neighbor pair in addition to the
/// distance test. Members come out ascending; clusters are ordered by size,
/// largest first, ties broken by lowest member index.
fn grow_clusters<F>(
    points: &[Point3f],
    tolerance: f32,
    min_size: usize,
    max_size: usize,
    joins: F,
) -> Vec<Vec<usize>>
where
    F: Fn(usize, usize) -> bool,
{
    let search = RTreeSearch::new(points);
    let mut visited = vec![false; points.len()];
    let mut clusters = Vec::new();

    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let mut members = vec![seed];
        let mut head = 0;
        while head < members.len() {
            let current = members[head];
            head += 1;
            for (neighbor, _) in search.find_radius_neighbors(&points[current], tolerance) {
                if !visited[neighbor] && joins(current, neighbor) {
                    visited[neighbor] = true;
                    members.push(neighbor);
                }
            }
        }

        match check_cluster_size(members.len(), min_size, max_size) {
            Ok(()) => {
                members.sort_unstable();
                clusters.push(members);
            }
            Err(e) => debug!("dropping cluster seeded at {}: {}", seed, e),
        }
    }

    clusters.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
    clusters
}

/// Euclidean cluster extraction
///
/// Two points belong to the same cluster when a chain of points, each within
/// `tolerance` of the next, connects them. Clusters with fewer than
/// `min_size` or more than `max_size` points are dropped.
///
/// # Returns
/// * `Result<Vec<Vec<usize>>>` - Member indices of each kept cluster
pub fn euclidean_cluster_indices(
    cloud: &PointCloud<Point3f>,
    tolerance: f32,
    min_size: usize,
    max_size: usize,
) -> Result<Vec<Vec<usize>>> {
    let params = ClusterParams {
        tolerance,
        size: ClusterSizeBounds::Absolute {
            min: min_size,
            max: max_size,
        },
        ..Default::default()
    };
    params.validate()?;

    Ok(grow_clusters(&cloud.points, tolerance, min_size, max_size, |_, _| true))
}

/// Euclidean cluster extraction returning each cluster's points
pub fn euclidean_clusters(
    cloud: &PointCloud<Point3f>,
    tolerance: f32,
    min_size: usize,
    max_size: usize,
) -> Result<Vec<PointCloud<Point3f>>> {
    Ok(euclidean_cluster_indices(cloud, tolerance, min_size, max_size)?
        .iter()
        .map(|members| cloud.select(members))
        .collect())
}

/// Euclidean clustering that only joins neighbors with compatible normals
///
/// Neighbors join when `|n_a · n_b| > cos(angle_deg)`.
pub fn conditional_cluster_indices(
    cloud: &PointCloud<NormalPoint3f>,
    tolerance: f32,
    angle_deg: f32,
    min_size: usize,
    max_size: usize,
) -> Result<Vec<Vec<usize>>> {
    let params = ClusterParams {
        tolerance,
        size: ClusterSizeBounds::Absolute {
            min: min_size,
            max: max_size,
        },
        normal_angle_deg: Some(angle_deg),
        ..Default::default()
    };
    params.validate()?;

    let positions: Vec<Point3f> = cloud.iter().map(|p| p.position).collect();
    let normals: Vec<Vector3f> = cloud.iter().map(|p| p.normal).collect();
    let min_cos = angle_deg.to_radians().cos();

    Ok(grow_clusters(&positions, tolerance, min_size, max_size, |a, b| {
        normals[a].dot(&normals[b]).abs() > min_cos
    }))
}

/// Partition `cloud` into spatial clusters according to `params`
///
/// Runs the conditional path, estimating normals first, when
/// `params.normal_angle_deg` is set.
pub fn cluster_indices(cloud: &PointCloud<Point3f>, params: &ClusterParams) -> Result<Vec<Vec<usize>>> {
    params.validate()?;
    let (min_size, max_size) = params.size.resolve(cloud.len());

    let clusters = match params.normal_angle_deg {
        Some(angle) => {
            let with_normals = estimate_normals(cloud, params.normal_k)?;
            conditional_cluster_indices(&with_normals, params.tolerance, angle, min_size, max_size)?
        }
        None => euclidean_cluster_indices(cloud, params.tolerance, min_size, max_size)?,
    };

    debug!(
        "{} clusters from {} points (size bounds [{}, {}])",
        clusters.len(),
        cloud.len(),
        min_size,
        max_size
    );
    Ok(clusters)
}

/// Partition `cloud` into spatial clusters, returning each cluster's points
pub fn cluster(cloud: &PointCloud<Point3f>, params: &ClusterParams) -> Result<Vec<PointCloud<Point3f>>> {
    Ok(cluster_indices(cloud, params)?
        .iter()
        .map(|members| cloud.select(members))
        .collect())
}
