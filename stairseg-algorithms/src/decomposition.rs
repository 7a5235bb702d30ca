//! Per-cluster plane decomposition
//!
//! Each cluster is decomposed on its own, with its own registry and its own
//! random stream, so clusters can run in any order (or in parallel) without
//! changing the result.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stairseg_core::{Point3f, PointCloud, Result};

use crate::extraction::{extract_planes, ExtractionParams, StopReason};
use crate::segmentation::PlaneModel;

/// A plane found inside one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaneRecord {
    pub model: PlaneModel,
    /// Indices into the owning cluster's points, ascending
    pub indices: Vec<usize>,
    pub points: PointCloud<Point3f>,
}

impl PlaneRecord {
    /// Mean of the inlier points
    pub fn centroid(&self) -> Point3f {
        if self.points.is_empty() {
            return Point3f::origin();
        }
        let sum = self
            .points
            .iter()
            .fold(Point3f::origin().coords, |acc, p| acc + p.coords);
        Point3f::from(sum / self.points.len() as f32)
    }
}

/// Decomposition of one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterRecord {
    /// Position of the cluster in the decomposed sequence
    pub index: usize,
    pub points: PointCloud<Point3f>,
    pub planes: Vec<PlaneRecord>,
    /// Indices claimed by no plane, ascending
    pub residual_indices: Vec<usize>,
    pub residual: PointCloud<Point3f>,
    pub stop: StopReason,
}

impl ClusterRecord {
    /// Points assigned to one of the planes
    pub fn explained(&self) -> usize {
        self.planes.iter().map(|p| p.indices.len()).sum()
    }
}

/// Parameters for [`decompose`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionParams {
    /// Per-cluster extraction; `max_planes` is the per-cluster plane budget
    pub extraction: ExtractionParams,
    /// Cluster `i` samples from `StdRng::seed_from_u64(seed + i)`
    pub seed: u64,
    /// Decompose clusters on the rayon thread pool
    pub parallel: bool,
}

impl Default for DecompositionParams {
    fn default() -> Self {
        Self {
            extraction: ExtractionParams::default(),
            seed: 0,
            parallel: false,
        }
    }
}

impl DecompositionParams {
    pub fn validate(&self) -> Result<()> {
        self.extraction.validate()
    }
}

/// Decompose one cluster into planes plus residual
///
/// # Arguments
/// * `index` - Position of the cluster, recorded in the output and used to
///   derive its random seed
/// * `points` - The cluster's points
/// * `params` - Decomposition parameters
pub fn decompose_cluster(
    index: usize,
    points: &PointCloud<Point3f>,
    params: &DecompositionParams,
) -> Result<ClusterRecord> {
    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(index as u64));
    let extraction = extract_planes(&points.points, &params.extraction, &mut rng)?;

    let planes: Vec<PlaneRecord> = extraction
        .planes
        .into_iter()
        .map(|entry| {
            let mut indices = entry.inliers;
            indices.sort_unstable();
            PlaneRecord {
                model: entry.model,
                points: points.select(&indices),
                indices,
            }
        })
        .collect();

    if planes.is_empty() {
        warn!(
            "cluster {}: no plane among {} points ({:?})",
            index,
            points.len(),
            extraction.stop
        );
    } else {
        debug!(
            "cluster {}: {} planes after {} iterations, {} of {} points residual ({:?})",
            index,
            planes.len(),
            extraction.iterations,
            extraction.residual.len(),
            points.len(),
            extraction.stop
        );
    }

    Ok(ClusterRecord {
        index,
        points: points.clone(),
        planes,
        residual: points.select(&extraction.residual),
        residual_indices: extraction.residual,
        stop: extraction.stop,
    })
}

/// Decompose every cluster independently
///
/// Output position `i` always holds cluster `i`, whether or not
/// `params.parallel` is set. Empty and tiny clusters yield records with no
/// planes.
pub fn decompose(clusters: &[PointCloud<Point3f>], params: &DecompositionParams) -> Result<Vec<ClusterRecord>> {
    params.validate()?;

    if params.parallel {
        clusters
            .par_iter()
            .enumerate()
            .map(|(index, points)| decompose_cluster(index, points, params))
            .collect()
    } else {
        clusters
            .iter()
            .enumerate()
            .map(|(index, points)| decompose_cluster(index, points, params))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidation::SimilarityTolerance;
    use crate::segmentation::RansacParams;
    use approx::assert_relative_eq;

    /// One tread at height `z` with a riser in front of it
    fn step(x0: f32, z: f32) -> PointCloud<Point3f> {
        let mut cloud = PointCloud::new();
        for i in 0..12 {
            for j in 0..12 {
                cloud.push(Point3f::new(x0 + 0.05 + i as f32 * 0.025, j as f32 * 0.05, z));
            }
        }
        for i in 0..8 {
            for j in 0..12 {
                cloud.push(Point3f::new(x0, j as f32 * 0.05, z - 0.02 - i as f32 * 0.02));
            }
        }
        cloud
    }

    fn params() -> DecompositionParams {
        DecompositionParams {
            extraction: ExtractionParams {
                ransac: RansacParams {
                    distance_threshold: 0.005,
                    max_trials: 300,
                    refine: true,
                },
                similarity: SimilarityTolerance {
                    angle: 0.1,
                    offset: 0.05,
                },
                max_planes: 2,
                max_iterations: 5,
                min_inlier_count: 20,
                ..Default::default()
            },
            seed: 7,
            parallel: false,
        }
    }

    fn assert_partition(record: &ClusterRecord) {
        let mut seen = vec![false; record.points.len()];
        for &i in record
            .planes
            .iter()
            .flat_map(|p| p.indices.iter())
            .chain(record.residual_indices.iter())
        {
            assert!(!seen[i], "index {} assigned twice", i);
            seen[i] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(record.explained() + record.residual.len(), record.points.len());
    }

    #[test]
    fn test_step_splits_into_tread_and_riser() {
        let record = decompose_cluster(0, &step(0.0, 0.2), &params()).unwrap();
        assert_eq!(record.planes.len(), 2);
        assert_partition(&record);

        let tread = &record.planes[0];
        assert_eq!(tread.indices.len(), 144);
        assert_relative_eq!(tread.model.normal().z.abs(), 1.0, epsilon = 1e-3);
        assert_relative_eq!(tread.centroid().z, 0.2, epsilon = 1e-4);

        let riser = &record.planes[1];
        assert_eq!(riser.indices.len(), 96);
        assert_relative_eq!(riser.model.normal().x.abs(), 1.0, epsilon = 1e-3);
        assert!(record.residual.is_empty());
    }

    #[test]
    fn test_records_keep_cluster_order() {
        let clusters = vec![step(0.0, 0.2), PointCloud::new(), step(1.0, 0.4)];
        let records = decompose(&clusters, &params()).unwrap();

        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.index, i);
            assert_partition(record);
        }
        assert!(records[1].planes.is_empty());
        assert_eq!(records[1].stop, StopReason::TooFewPoints);
        assert_relative_eq!(records[2].planes[0].centroid().z, 0.4, epsilon = 1e-4);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let clusters: Vec<_> = (0..6).map(|i| step(i as f32, 0.2 * i as f32)).collect();
        let serial = decompose(&clusters, &params()).unwrap();
        let parallel = decompose(
            &clusters,
            &DecompositionParams {
                parallel: true,
                ..params()
            },
        )
        .unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_plane_budget_is_per_cluster() {
        let mut p = params();
        p.extraction.max_planes = 1;
        let records = decompose(&[step(0.0, 0.2), step(1.0, 0.4)], &p).unwrap();
        for record in &records {
            assert_eq!(record.planes.len(), 1);
            assert_eq!(record.residual.len(), 96);
            assert_partition(record);
        }
    }

    #[test]
    fn test_centroid_of_empty_record() {
        let record = PlaneRecord {
            model: PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap(),
            indices: Vec::new(),
            points: PointCloud::new(),
        };
        assert_eq!(record.centroid(), Point3f::origin());
    }
}
