//! Iterative plane extraction ("extract and deflate")
//!
//! Repeatedly fits the dominant plane in the points not yet explained, hands
//! the fit to a [`PlaneRegistry`] and removes its inliers, until a guard
//! fails. Points are tracked by index into the input slice, so duplicate
//! coordinates never make removal ambiguous.

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use stairseg_core::{Error, Point3f, Result};

use crate::consolidation::{Consolidation, PlaneRegistry, RegistryEntry, SimilarityTolerance};
use crate::segmentation::{fit_plane, RansacParams};

/// Parameters of one extraction run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionParams {
    pub ransac: RansacParams,
    pub similarity: SimilarityTolerance,
    /// Registry size at which extraction stops
    pub max_planes: usize,
    /// Upper bound on fit-and-remove rounds
    pub max_iterations: usize,
    /// A fit with fewer inliers ends the run
    pub min_inlier_count: usize,
    /// Stop once at most this fraction of the input is left unexplained
    pub min_remaining_fraction: f32,
    /// Order the resulting planes by ascending offset instead of discovery
    pub sort_by_offset: bool,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        let ransac = RansacParams::default();
        Self {
            ransac,
            similarity: SimilarityTolerance::for_distance_threshold(0.1, ransac.distance_threshold),
            max_planes: 2,
            max_iterations: 5,
            min_inlier_count: 3,
            min_remaining_fraction: 0.0,
            sort_by_offset: false,
        }
    }
}

impl ExtractionParams {
    pub fn validate(&self) -> Result<()> {
        self.ransac.validate()?;
        self.similarity.validate()?;
        if !(0.0..=1.0).contains(&self.min_remaining_fraction) {
            return Err(Error::InvalidData(format!(
                "min_remaining_fraction must be in [0, 1], got {}",
                self.min_remaining_fraction
            )));
        }
        Ok(())
    }
}

/// Why an extraction run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    IterationLimit,
    PlaneLimit,
    TooFewPoints,
    CoverageReached,
    NoModel,
    BelowMinInliers,
}

/// Result of one extraction run
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Distinct planes with the indices they claim
    pub planes: Vec<RegistryEntry>,
    /// Indices claimed by no plane, ascending
    pub residual: Vec<usize>,
    /// Fit-and-remove rounds performed
    pub iterations: usize,
    pub stop: StopReason,
}

impl Extraction {
    /// Number of points assigned to planes
    pub fn explained(&self) -> usize {
        self.planes.iter().map(|p| p.inliers.len()).sum()
    }
}

/// Extract up to `params.max_planes` planes from `points`.
///
/// Each round fits a plane to the remaining points, records it in a fresh
/// registry (replacing a similar earlier plane, whose points then become
/// residual) and removes its inliers. The run stops when the iteration or
/// plane budget is spent, three or fewer points remain, the coverage target
/// is met, or the fitter finds nothing with at least `min_inlier_count`
/// inliers. Every input index ends up in exactly one plane or the residual.
///
/// Only invalid parameters produce an error; "no more planes" is a normal
/// stop.
pub fn extract_planes<R: Rng + ?Sized>(
    points: &[Point3f],
    params: &ExtractionParams,
    rng: &mut R,
) -> Result<Extraction> {
    params.validate()?;

    let total = points.len();
    let mut remaining: Vec<usize> = (0..total).collect();
    let mut released: Vec<usize> = Vec::new();
    let mut registry = PlaneRegistry::new(params.similarity);
    let mut iterations = 0;
    let mut claimed = vec![false; total];

    let stop = loop {
        if iterations >= params.max_iterations {
            break StopReason::IterationLimit;
        }
        if remaining.len() <= 3 {
            break StopReason::TooFewPoints;
        }
        if registry.len() >= params.max_planes {
            break StopReason::PlaneLimit;
        }
        if remaining.len() as f32 <= params.min_remaining_fraction * total as f32 {
            break StopReason::CoverageReached;
        }

        let fit = match fit_plane(points, &remaining, &params.ransac, rng) {
            Ok(fit) => fit,
            Err(e) if e.is_recoverable() => {
                debug!("iteration {}: no plane ({})", iterations, e);
                break StopReason::NoModel;
            }
            Err(e) => return Err(e),
        };

        if fit.inliers.len() < params.min_inlier_count {
            debug!(
                "iteration {}: best plane has {} inliers, below {}",
                iterations,
                fit.inliers.len(),
                params.min_inlier_count
            );
            break StopReason::BelowMinInliers;
        }

        for &i in &fit.inliers {
            claimed[i] = true;
        }
        remaining.retain(|&i| !claimed[i]);

        let coefficients = fit.model.coefficients();
        match registry.merge_or_add(fit.model, fit.inliers) {
            Consolidation::Added { index } => {
                debug!(
                    "iteration {}: new plane {} [{:.3}, {:.3}, {:.3}, {:.3}], {} points left",
                    iterations,
                    index,
                    coefficients.x,
                    coefficients.y,
                    coefficients.z,
                    coefficients.w,
                    remaining.len()
                );
            }
            Consolidation::Updated { index, superseded } => {
                debug!(
                    "iteration {}: plane {} refitted, {} superseded points released",
                    iterations,
                    index,
                    superseded.len()
                );
                released.extend(superseded);
            }
        }

        iterations += 1;
    };

    let mut residual = remaining;
    residual.extend(released);
    residual.sort_unstable();

    let mut planes = registry.into_entries();
    if params.sort_by_offset {
        planes.sort_by(|a, b| {
            a.model
                .offset()
                .partial_cmp(&b.model.offset())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    Ok(Extraction {
        planes,
        residual,
        iterations,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Two horizontal steps, 0.2 apart in z and 1.0 apart in x
    fn two_treads() -> Vec<Point3f> {
        let mut points = Vec::new();
        for i in 0..15 {
            for j in 0..15 {
                points.push(Point3f::new(i as f32 * 0.05, j as f32 * 0.05, 0.0));
            }
        }
        for i in 0..10 {
            for j in 0..10 {
                points.push(Point3f::new(1.0 + i as f32 * 0.05, j as f32 * 0.05, 0.2));
            }
        }
        points
    }

    fn params() -> ExtractionParams {
        ExtractionParams {
            ransac: RansacParams {
                distance_threshold: 0.01,
                max_trials: 200,
                refine: true,
            },
            similarity: SimilarityTolerance {
                angle: 0.1,
                offset: 0.05,
            },
            max_planes: 4,
            max_iterations: 10,
            min_inlier_count: 20,
            ..Default::default()
        }
    }

    fn assert_partition(extraction: &Extraction, total: usize) {
        let mut seen = vec![false; total];
        for index in extraction
            .planes
            .iter()
            .flat_map(|p| p.inliers.iter())
            .chain(extraction.residual.iter())
        {
            assert!(!seen[*index], "index {} assigned twice", index);
            seen[*index] = true;
        }
        assert!(seen.iter().all(|&s| s), "some index was dropped");
    }

    #[test]
    fn test_extracts_both_treads() {
        let points = two_treads();
        let mut rng = StdRng::seed_from_u64(3);
        let extraction = extract_planes(&points, &params(), &mut rng).unwrap();

        assert_eq!(extraction.planes.len(), 2);
        assert!(extraction.residual.is_empty());
        assert_partition(&extraction, points.len());

        let mut sizes: Vec<usize> = extraction.planes.iter().map(|p| p.inliers.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![100, 225]);
    }

    #[test]
    fn test_duplicate_coordinates_are_assigned_once() {
        // Every point appears twice; both copies must land in the same plane
        let points: Vec<Point3f> = two_treads().into_iter().flat_map(|p| [p, p]).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let extraction = extract_planes(&points, &params(), &mut rng).unwrap();

        assert_eq!(extraction.planes.len(), 2);
        assert!(extraction.residual.is_empty());
        assert_partition(&extraction, points.len());

        let mut sizes: Vec<usize> = extraction.planes.iter().map(|p| p.inliers.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![200, 450]);

        for plane in &extraction.planes {
            for &i in &plane.inliers {
                assert!(plane.inliers.contains(&(i ^ 1)), "copy of {} split off", i);
            }
        }
    }

    #[test]
    fn test_plane_budget_is_respected() {
        let points = two_treads();
        let mut rng = StdRng::seed_from_u64(3);
        let params = ExtractionParams {
            max_planes: 1,
            ..params()
        };
        let extraction = extract_planes(&points, &params, &mut rng).unwrap();

        assert_eq!(extraction.planes.len(), 1);
        assert_eq!(extraction.stop, StopReason::PlaneLimit);
        assert_eq!(extraction.planes[0].inliers.len(), 225);
        assert_eq!(extraction.residual.len(), 100);
        assert_partition(&extraction, points.len());
    }

    #[test]
    fn test_terminates_on_iteration_limit() {
        let points = two_treads();
        let mut rng = StdRng::seed_from_u64(3);
        let params = ExtractionParams {
            max_iterations: 1,
            ..params()
        };
        let extraction = extract_planes(&points, &params, &mut rng).unwrap();
        assert_eq!(extraction.iterations, 1);
        assert_eq!(extraction.stop, StopReason::IterationLimit);
    }

    #[test]
    fn test_tiny_input_stops_immediately() {
        let points = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ];
        let mut rng = StdRng::seed_from_u64(0);
        let extraction = extract_planes(&points, &params(), &mut rng).unwrap();
        assert!(extraction.planes.is_empty());
        assert_eq!(extraction.residual, vec![0, 1, 2]);
        assert_eq!(extraction.stop, StopReason::TooFewPoints);
    }

    #[test]
    fn test_collinear_input_stops_without_model() {
        let points: Vec<Point3f> = (0..50).map(|i| Point3f::new(i as f32 * 0.1, 0.0, 0.0)).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let extraction = extract_planes(&points, &params(), &mut rng).unwrap();
        assert!(extraction.planes.is_empty());
        assert_eq!(extraction.residual.len(), 50);
        assert_eq!(extraction.stop, StopReason::NoModel);
    }

    #[test]
    fn test_coverage_target_stops_early() {
        let points = two_treads();
        let mut rng = StdRng::seed_from_u64(3);
        // After the large tread, 100 of 325 points (~31%) remain
        let params = ExtractionParams {
            min_remaining_fraction: 0.4,
            ..params()
        };
        let extraction = extract_planes(&points, &params, &mut rng).unwrap();
        assert_eq!(extraction.planes.len(), 1);
        assert_eq!(extraction.stop, StopReason::CoverageReached);
    }

    #[test]
    fn test_refit_of_known_plane_releases_old_points() {
        // Two parallel patches 0.3 apart with an offset tolerance of 0.5: the
        // second fit matches the first plane and replaces it, so the first
        // patch becomes residual
        let mut points = Vec::new();
        for i in 0..12 {
            for j in 0..12 {
                points.push(Point3f::new(i as f32 * 0.05, j as f32 * 0.05, 0.0));
            }
        }
        for i in 0..8 {
            for j in 0..8 {
                points.push(Point3f::new(0.6 + i as f32 * 0.05, j as f32 * 0.05, 0.3));
            }
        }
        let params = ExtractionParams {
            ransac: RansacParams {
                distance_threshold: 0.01,
                max_trials: 200,
                refine: false,
            },
            similarity: SimilarityTolerance {
                angle: 0.1,
                offset: 0.5,
            },
            min_inlier_count: 10,
            ..params()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let extraction = extract_planes(&points, &params, &mut rng).unwrap();

        assert_eq!(extraction.planes.len(), 1);
        assert_eq!(extraction.planes[0].inliers.len(), 64);
        assert_eq!(extraction.residual.len(), 144);
        assert_partition(&extraction, points.len());
    }

    #[test]
    fn test_sort_by_offset() {
        let points = two_treads();
        let mut rng = StdRng::seed_from_u64(3);
        let params = ExtractionParams {
            sort_by_offset: true,
            ..params()
        };
        let extraction = extract_planes(&points, &params, &mut rng).unwrap();
        let offsets: Vec<f32> = extraction.planes.iter().map(|p| p.model.offset()).collect();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_invalid_fraction() {
        let params = ExtractionParams {
            min_remaining_fraction: 1.5,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        assert!(extract_planes(&two_treads(), &params, &mut rng).is_err());
    }
}
