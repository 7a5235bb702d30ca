//! Plane model and RANSAC plane fitting

use nalgebra::Vector4;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use stairseg_core::{Error, Point3f, PointCloud, Result, Vector3f};

use crate::normals::fit_local_plane;

/// A 3D plane `n·p + d = 0` with a unit normal `n` and signed offset `d`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneModel {
    normal: Vector3f,
    offset: f32,
}

impl PlaneModel {
    /// Create a plane from the coefficients of `ax + by + cz + d = 0`.
    ///
    /// The coefficients are scaled so the normal has unit length; its
    /// direction is kept as given.
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> Result<Self> {
        let normal = Vector3f::new(a, b, c);
        let norm = normal.norm();
        if !(norm > 1e-8) || !norm.is_finite() || !d.is_finite() {
            return Err(Error::DegenerateGeometry(format!(
                "plane normal ({}, {}, {}) has no direction",
                a, b, c
            )));
        }
        Ok(Self {
            normal: normal / norm,
            offset: d / norm,
        })
    }

    /// Create a plane model from three points
    ///
    /// Returns `None` when the points are collinear or coincident. The normal
    /// is put in canonical orientation (see [`PlaneModel::canonical`]).
    pub fn from_points(p1: &Point3f, p2: &Point3f, p3: &Point3f) -> Option<Self> {
        let normal = (p2 - p1).cross(&(p3 - p1));
        let magnitude = normal.magnitude();

        // Collinear or coincident sample
        if magnitude < 1e-8 || !magnitude.is_finite() {
            return None;
        }

        let normal = normal / magnitude;
        let d = -normal.dot(&p1.coords);
        Some(Self { normal, offset: d }.canonical())
    }

    /// Create a plane through `point` with the given normal
    pub fn from_point_normal(point: &Point3f, normal: &Vector3f) -> Result<Self> {
        Self::new(normal.x, normal.y, normal.z, -normal.dot(&point.coords))
    }

    /// The same plane with the normal flipped so its largest-magnitude
    /// component is positive.
    ///
    /// A plane fitted from three samples gets an arbitrary sign from the
    /// sample order; canonical orientation makes repeated fits of one surface
    /// comparable by angle and offset.
    pub fn canonical(self) -> Self {
        let dominant = self
            .normal
            .iter()
            .copied()
            .fold(0.0f32, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if dominant < 0.0 {
            self.flipped()
        } else {
            self
        }
    }

    /// The same plane described with the opposite normal
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            offset: -self.offset,
        }
    }

    /// This plane described with the normal on the same side as `reference`
    pub fn oriented_like(self, reference: &PlaneModel) -> Self {
        if self.normal.dot(&reference.normal) < 0.0 {
            self.flipped()
        } else {
            self
        }
    }

    /// Get the unit normal vector of the plane
    pub fn normal(&self) -> Vector3f {
        self.normal
    }

    /// Signed offset `d` of the plane equation
    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Coefficients `[a, b, c, d]`
    pub fn coefficients(&self) -> Vector4<f32> {
        Vector4::new(self.normal.x, self.normal.y, self.normal.z, self.offset)
    }

    /// Signed distance from the origin along the normal, `d / |n|`
    pub fn origin_distance(&self) -> f32 {
        self.offset / self.normal.norm()
    }

    /// Signed point-to-plane distance
    pub fn signed_distance(&self, point: &Point3f) -> f32 {
        self.normal.dot(&point.coords) + self.offset
    }

    /// Calculate the distance from a point to the plane
    pub fn distance_to_point(&self, point: &Point3f) -> f32 {
        self.signed_distance(point).abs()
    }

    /// Angle in radians between the two normals, `acos(clamp(n1·n2, -1, 1))`
    pub fn angle_to(&self, other: &PlaneModel) -> f32 {
        let cos = self.normal.dot(&other.normal) / (self.normal.norm() * other.normal.norm());
        cos.clamp(-1.0, 1.0).acos()
    }

    /// Count the candidates within `threshold` of the plane
    pub fn count_inliers(&self, points: &[Point3f], candidates: &[usize], threshold: f32) -> usize {
        candidates
            .iter()
            .filter(|&&i| self.distance_to_point(&points[i]) <= threshold)
            .count()
    }

    /// The candidates within `threshold` of the plane, in candidate order
    pub fn get_inliers(&self, points: &[Point3f], candidates: &[usize], threshold: f32) -> Vec<usize> {
        candidates
            .iter()
            .copied()
            .filter(|&i| self.distance_to_point(&points[i]) <= threshold)
            .collect()
    }
}

/// RANSAC parameters for single-plane fitting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum point-to-plane distance for an inlier
    pub distance_threshold: f32,
    /// Number of random 3-point samples to try
    pub max_trials: usize,
    /// Refit the winning model by least squares on its inliers
    pub refine: bool,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            distance_threshold: 0.03,
            max_trials: 1000,
            refine: true,
        }
    }
}

impl RansacParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.distance_threshold > 0.0) || !self.distance_threshold.is_finite() {
            return Err(Error::InvalidData("Threshold must be positive".to_string()));
        }
        if self.max_trials == 0 {
            return Err(Error::InvalidData("Max trials must be positive".to_string()));
        }
        Ok(())
    }
}

/// RANSAC plane fit result
#[derive(Debug, Clone)]
pub struct PlaneFit {
    /// The best plane model found
    pub model: PlaneModel,
    /// Indices of inlier points, into the slice given to the fitter
    pub inliers: Vec<usize>,
    /// Number of samples that produced a valid plane
    pub valid_trials: usize,
}

/// Fit a plane to the subset `candidates` of `points` using RANSAC.
///
/// Each trial samples 3 distinct candidates with `rng`; collinear samples are
/// skipped. The model with the most inliers wins, the earliest one on ties.
/// Inlier indices refer to `points` and follow the order of `candidates`.
///
/// # Errors
/// * `InsufficientPoints` - fewer than 3 candidates
/// * `NoModelFound` - every sample was degenerate
/// * `InvalidData` - non-positive threshold or zero trials
pub fn fit_plane<R: Rng + ?Sized>(
    points: &[Point3f],
    candidates: &[usize],
    params: &RansacParams,
    rng: &mut R,
) -> Result<PlaneFit> {
    params.validate()?;
    if candidates.len() < 3 {
        return Err(Error::InsufficientPoints {
            required: 3,
            found: candidates.len(),
        });
    }

    let threshold = params.distance_threshold;
    let mut best: Option<(PlaneModel, usize)> = None;
    let mut valid_trials = 0;

    for _ in 0..params.max_trials {
        let sample = index::sample(rng, candidates.len(), 3);
        let p1 = &points[candidates[sample.index(0)]];
        let p2 = &points[candidates[sample.index(1)]];
        let p3 = &points[candidates[sample.index(2)]];

        let Some(model) = PlaneModel::from_points(p1, p2, p3) else {
            continue;
        };
        valid_trials += 1;

        let score = model.count_inliers(points, candidates, threshold);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((model, score));
        }
    }

    let (mut model, score) = match best {
        Some((model, score)) if score > 0 => (model, score),
        _ => return Err(Error::NoModelFound),
    };
    let mut inliers = model.get_inliers(points, candidates, threshold);

    if params.refine {
        let refined = fit_local_plane(inliers.iter().map(|&i| &points[i]))
            .and_then(|plane| PlaneModel::from_point_normal(&plane.centroid, &plane.normal).ok())
            .map(PlaneModel::canonical);
        if let Some(refined) = refined {
            let refined_inliers = refined.get_inliers(points, candidates, threshold);
            if refined_inliers.len() >= score {
                model = refined;
                inliers = refined_inliers;
            }
        }
    }

    Ok(PlaneFit {
        model,
        inliers,
        valid_trials,
    })
}

/// Plane segmentation over a whole cloud using RANSAC
///
/// Convenience wrapper around [`fit_plane`] with every point as a candidate.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `params` - Distance threshold, trial count and refinement switch
/// * `rng` - Sampler; seed it for reproducible results
pub fn segment_plane<R: Rng + ?Sized>(
    cloud: &PointCloud<Point3f>,
    params: &RansacParams,
    rng: &mut R,
) -> Result<PlaneFit> {
    let candidates: Vec<usize> = (0..cloud.len()).collect();
    fit_plane(&cloud.points, &candidates, params, rng)
}
