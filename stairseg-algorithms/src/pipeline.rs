//! End-to-end scene decomposition for one range frame
//!
//! filter -> (smooth) -> cluster -> per-cluster downsample -> decompose

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use stairseg_core::{Axis, Error, Point3f, PointCloud, RangeFrame, Result, Vector3f};

use crate::clustering::{cluster, ClusterParams};
use crate::decomposition::{decompose, ClusterRecord, DecompositionParams};
use crate::filtering::{passthrough_filter, voxel_grid_filter, voxel_grid_filter_along_axis};
use crate::smoothing::smooth_surface;

/// Inclusive crop on one axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub axis: Axis,
    pub min: f32,
    pub max: f32,
}

/// Crop on one axis then voxel-downsample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisVoxel {
    pub axis: Axis,
    pub min: f32,
    pub max: f32,
    pub leaf: Vector3f,
}

/// Configuration of the whole pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Applied in order before downsampling
    pub passthrough: Vec<AxisRange>,
    pub voxel: Option<AxisVoxel>,
    /// Moving-least-squares radius; `None` skips smoothing
    pub smoothing_radius: Option<f32>,
    pub clustering: ClusterParams,
    /// Leaf for downsampling each cluster before plane extraction
    pub cluster_leaf: Option<Vector3f>,
    pub decomposition: DecompositionParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            passthrough: vec![AxisRange {
                axis: Axis::Y,
                min: -0.7,
                max: 0.7,
            }],
            voxel: Some(AxisVoxel {
                axis: Axis::Z,
                min: -1.0,
                max: 2.5,
                leaf: Vector3f::new(0.08, 0.08, 0.08),
            }),
            smoothing_radius: None,
            clustering: ClusterParams::default(),
            cluster_leaf: Some(Vector3f::new(0.16, 0.40, 0.16)),
            decomposition: DecompositionParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("failed to parse pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        for range in &self.passthrough {
            if range.min > range.max {
                return Err(Error::Config(format!(
                    "passthrough range on {:?} is inverted: [{}, {}]",
                    range.axis, range.min, range.max
                )));
            }
        }
        if let Some(voxel) = &self.voxel {
            if voxel.min > voxel.max {
                return Err(Error::Config(format!(
                    "voxel range on {:?} is inverted: [{}, {}]",
                    voxel.axis, voxel.min, voxel.max
                )));
            }
            check_leaf(&voxel.leaf)?;
        }
        if let Some(leaf) = &self.cluster_leaf {
            check_leaf(leaf)?;
        }
        if let Some(radius) = self.smoothing_radius {
            if !(radius > 0.0) {
                return Err(Error::Config(format!(
                    "smoothing radius must be positive, got {}",
                    radius
                )));
            }
        }
        self.clustering.validate()?;
        self.decomposition.validate()
    }
}

fn check_leaf(leaf: &Vector3f) -> Result<()> {
    if leaf.iter().any(|v| !(*v > 0.0)) {
        return Err(Error::Config(format!(
            "leaf sizes must be positive, got [{}, {}, {}]",
            leaf.x, leaf.y, leaf.z
        )));
    }
    Ok(())
}

/// Decomposition of one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneModel {
    pub frame_id: String,
    /// The cloud after filtering, the input to clustering
    pub filtered: PointCloud<Point3f>,
    pub clusters: Vec<ClusterRecord>,
}

impl SceneModel {
    pub fn plane_count(&self) -> usize {
        self.clusters.iter().map(|c| c.planes.len()).sum()
    }

    pub fn residual_count(&self) -> usize {
        self.clusters.iter().map(|c| c.residual.len()).sum()
    }
}

/// Frame-stateless scene decomposition
///
/// # Example
/// ```rust
/// use stairseg_core::RangeFrame;
/// use stairseg_algorithms::{PipelineConfig, ScenePipeline};
///
/// fn main() -> stairseg_core::Result<()> {
///     let pipeline = ScenePipeline::new(PipelineConfig::default())?;
///     let frame = RangeFrame::from_xyz("empty", &[])?;
///
///     let scene = pipeline.process(&frame)?;
///     assert!(scene.clusters.is_empty());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ScenePipeline {
    config: PipelineConfig,
}

impl ScenePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on `frame`
    pub fn process(&self, frame: &RangeFrame) -> Result<SceneModel> {
        let filtered = self.filter(frame.cloud())?;
        debug!(
            "frame {}: {} of {} points after filtering",
            frame.frame_id(),
            filtered.len(),
            frame.len()
        );

        let mut clusters = cluster(&filtered, &self.config.clustering)?;
        if let Some(leaf) = &self.config.cluster_leaf {
            clusters = clusters
                .iter()
                .map(|c| voxel_grid_filter(c, leaf))
                .collect::<Result<Vec<_>>>()?;
        }

        let records = decompose(&clusters, &self.config.decomposition)?;
        let scene = SceneModel {
            frame_id: frame.frame_id().to_string(),
            filtered,
            clusters: records,
        };

        info!(
            "frame {}: {} clusters, {} planes, {} residual points",
            scene.frame_id,
            scene.clusters.len(),
            scene.plane_count(),
            scene.residual_count()
        );
        Ok(scene)
    }

    fn filter(&self, cloud: &PointCloud<Point3f>) -> Result<PointCloud<Point3f>> {
        let mut current = cloud.clone();
        for range in &self.config.passthrough {
            current = passthrough_filter(&current, range.axis, range.min, range.max)?;
        }
        if let Some(voxel) = &self.config.voxel {
            current =
                voxel_grid_filter_along_axis(&current, voxel.axis, voxel.min, voxel.max, &voxel.leaf)?;
        }
        if let Some(radius) = self.config.smoothing_radius {
            current = smooth_surface(&current, radius)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::ClusterSizeBounds;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.decomposition.extraction.max_planes, 2);
        assert_eq!(config.decomposition.extraction.ransac.max_trials, 1000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "smoothing_radius": 0.05,
            "clustering": { "tolerance": 0.2, "size": { "mode": "absolute", "min": 5, "max": 500 } },
            "decomposition": { "seed": 42, "extraction": { "max_planes": 3 } }
        }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();

        assert_eq!(config.smoothing_radius, Some(0.05));
        assert_eq!(config.clustering.tolerance, 0.2);
        assert_eq!(config.clustering.size, ClusterSizeBounds::Absolute { min: 5, max: 500 });
        assert_eq!(config.clustering.normal_k, 50);
        assert_eq!(config.decomposition.seed, 42);
        assert_eq!(config.decomposition.extraction.max_planes, 3);
        assert_eq!(config.decomposition.extraction.max_iterations, 5);
        assert_eq!(config.passthrough, PipelineConfig::default().passthrough);
    }

    #[test]
    fn test_bad_configs_are_rejected() {
        assert!(matches!(
            PipelineConfig::from_json_str("{ not json"),
            Err(Error::Config(_))
        ));
        assert!(PipelineConfig::from_json_str(
            r#"{ "passthrough": [ { "axis": "x", "min": 1.0, "max": 0.0 } ] }"#
        )
        .is_err());
        assert!(PipelineConfig::from_json_str(r#"{ "cluster_leaf": [0.1, 0.0, 0.1] }"#).is_err());
        assert!(matches!(
            PipelineConfig::load("/nonexistent/stairseg.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(PipelineConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_filter_stages_apply_in_order() {
        let config = PipelineConfig {
            voxel: None,
            ..Default::default()
        };
        let pipeline = ScenePipeline::new(config).unwrap();
        let cloud = PointCloud::from_points(vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.0, 0.8, 0.0),
            Point3f::new(0.0, -0.8, 0.0),
        ]);
        assert_eq!(pipeline.filter(&cloud).unwrap().len(), 1);
    }
}
