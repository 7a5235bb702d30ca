//! Range frames: the unit of work handed to the pipeline

use crate::error::{Error, Result};
use crate::point::{is_finite_point, Point3f};
use crate::point_cloud::PointCloud;
use serde::{Deserialize, Serialize};

/// One delivery from the range sensor: ordered points plus the reference
/// frame they are expressed in.
///
/// Construction is the ingestion boundary. A frame with a non-finite
/// coordinate is rejected here so nothing downstream ever fits a plane
/// through NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRangeFrame")]
pub struct RangeFrame {
    frame_id: String,
    cloud: PointCloud<Point3f>,
}

/// Unchecked wire form; deserialization goes through [`RangeFrame::new`]
#[derive(Deserialize)]
struct RawRangeFrame {
    frame_id: String,
    cloud: PointCloud<Point3f>,
}

impl TryFrom<RawRangeFrame> for RangeFrame {
    type Error = Error;

    fn try_from(raw: RawRangeFrame) -> Result<Self> {
        RangeFrame::new(raw.frame_id, raw.cloud)
    }
}

impl RangeFrame {
    /// Validate and wrap a sensor delivery
    pub fn new(frame_id: impl Into<String>, cloud: PointCloud<Point3f>) -> Result<Self> {
        if let Some(index) = cloud.iter().position(|p| !is_finite_point(p)) {
            let p = cloud[index];
            return Err(Error::MalformedInput {
                index,
                reason: format!("non-finite coordinate ({}, {}, {})", p.x, p.y, p.z),
            });
        }

        Ok(Self {
            frame_id: frame_id.into(),
            cloud,
        })
    }

    /// Build a frame from raw `[x, y, z]` triples
    pub fn from_xyz(frame_id: impl Into<String>, xyz: &[[f32; 3]]) -> Result<Self> {
        let cloud = xyz
            .iter()
            .map(|&[x, y, z]| Point3f::new(x, y, z))
            .collect();
        Self::new(frame_id, cloud)
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn cloud(&self) -> &PointCloud<Point3f> {
        &self.cloud
    }

    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    pub fn into_cloud(self) -> PointCloud<Point3f> {
        self.cloud
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accepts_finite_points() {
        let frame = RangeFrame::from_xyz("lidar", &[[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(frame.frame_id(), "lidar");
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_frame_rejects_nan() {
        let result = RangeFrame::from_xyz("lidar", &[[0.0, 0.0, 0.0], [f32::NAN, 0.0, 1.0]]);
        match result {
            Err(Error::MalformedInput { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_rejects_infinity() {
        let result = RangeFrame::from_xyz("lidar", &[[0.0, f32::NEG_INFINITY, 0.0]]);
        assert!(matches!(result, Err(Error::MalformedInput { index: 0, .. })));
    }

    #[test]
    fn test_deserialized_frame_is_validated() {
        let frame: RangeFrame = serde_json::from_str(
            r#"{ "frame_id": "lidar", "cloud": { "points": [[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]] } }"#,
        )
        .unwrap();
        assert_eq!(frame.len(), 2);

        // 1e300 overflows f32 to infinity
        let result = serde_json::from_str::<RangeFrame>(
            r#"{ "frame_id": "lidar", "cloud": { "points": [[0.0, 0.0, 0.0], [1e300, 0.0, 0.0]] } }"#,
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Malformed input at point 1"), "{}", message);
    }

    #[test]
    fn test_empty_frame_is_valid() {
        let frame = RangeFrame::new("lidar", PointCloud::new()).unwrap();
        assert!(frame.is_empty());
    }
}
