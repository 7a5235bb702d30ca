//! Geometric filters
//!
//! Pure cloud-to-cloud functions applied before clustering: an axis-range crop
//! and voxel-grid downsampling with an anisotropic leaf.

use std::collections::BTreeMap;

use stairseg_core::{Axis, Bounded, Error, Point3f, PointCloud, Result, Vector3f};

/// Axis-range (passthrough) filter
///
/// Keeps the points whose coordinate on `axis` lies in the inclusive range
/// `[min, max]`. Input order is preserved.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `axis` - The field to filter on
/// * `min` - Lower bound (inclusive)
/// * `max` - Upper bound (inclusive)
///
/// # Example
/// ```rust
/// use stairseg_core::{Axis, PointCloud, Point3f};
/// use stairseg_algorithms::passthrough_filter;
///
/// fn main() -> stairseg_core::Result<()> {
///     let cloud = PointCloud::from_points(vec![
///         Point3f::new(0.0, -1.0, 0.0),
///         Point3f::new(0.0, 0.2, 0.0),
///         Point3f::new(0.0, 0.9, 0.0),
///     ]);
///
///     let cropped = passthrough_filter(&cloud, Axis::Y, -0.7, 0.7)?;
///     assert_eq!(cropped.len(), 1);
///     Ok(())
/// }
/// ```
pub fn passthrough_filter(
    cloud: &PointCloud<Point3f>,
    axis: Axis,
    min: f32,
    max: f32,
) -> Result<PointCloud<Point3f>> {
    if min > max {
        return Err(Error::InvalidData(format!(
            "passthrough range is inverted: [{}, {}]",
            min, max
        )));
    }

    Ok(cloud
        .iter()
        .filter(|p| {
            let v = axis.component(p);
            v >= min && v <= max
        })
        .copied()
        .collect())
}

fn validate_leaf(leaf: &Vector3f) -> Result<()> {
    if leaf.iter().any(|&l| !(l > 0.0) || !l.is_finite()) {
        return Err(Error::InvalidData(format!(
            "voxel leaf sizes must be positive, got ({}, {}, {})",
            leaf.x, leaf.y, leaf.z
        )));
    }
    Ok(())
}

/// Voxel grid filtering
///
/// Groups points into axis-aligned cells of size `leaf` (x, y, z) and replaces
/// each occupied cell by the centroid of its points. The output is ordered by
/// cell, not by input position.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `leaf` - Cell size along each axis
///
/// # Returns
/// * `Result<PointCloud<Point3f>>` - Downsampled point cloud
///
/// # Example
/// ```rust
/// use stairseg_core::{PointCloud, Point3f, Vector3f};
/// use stairseg_algorithms::voxel_grid_filter;
///
/// fn main() -> stairseg_core::Result<()> {
///     let cloud = PointCloud::from_points(vec![
///         Point3f::new(0.0, 0.0, 0.0),
///         Point3f::new(0.1, 0.0, 0.0),
///         Point3f::new(0.0, 0.1, 0.0),
///         Point3f::new(1.0, 1.0, 1.0),
///     ]);
///
///     let filtered = voxel_grid_filter(&cloud, &Vector3f::new(0.5, 0.5, 0.5))?;
///     assert_eq!(filtered.len(), 2);
///     Ok(())
/// }
/// ```
pub fn voxel_grid_filter(cloud: &PointCloud<Point3f>, leaf: &Vector3f) -> Result<PointCloud<Point3f>> {
    validate_leaf(leaf)?;
    if cloud.is_empty() {
        return Ok(PointCloud::new());
    }

    let (min, _) = cloud.bounding_box();
    let cell_of = |p: &Point3f| -> (i64, i64, i64) {
        (
            ((p.x - min.x) / leaf.x).floor() as i64,
            ((p.y - min.y) / leaf.y).floor() as i64,
            ((p.z - min.z) / leaf.z).floor() as i64,
        )
    };

    let mut cells: BTreeMap<(i64, i64, i64), (Vector3f, usize)> = BTreeMap::new();
    for point in cloud.iter() {
        let entry = cells.entry(cell_of(point)).or_insert((Vector3f::zeros(), 0));
        entry.0 += point.coords;
        entry.1 += 1;
    }

    Ok(cells
        .values()
        .map(|(sum, count)| Point3f::from(sum / *count as f32))
        .collect())
}

/// Crop on one axis, then voxel-downsample what is left
///
/// This is the combined "filter field + leaf size" downsampling used on raw
/// scans: points outside `[min, max]` on `axis` are dropped before gridding.
pub fn voxel_grid_filter_along_axis(
    cloud: &PointCloud<Point3f>,
    axis: Axis,
    min: f32,
    max: f32,
    leaf: &Vector3f,
) -> Result<PointCloud<Point3f>> {
    let cropped = passthrough_filter(cloud, axis, min, max)?;
    voxel_grid_filter(&cropped, leaf)
}
