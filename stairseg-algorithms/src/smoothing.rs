//! Surface smoothing
//!
//! A first-order moving-least-squares pass: every point is projected onto the
//! least-squares plane of its radius neighborhood. Sensor noise across a flat
//! tread or riser collapses onto the surface while edges between surfaces are
//! only softened.

use rayon::prelude::*;
use stairseg_core::{Error, NearestNeighborSearch, Point3f, PointCloud, Result};

use crate::nearest_neighbor::RTreeSearch;
use crate::normals::fit_local_plane;

/// Project each point onto the local plane of its `search_radius` neighborhood.
///
/// Points with fewer than three neighbors, or a degenerate neighborhood, are
/// kept unchanged. Output order matches input order.
pub fn smooth_surface(cloud: &PointCloud<Point3f>, search_radius: f32) -> Result<PointCloud<Point3f>> {
    if !(search_radius > 0.0) {
        return Err(Error::InvalidData(
            "search_radius must be positive".to_string(),
        ));
    }
    if cloud.len() < 3 {
        return Ok(cloud.clone());
    }

    let search = RTreeSearch::new(&cloud.points);
    let points = &cloud.points;

    let smoothed: Vec<Point3f> = points
        .par_iter()
        .map(|point| {
            let neighbors = search.find_radius_neighbors(point, search_radius);
            match fit_local_plane(neighbors.iter().map(|(i, _)| &points[*i])) {
                Some(plane) => {
                    let offset = (point - plane.centroid).dot(&plane.normal);
                    point - plane.normal * offset
                }
                None => *point,
            }
        })
        .collect();

    Ok(PointCloud::from_points(smoothed))
}
