//! Nearest neighbor search implementations

use rstar::primitives::GeomWithData;
use rstar::RTree;
use stairseg_core::{NearestNeighborSearch, Point3f};

type IndexedPoint = GeomWithData<[f32; 3], usize>;

/// R*-tree backed neighbor search, the default structure for clustering,
/// smoothing and normal estimation
pub struct RTreeSearch {
    tree: RTree<IndexedPoint>,
}

impl RTreeSearch {
    pub fn new(points: &[Point3f]) -> Self {
        let indexed = points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint::new([p.x, p.y, p.z], i))
            .collect();

        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

fn distance_to(entry: &IndexedPoint, query: &[f32; 3]) -> f32 {
    let p = entry.geom();
    let dx = p[0] - query[0];
    let dy = p[1] - query[1];
    let dz = p[2] - query[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

impl NearestNeighborSearch for RTreeSearch {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor_iter(&q)
            .take(k)
            .map(|entry| (entry.data, distance_to(entry, &q)))
            .collect()
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if radius < 0.0 {
            return Vec::new();
        }
        let q = [query.x, query.y, query.z];
        self.tree
            .locate_within_distance(q, radius * radius)
            .map(|entry| (entry.data, distance_to(entry, &q)))
            .collect()
    }
}

/// Simple brute force nearest neighbor search for small datasets
pub struct BruteForceSearch {
    points: Vec<Point3f>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3f]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        let mut distances: Vec<(usize, f32)> = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, point)| (idx, nalgebra::distance(point, query)))
            .collect();

        // Stable sort keeps lower indices first among equal distances
        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        distances.truncate(k);
        distances
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        let radius_squared = radius * radius;
        self.points
            .iter()
            .enumerate()
            .filter_map(|(idx, point)| {
                let distance_squared = nalgebra::distance_squared(point, query);
                if distance_squared <= radius_squared {
                    Some((idx, distance_squared.sqrt()))
                } else {
                    None
                }
            })
            .collect()
    }
}
