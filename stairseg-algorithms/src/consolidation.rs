//! Plane consolidation
//!
//! Decides whether a freshly fitted plane is a surface already in the
//! registry or a new one. The policy is first-match-wins: the registry is
//! scanned in order and the first similar entry is *replaced* by the
//! candidate. When two entries are both similar to a candidate the earlier
//! one is always chosen, so the outcome depends on registry order. Whether a
//! best-match policy would be more correct is unresolved; it is deliberately
//! not used here.

use serde::{Deserialize, Serialize};
use stairseg_core::{Error, Result};

use crate::segmentation::PlaneModel;

/// Thresholds for treating two planes as the same surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityTolerance {
    /// Maximum angle between normals, in radians (exclusive)
    pub angle: f32,
    /// Maximum difference of origin distances (exclusive)
    pub offset: f32,
}

impl Default for SimilarityTolerance {
    fn default() -> Self {
        Self {
            angle: 0.1,
            offset: 0.15,
        }
    }
}

impl SimilarityTolerance {
    /// Angle tolerance plus an offset tolerance of five fitting thresholds
    pub fn for_distance_threshold(angle: f32, distance_threshold: f32) -> Self {
        Self {
            angle,
            offset: distance_threshold * 5.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.angle > 0.0) || !(self.offset > 0.0) {
            return Err(Error::InvalidData(format!(
                "similarity tolerances must be positive, got angle {} offset {}",
                self.angle, self.offset
            )));
        }
        Ok(())
    }
}

/// Two planes are similar iff the angle between their normals is below
/// `tolerance.angle` and their origin distances differ by less than
/// `tolerance.offset`.
///
/// `b` is first described with its normal on the same side as `a`'s, so the
/// two sign conventions of one surface compare equal.
pub fn is_similar_plane(a: &PlaneModel, b: &PlaneModel, tolerance: &SimilarityTolerance) -> bool {
    let b = b.oriented_like(a);
    let angle = a.angle_to(&b);
    let offset_difference = (a.origin_distance() - b.origin_distance()).abs();
    angle < tolerance.angle && offset_difference < tolerance.offset
}

/// Index of the first registry entry similar to `candidate`
pub fn find_similar(
    registry: &[PlaneModel],
    candidate: &PlaneModel,
    tolerance: &SimilarityTolerance,
) -> Option<usize> {
    registry
        .iter()
        .position(|existing| is_similar_plane(existing, candidate, tolerance))
}

/// Replace the first similar entry with `candidate`, or append it.
///
/// Returns the index that was replaced, or `None` when the candidate was
/// appended as a new entry.
pub fn merge_or_add(
    registry: &mut Vec<PlaneModel>,
    candidate: PlaneModel,
    tolerance: &SimilarityTolerance,
) -> Option<usize> {
    match find_similar(registry, &candidate, tolerance) {
        Some(index) => {
            registry[index] = candidate;
            Some(index)
        }
        None => {
            registry.push(candidate);
            None
        }
    }
}

/// One distinct surface: its latest model and the point indices it claims
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub model: PlaneModel,
    pub inliers: Vec<usize>,
}

/// What [`PlaneRegistry::merge_or_add`] did with a candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Consolidation {
    /// The candidate became a new entry at `index`
    Added { index: usize },
    /// The candidate replaced the entry at `index`; `superseded` holds the
    /// inliers the old entry claimed
    Updated { index: usize, superseded: Vec<usize> },
}

/// Registry of plane identities for one decomposition run
///
/// Entries are only added or replaced, never removed. A registry lives for
/// one extraction and is not shared between clusters.
#[derive(Debug, Clone)]
pub struct PlaneRegistry {
    entries: Vec<RegistryEntry>,
    tolerance: SimilarityTolerance,
}

impl PlaneRegistry {
    pub fn new(tolerance: SimilarityTolerance) -> Self {
        Self {
            entries: Vec::new(),
            tolerance,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn models(&self) -> Vec<PlaneModel> {
        self.entries.iter().map(|e| e.model).collect()
    }

    pub fn into_entries(self) -> Vec<RegistryEntry> {
        self.entries
    }

    /// Record a fitted plane, replacing the first similar entry wholesale
    pub fn merge_or_add(&mut self, model: PlaneModel, inliers: Vec<usize>) -> Consolidation {
        let matched = self
            .entries
            .iter()
            .position(|existing| is_similar_plane(&existing.model, &model, &self.tolerance));

        match matched {
            Some(index) => {
                let previous = std::mem::replace(&mut self.entries[index], RegistryEntry { model, inliers });
                Consolidation::Updated {
                    index,
                    superseded: previous.inliers,
                }
            }
            None => {
                self.entries.push(RegistryEntry { model, inliers });
                Consolidation::Added {
                    index: self.entries.len() - 1,
                }
            }
        }
    }
}
