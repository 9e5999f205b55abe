//! In-process list-based inverted-file (IVF) vector index.
//!
//! Embeddings are grouped into lists around centroids; a query probes the
//! `ann_probes` nearest lists and computes exact cosine similarity within
//! them. Small corpora are scanned exhaustively, so recall only becomes
//! approximate once the index is large enough for probing to pay off.
//!
//! The index is in-memory and rebuilt from the SQLite store on startup
//! and on `reindex`.

use crate::embedding::cosine_similarity;
use crate::{Error, Result};
use std::collections::HashMap;
use uuid::Uuid;

/// Below this many vectors every query scans the whole index.
const EXHAUSTIVE_LIMIT: usize = 1_024;

/// Hard cap on the number of inverted lists.
const MAX_LISTS: usize = 64;

/// A new list is opened when no centroid is at least this similar.
const SPLIT_THRESHOLD: f32 = 0.55;

struct IvfList {
    centroid: Vec<f32>,
    members: Vec<(Uuid, Vec<f32>)>,
}

/// List-based ANN index with cosine metric.
pub struct IvfIndex {
    dimensions: usize,
    lists: Vec<IvfList>,
    assignments: HashMap<Uuid, usize>,
}

impl IvfIndex {
    /// Creates an empty index for vectors of the given dimension.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            lists: Vec::new(),
            assignments: HashMap::new(),
        }
    }

    /// The vector dimension this index accepts.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of indexed vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Whether the index holds no vectors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    fn validate(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(Error::Validation(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(())
    }

    /// Inserts or replaces a vector.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` on a dimension mismatch.
    pub fn upsert(&mut self, id: Uuid, embedding: Vec<f32>) -> Result<()> {
        self.validate(&embedding)?;
        self.remove(&id);

        let list_idx = self.pick_list(&embedding);
        self.lists[list_idx].members.push((id, embedding));
        self.assignments.insert(id, list_idx);
        Ok(())
    }

    /// Removes a vector. Returns whether it was present.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        let Some(list_idx) = self.assignments.remove(id) else {
            return false;
        };
        let members = &mut self.lists[list_idx].members;
        if let Some(pos) = members.iter().position(|(m, _)| m == id) {
            members.swap_remove(pos);
        }
        true
    }

    /// Drops all vectors.
    pub fn clear(&mut self) {
        self.lists.clear();
        self.assignments.clear();
    }

    fn pick_list(&mut self, embedding: &[f32]) -> usize {
        let best = self
            .lists
            .iter()
            .enumerate()
            .map(|(i, list)| (i, cosine_similarity(&list.centroid, embedding)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match best {
            Some((idx, sim)) if sim >= SPLIT_THRESHOLD || self.lists.len() >= MAX_LISTS => idx,
            _ => {
                self.lists.push(IvfList {
                    centroid: embedding.to_vec(),
                    members: Vec::new(),
                });
                self.lists.len() - 1
            },
        }
    }

    /// Searches for the `k` nearest vectors.
    ///
    /// Probes the `probes` nearest lists (or all of them for small
    /// corpora) and returns `(id, cosine_similarity)` pairs ordered by
    /// descending similarity.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` on a dimension mismatch.
    pub fn search(&self, query: &[f32], k: usize, probes: usize) -> Result<Vec<(Uuid, f32)>> {
        self.validate(query)?;
        if k == 0 || self.assignments.is_empty() {
            return Ok(Vec::new());
        }

        let probe_all = self.assignments.len() <= EXHAUSTIVE_LIMIT;
        let mut list_order: Vec<(usize, f32)> = self
            .lists
            .iter()
            .enumerate()
            .map(|(i, list)| (i, cosine_similarity(&list.centroid, query)))
            .collect();
        list_order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let probe_count = if probe_all {
            list_order.len()
        } else {
            probes.max(1).min(list_order.len())
        };

        let mut hits: Vec<(Uuid, f32)> = Vec::new();
        for &(list_idx, _) in &list_order[..probe_count] {
            for (id, vector) in &self.lists[list_idx].members {
                hits.push((*id, cosine_similarity(vector, query)));
            }
        }

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Rebuilds the index from scratch.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if any vector has the wrong dimension.
    pub fn rebuild<I>(&mut self, vectors: I) -> Result<()>
    where
        I: IntoIterator<Item = (Uuid, Vec<f32>)>,
    {
        self.clear();
        for (id, vector) in vectors {
            self.upsert(id, vector)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn unit_vec(dimensions: usize, seed: usize) -> Vec<f32> {
        let raw: Vec<f32> = (0..dimensions)
            .map(|i| ((i + seed) as f32).sin())
            .collect();
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        raw.into_iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_upsert_and_search() {
        let mut index = IvfIndex::new(64);
        let ids: Vec<Uuid> = (0..20).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            index.upsert(*id, unit_vec(64, i * 7)).unwrap();
        }
        assert_eq!(index.len(), 20);

        let hits = index.search(&unit_vec(64, 0), 3, 4).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, ids[0]);
        assert!(hits[0].1 > 0.99);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = IvfIndex::new(64);
        assert!(index.upsert(Uuid::new_v4(), vec![0.0; 32]).is_err());
        assert!(index.search(&[0.0; 32], 5, 2).is_err());
    }

    #[test]
    fn test_remove() {
        let mut index = IvfIndex::new(16);
        let id = Uuid::new_v4();
        index.upsert(id, unit_vec(16, 1)).unwrap();
        assert!(index.remove(&id));
        assert!(!index.remove(&id));
        assert!(index.is_empty());
    }

    #[test]
    fn test_upsert_replaces() {
        let mut index = IvfIndex::new(16);
        let id = Uuid::new_v4();
        index.upsert(id, unit_vec(16, 1)).unwrap();
        index.upsert(id, unit_vec(16, 9)).unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.search(&unit_vec(16, 9), 1, 8).unwrap();
        assert!(hits[0].1 > 0.99);
    }

    #[test]
    fn test_rebuild() {
        let mut index = IvfIndex::new(16);
        index.upsert(Uuid::new_v4(), unit_vec(16, 1)).unwrap();

        let fresh = vec![(Uuid::new_v4(), unit_vec(16, 2)), (Uuid::new_v4(), unit_vec(16, 3))];
        index.rebuild(fresh).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_search_empty() {
        let index = IvfIndex::new(16);
        assert!(index.search(&unit_vec(16, 0), 5, 2).unwrap().is_empty());
    }

    #[test]
    fn test_stable_tie_break_on_ids() {
        let mut index = IvfIndex::new(4);
        let v = vec![0.5, 0.5, 0.0, 0.0];
        let mut ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            index.upsert(*id, v.clone()).unwrap();
        }
        ids.sort();

        let hits = index.search(&v, 5, 1).unwrap();
        let hit_ids: Vec<Uuid> = hits.iter().map(|(id, _)| *id).collect();
        assert_eq!(hit_ids, ids);
    }
}
