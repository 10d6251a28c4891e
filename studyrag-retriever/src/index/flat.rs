//! Exhaustive L2 index: every search scans every stored vector.

use super::{EntryId, Fragment, IndexSnapshot, SearchHit, VectorIndex};
use crate::error::{Result, RetrieverError};
use std::cmp::Ordering;

/// Identifier written to the manifest for this structure.
pub const FLAT_L2_INDEX_TYPE: &str = "IndexFlatL2";

/// Flat index ranking by squared Euclidean distance.
///
/// Vectors live in one contiguous row-major buffer. Ties in distance are
/// broken by the lower id.
#[derive(Debug, Clone)]
pub struct FlatL2Index {
    dimension: usize,
    vectors: Vec<f32>,
    fragments: Vec<Fragment>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RetrieverError::invalid_config(
                "index dimension must be greater than zero",
            ));
        }
        Ok(Self {
            dimension,
            vectors: Vec::new(),
            fragments: Vec::new(),
        })
    }

    /// Rebuild an index from persisted parts.
    pub fn from_parts(dimension: usize, vectors: Vec<f32>, fragments: Vec<Fragment>) -> Result<Self> {
        let mut index = Self::new(dimension)?;
        let expected = fragments
            .len()
            .checked_mul(dimension)
            .ok_or_else(|| RetrieverError::invalid_config("index size overflows"))?;
        if vectors.len() != expected {
            return Err(RetrieverError::DimensionMismatch {
                expected,
                actual: vectors.len(),
            });
        }
        if vectors.iter().any(|v| !v.is_finite()) {
            return Err(RetrieverError::invalid_config(
                "stored vectors contain non-finite values",
            ));
        }
        index.vectors = vectors;
        index.fragments = fragments;
        Ok(index)
    }

    fn row(&self, id: EntryId) -> &[f32] {
        let start = id * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RetrieverError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RetrieverError::invalid_config(
                "vector contains non-finite values",
            ));
        }
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

impl VectorIndex for FlatL2Index {
    fn index_type(&self) -> &'static str {
        FLAT_L2_INDEX_TYPE
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> usize {
        self.fragments.len()
    }

    fn add(&mut self, entries: Vec<(Vec<f32>, Fragment)>) -> Result<Vec<EntryId>> {
        for (vector, _) in &entries {
            self.check_vector(vector)?;
        }

        let first = self.count();
        self.vectors.reserve(entries.len() * self.dimension);
        self.fragments.reserve(entries.len());
        for (vector, fragment) in entries {
            self.vectors.extend_from_slice(&vector);
            self.fragments.push(fragment);
        }
        Ok((first..self.count()).collect())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        // An empty index answers every query with no hits
        if self.fragments.is_empty() {
            return Ok(Vec::new());
        }
        self.check_vector(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = (0..self.count())
            .map(|id| SearchHit {
                id,
                distance: squared_l2(self.row(id), query),
            })
            .collect();

        let by_distance = |a: &SearchHit, b: &SearchHit| -> Ordering {
            a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id))
        };
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, by_distance);
            hits.truncate(k);
        }
        hits.sort_by(by_distance);
        Ok(hits)
    }

    fn fragment(&self, id: EntryId) -> Option<&Fragment> {
        self.fragments.get(id)
    }

    fn truncate(&mut self, count: usize) {
        self.fragments.truncate(count);
        self.vectors.truncate(self.fragments.len() * self.dimension);
    }

    fn snapshot(&self) -> IndexSnapshot<'_> {
        IndexSnapshot {
            index_type: FLAT_L2_INDEX_TYPE,
            dimension: self.dimension,
            vectors: &self.vectors,
            fragments: &self.fragments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyrag_embed::l2_normalize;

    fn fragment(source: &str, chunk_id: usize) -> Fragment {
        Fragment {
            text: format!("{source} #{chunk_id}"),
            source: source.to_string(),
            chunk_id,
        }
    }

    fn unit(values: &[f32]) -> Vec<f32> {
        let mut v = values.to_vec();
        l2_normalize(&mut v);
        v
    }

    #[test]
    fn test_add_assigns_sequential_ids() {
        let mut index = FlatL2Index::new(2).unwrap();
        let ids = index
            .add(vec![
                (vec![1.0, 0.0], fragment("a.txt", 0)),
                (vec![0.0, 1.0], fragment("a.txt", 1)),
            ])
            .unwrap();
        assert_eq!(ids, vec![0, 1]);

        let ids = index.add(vec![(vec![1.0, 1.0], fragment("b.txt", 0))]).unwrap();
        assert_eq!(ids, vec![2]);
        assert_eq!(index.count(), 3);
        assert_eq!(index.fragment(2).unwrap().source, "b.txt");
    }

    #[test]
    fn test_mismatched_vector_rejects_whole_batch() {
        let mut index = FlatL2Index::new(3).unwrap();
        index.add(vec![(vec![1.0, 0.0, 0.0], fragment("a.txt", 0))]).unwrap();

        let err = index
            .add(vec![
                (vec![0.0, 1.0, 0.0], fragment("b.txt", 0)),
                (vec![0.0, 1.0], fragment("b.txt", 1)),
            ])
            .unwrap_err();

        assert!(matches!(
            err,
            RetrieverError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(index.count(), 1);
        assert_eq!(index.snapshot().vectors.len(), 3);
    }

    #[test]
    fn test_non_finite_vector_rejected() {
        let mut index = FlatL2Index::new(2).unwrap();
        assert!(index.add(vec![(vec![f32::NAN, 0.0], fragment("a.txt", 0))]).is_err());
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn test_search_orders_by_distance() {
        let mut index = FlatL2Index::new(2).unwrap();
        index
            .add(vec![
                (vec![0.0, 1.0], fragment("far.txt", 0)),
                (vec![1.0, 0.0], fragment("near.txt", 0)),
                (unit(&[1.0, 1.0]), fragment("mid.txt", 0)),
            ])
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<EntryId> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert_eq!(hits[0].distance, 0.0);
        assert!((hits[2].distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_returns_min_of_k_and_count() {
        let mut index = FlatL2Index::new(2).unwrap();
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());

        index
            .add(vec![
                (vec![1.0, 0.0], fragment("a.txt", 0)),
                (vec![0.0, 1.0], fragment("a.txt", 1)),
            ])
            .unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 5).unwrap().len(), 2);
        assert_eq!(index.search(&[1.0, 0.0], 1).unwrap().len(), 1);
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_broken_by_lower_id() {
        let mut index = FlatL2Index::new(2).unwrap();
        index
            .add(vec![
                (vec![0.0, 1.0], fragment("a.txt", 0)),
                (vec![0.0, 1.0], fragment("a.txt", 1)),
                (vec![0.0, 1.0], fragment("a.txt", 2)),
            ])
            .unwrap();

        let ids: Vec<EntryId> = index
            .search(&[1.0, 0.0], 2)
            .unwrap()
            .iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_query_dimension_checked() {
        let mut index = FlatL2Index::new(4).unwrap();
        index
            .add(vec![(vec![1.0, 0.0, 0.0, 0.0], fragment("a.txt", 0))])
            .unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 3),
            Err(RetrieverError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_empty_index_returns_no_hits_for_any_query() {
        let index = FlatL2Index::new(4).unwrap();
        assert!(index.search(&[1.0, 0.0], 3).unwrap().is_empty());
        assert!(index.search(&[0.0, 0.0, 1.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_l2_order_matches_cosine_order_for_unit_vectors() {
        let stored: Vec<Vec<f32>> = [
            [0.9, 0.1, 0.3],
            [0.2, 0.8, 0.1],
            [0.5, 0.5, 0.5],
            [-0.3, 0.2, 0.9],
            [0.7, -0.6, 0.2],
        ]
        .iter()
        .map(|v| unit(v))
        .collect();
        let query = unit(&[0.6, 0.3, 0.4]);

        let mut index = FlatL2Index::new(3).unwrap();
        index
            .add(
                stored
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), fragment("s.txt", i)))
                    .collect(),
            )
            .unwrap();
        let by_l2: Vec<EntryId> = index
            .search(&query, stored.len())
            .unwrap()
            .iter()
            .map(|h| h.id)
            .collect();

        let mut by_cosine: Vec<(EntryId, f32)> = stored
            .iter()
            .enumerate()
            .map(|(i, v)| (i, v.iter().zip(&query).map(|(a, b)| a * b).sum()))
            .collect();
        by_cosine.sort_by(|a, b| b.1.total_cmp(&a.1));
        let by_cosine: Vec<EntryId> = by_cosine.into_iter().map(|(i, _)| i).collect();

        assert_eq!(by_l2, by_cosine);
    }

    #[test]
    fn test_truncate_rolls_back_batch() {
        let mut index = FlatL2Index::new(2).unwrap();
        index.add(vec![(vec![1.0, 0.0], fragment("a.txt", 0))]).unwrap();
        index
            .add(vec![
                (vec![0.0, 1.0], fragment("b.txt", 0)),
                (vec![0.0, 1.0], fragment("b.txt", 1)),
            ])
            .unwrap();

        index.truncate(1);
        assert_eq!(index.count(), 1);
        assert_eq!(index.snapshot().vectors, &[1.0, 0.0]);
        assert!(index.fragment(1).is_none());
    }

    #[test]
    fn test_from_parts_validates_sizes() {
        let fragments = vec![fragment("a.txt", 0), fragment("a.txt", 1)];
        assert!(FlatL2Index::from_parts(2, vec![1.0, 0.0, 0.0, 1.0], fragments.clone()).is_ok());
        assert!(FlatL2Index::from_parts(2, vec![1.0, 0.0, 0.0], fragments.clone()).is_err());
        assert!(FlatL2Index::from_parts(0, vec![], vec![]).is_err());
    }
}
