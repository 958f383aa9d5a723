//! Flat embedding index over the activity corpus.
//!
//! Built once offline, loaded read-only at process start, and shared across
//! concurrent requests without locking: nothing here mutates after load.
//! Inner product on L2-normalized vectors stands in for cosine similarity.

use crate::corpus::text_representation;
use crate::embed::{inner_product, l2_normalize, TextEmbedder};
use crate::error::IndexError;
use crate::model::{ActivityRecord, AutismLevel, SensoryProfile, Sensitivity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// File names for the persisted index pair.
pub const VECTORS_FILE: &str = "activity_vectors.json";
pub const METADATA_FILE: &str = "activity_metadata.json";

/// Structural filters applied to raw neighbors, in ranked order.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub age: Option<u8>,
    pub sensory_sensitivity: Option<SensoryProfile>,
    pub autism_level: Option<AutismLevel>,
}

impl SearchFilters {
    fn matches(&self, activity: &ActivityRecord) -> bool {
        if let Some(age) = self.age {
            if !activity.suits_age(age) {
                return false;
            }
        }
        if let Some(sensory) = &self.sensory_sensitivity {
            // High sensitivity on any channel excludes sensory-seeking work
            // at the index level; the curator applies the stricter med rule.
            if sensory.any_at_least(Sensitivity::High)
                && activity
                    .sensory_suitability
                    .to_lowercase()
                    .contains("sensory-seeking")
            {
                return false;
            }
        }
        if let Some(level) = self.autism_level {
            if !activity
                .autism_level_suitability
                .contains(&level.to_string())
            {
                return false;
            }
        }
        true
    }
}

/// A corpus activity with the similarity attached by the search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: ActivityRecord,
    pub similarity: f32,
}

#[derive(Serialize, Deserialize)]
struct PersistedVectors {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Embedding index plus corpus metadata, in insertion order.
pub struct ActivityIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    records: Vec<ActivityRecord>,
}

impl ActivityIndex {
    /// Embed and index every record. Vector `i` corresponds to record `i`.
    pub fn build(records: Vec<ActivityRecord>, embedder: &dyn TextEmbedder) -> Self {
        let dimension = embedder.dimension();
        let vectors = records
            .iter()
            .map(|rec| {
                let mut v = embedder.embed(&text_representation(rec));
                l2_normalize(&mut v);
                v
            })
            .collect::<Vec<_>>();
        info!("Indexed {} activities ({dimension}-dim)", records.len());
        Self {
            dimension,
            vectors,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    /// Persist the vector/metadata pair into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir)?;
        let persisted = PersistedVectors {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        let vectors_json = serde_json::to_vec(&persisted)
            .map_err(|e| IndexError::Deserialize(e.to_string()))?;
        let metadata_json = serde_json::to_vec(&self.records)
            .map_err(|e| IndexError::Deserialize(e.to_string()))?;
        fs::write(dir.join(VECTORS_FILE), vectors_json)?;
        fs::write(dir.join(METADATA_FILE), metadata_json)?;
        info!(
            "Saved index ({} vectors) to {}",
            self.vectors.len(),
            dir.display()
        );
        Ok(())
    }

    /// Load a prebuilt index pair from `dir`.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let vectors_path = dir.join(VECTORS_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        for path in [&vectors_path, &metadata_path] {
            if !path.exists() {
                return Err(IndexError::NotFound(path.display().to_string()));
            }
        }
        let persisted: PersistedVectors = serde_json::from_slice(&fs::read(&vectors_path)?)
            .map_err(|e| IndexError::Deserialize(e.to_string()))?;
        let records: Vec<ActivityRecord> = serde_json::from_slice(&fs::read(&metadata_path)?)
            .map_err(|e| IndexError::Deserialize(e.to_string()))?;
        if persisted.vectors.len() != records.len() {
            return Err(IndexError::Deserialize(format!(
                "vector/metadata count mismatch: {} vs {}",
                persisted.vectors.len(),
                records.len()
            )));
        }
        info!(
            "Loaded index: {} activities, {} vectors",
            records.len(),
            persisted.vectors.len()
        );
        Ok(Self {
            dimension: persisted.dimension,
            vectors: persisted.vectors,
            records,
        })
    }

    /// Semantic search: top `2k` raw neighbors, filtered in ranked order,
    /// stopping once `k` survivors are collected. Results are ranked by
    /// descending similarity after filtering.
    pub fn search(
        &self,
        embedder: &dyn TextEmbedder,
        query: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if self.is_empty() {
            warn!("Activity index is empty");
            return Ok(Vec::new());
        }
        if embedder.dimension() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: embedder.dimension(),
            });
        }

        let mut query_vec = embedder.embed(query);
        l2_normalize(&mut query_vec);

        // Over-fetch to survive post-filtering.
        let raw_k = (k * 2).min(self.vectors.len());
        let mut ranked: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, inner_product(&query_vec, v)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(raw_k);

        let mut hits = Vec::with_capacity(k);
        for (idx, similarity) in ranked {
            let record = &self.records[idx];
            if filters.matches(record) {
                hits.push(SearchHit {
                    record: record.clone(),
                    similarity,
                });
                if hits.len() >= k {
                    break;
                }
            }
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::model::tests::sample_record;

    fn corpus() -> Vec<ActivityRecord> {
        let mut ball = sample_record("a1");
        ball.activity_name = "Ball Rolling".to_string();
        ball.goal = "gross motor coordination ball play".to_string();

        let mut book = sample_record("a2");
        book.activity_name = "Picture Book Time".to_string();
        book.domain = "cognitive".to_string();
        book.goal = "quiet reading attention".to_string();
        book.materials = vec!["picture book".to_string()];

        let mut swing = sample_record("a3");
        swing.activity_name = "Swing Session".to_string();
        swing.sensory_suitability = "sensory-seeking".to_string();
        swing.goal = "vestibular motor ball".to_string();

        let mut teen = sample_record("a4");
        teen.activity_name = "Ball Relay".to_string();
        teen.age_range = "12-16".to_string();
        teen.goal = "team motor ball game".to_string();

        vec![ball, book, swing, teen]
    }

    #[test]
    fn results_are_ordered_by_similarity() {
        let embedder = HashingEmbedder::new(128);
        let index = ActivityIndex::build(corpus(), &embedder);
        let hits = index
            .search(&embedder, "ball motor play", 4, &SearchFilters::default())
            .unwrap();
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn age_filter_drops_out_of_range() {
        let embedder = HashingEmbedder::new(128);
        let index = ActivityIndex::build(corpus(), &embedder);
        let filters = SearchFilters {
            age: Some(5),
            ..Default::default()
        };
        let hits = index
            .search(&embedder, "ball motor play", 4, &filters)
            .unwrap();
        assert!(hits.iter().all(|h| h.record.id != "a4"));
    }

    #[test]
    fn high_sensitivity_excludes_sensory_seeking() {
        let embedder = HashingEmbedder::new(128);
        let index = ActivityIndex::build(corpus(), &embedder);
        let filters = SearchFilters {
            sensory_sensitivity: Some(SensoryProfile {
                sound: Sensitivity::High,
                light: Sensitivity::Low,
                touch: Sensitivity::Low,
            }),
            ..Default::default()
        };
        let hits = index
            .search(&embedder, "vestibular motor ball", 4, &filters)
            .unwrap();
        assert!(hits.iter().all(|h| h.record.id != "a3"));
    }

    #[test]
    fn empty_index_returns_empty_list() {
        let embedder = HashingEmbedder::new(128);
        let index = ActivityIndex::build(Vec::new(), &embedder);
        let hits = index
            .search(&embedder, "anything", 10, &SearchFilters::default())
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn save_load_round_trip() {
        let embedder = HashingEmbedder::new(64);
        let index = ActivityIndex::build(corpus(), &embedder);
        let dir = tempfile::tempdir().unwrap();
        index.save(dir.path()).unwrap();

        let loaded = ActivityIndex::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), index.len());
        let hits = loaded
            .search(&embedder, "ball motor play", 2, &SearchFilters::default())
            .unwrap();
        let original = index
            .search(&embedder, "ball motor play", 2, &SearchFilters::default())
            .unwrap();
        assert_eq!(
            hits.iter().map(|h| h.record.id.clone()).collect::<Vec<_>>(),
            original
                .iter()
                .map(|h| h.record.id.clone())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = ActivityIndex::load(dir.path()).map(|_| ()).unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }
}
