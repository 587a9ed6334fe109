//! Ordered, keyed collection of per-video records.
//!
//! Records are created by the snippet pass only. Enrichment passes can add
//! fields to a record but never create one, and nothing is ever removed or
//! reordered, so the final order is the order ids first appeared while
//! paginating the upload playlist (newest first).

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::FetchError;

/// Field name to value for one video. Keys iterate in sorted order, which is
/// what the exporter relies on.
pub type VideoRecord = Map<String, Value>;

#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    records: IndexMap<String, VideoRecord>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record for `video_id`, or overwrites the fields of the
    /// existing one in place when the id was already seen.
    pub fn create_from_snippet(&mut self, video_id: &str, fields: VideoRecord) {
        match self.records.get_mut(video_id) {
            Some(existing) => existing.extend(fields),
            None => {
                self.records.insert(video_id.to_string(), fields);
            }
        }
    }

    /// Merges part fields into a record created by the snippet pass.
    pub fn extend_with_part(
        &mut self,
        video_id: &str,
        part: &str,
        fields: VideoRecord,
    ) -> Result<(), FetchError> {
        let record = self
            .records
            .get_mut(video_id)
            .ok_or_else(|| FetchError::UnknownVideo {
                video_id: video_id.to_string(),
                part: part.to_string(),
            })?;
        record.extend(fields);
        Ok(())
    }

    pub fn ordered_values(&self) -> Vec<&VideoRecord> {
        self.records.values().collect()
    }

    pub fn video_ids(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn get(&self, video_id: &str) -> Option<&VideoRecord> {
        self.records.get(video_id)
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.records.contains_key(video_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
