use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub source_id: String,
    pub page_number: u32,
    pub segment_index: u32,
}

impl SegmentKey {
    pub fn new(source_id: impl Into<String>, page_number: u32, segment_index: u32) -> Self {
        Self {
            source_id: source_id.into(),
            page_number,
            segment_index,
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#p{}s{}",
            self.source_id, self.page_number, self.segment_index
        )
    }
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub source_id: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub key: SegmentKey,
    pub image_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionResult {
    #[serde(default)]
    pub smiles: String,
    #[serde(default)]
    pub inchi: String,
    #[serde(default)]
    pub inchikey: String,
}

impl RecognitionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.inchikey.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Primary,
    Complement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub source_id: String,
    pub page_number: u32,
    pub segment_index: u32,
    pub description: Option<String>,
    pub proposed_name: Option<String>,
    pub proposed_target: Option<String>,
    pub smiles: String,
    pub inchi: String,
    pub inchikey: String,
    pub validated: Option<bool>,
    pub recognized_by: Option<Engine>,
}

impl ExtractionRecord {
    pub fn for_segment(key: &SegmentKey) -> Self {
        Self {
            source_id: key.source_id.clone(),
            page_number: key.page_number,
            segment_index: key.segment_index,
            description: None,
            proposed_name: None,
            proposed_target: None,
            smiles: String::new(),
            inchi: String::new(),
            inchikey: String::new(),
            validated: None,
            recognized_by: None,
        }
    }

    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.source_id.clone(), self.page_number, self.segment_index)
    }

    pub fn apply_recognition(
        &mut self,
        result: RecognitionResult,
        validated: Option<bool>,
        engine: Engine,
    ) {
        self.smiles = result.smiles;
        self.inchi = result.inchi;
        self.inchikey = result.inchikey;
        self.validated = validated;
        self.recognized_by = Some(engine);
    }
}

/// Extraction records in segmenter order, addressable by segment key.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<ExtractionRecord>,
    index: HashMap<SegmentKey, usize>,
}

impl RecordSet {
    pub fn from_segments(segments: &[Segment]) -> Result<Self> {
        let mut set = Self::default();
        for segment in segments {
            if set.index.contains_key(&segment.key) {
                bail!("duplicate segment key: {}", segment.key);
            }
            set.index.insert(segment.key.clone(), set.records.len());
            set.records.push(ExtractionRecord::for_segment(&segment.key));
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &SegmentKey) -> Option<&ExtractionRecord> {
        self.index.get(key).map(|position| &self.records[*position])
    }

    pub fn get_mut(&mut self, key: &SegmentKey) -> Option<&mut ExtractionRecord> {
        let position = *self.index.get(key)?;
        self.records.get_mut(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractionRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<ExtractionRecord> {
        self.records
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub processed: usize,
    pub primary_validated: usize,
    pub primary_invalid: usize,
    pub primary_unchecked: usize,
    pub complement_attempted: usize,
    pub complement_recovered: usize,
    pub complement_filled: usize,
    pub final_validated: usize,
    pub final_invalid: usize,
    pub final_unchecked: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceEntry {
    pub source_id: String,
    pub byte_len: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractCounts {
    pub document_count: usize,
    pub segmented_document_count: usize,
    pub segment_count: usize,
    pub description_count: usize,
    pub records_before_dedupe: usize,
    pub records_after_dedupe: usize,
    pub reconcile: ReconcileCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub target: String,
    pub complement_enabled: bool,
    pub complement_policy: String,
    pub output_format: String,
    pub output_path: String,
    pub sources: Vec<SourceEntry>,
    pub counts: ExtractCounts,
    pub warnings: Vec<String>,
}
