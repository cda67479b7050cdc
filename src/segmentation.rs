use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Deserialize;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::cli::TextDirection;
use crate::model::{Segment, SegmentKey, SourceDocument};
use crate::tooling::ToolCommand;
use crate::util::ensure_directory;

const SEGMENT_MANIFEST_FILE: &str = "segments.json";

pub trait Segmenter {
    fn segment(&self, documents: &[SourceDocument]) -> Result<SegmentationOutput>;
}

/// Segments and free text in segmenter order. Owns the work directory holding segment images.
#[derive(Debug, Default)]
pub struct SegmentationOutput {
    pub segments: Vec<Segment>,
    pub descriptions: Vec<(SegmentKey, String)>,
    pub segmented_sources: Vec<String>,
    pub warnings: Vec<String>,
    workdir: Option<TempDir>,
}

impl SegmentationOutput {
    pub fn with_workdir(workdir: TempDir) -> Self {
        Self {
            workdir: Some(workdir),
            ..Self::default()
        }
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }
}

#[derive(Debug, Deserialize)]
struct SegmentManifestEntry {
    page_number: u32,
    image: PathBuf,
    #[serde(default)]
    text: Option<String>,
}

pub struct CommandSegmenter {
    tool: ToolCommand,
    extract_text: bool,
    direction: TextDirection,
}

impl CommandSegmenter {
    pub fn new(tool: ToolCommand, extract_text: bool, direction: TextDirection) -> Self {
        Self {
            tool,
            extract_text,
            direction,
        }
    }

    fn segment_document(
        &self,
        workdir: &Path,
        ordinal: usize,
        document: &SourceDocument,
    ) -> Result<Vec<(Segment, Option<String>)>> {
        let doc_dir = workdir.join(format!("doc_{ordinal:04}"));
        ensure_directory(&doc_dir)?;
        let pdf_path = doc_dir.join("source.pdf");
        fs::write(&pdf_path, &document.bytes)
            .with_context(|| format!("failed to write {}", pdf_path.display()))?;

        let out_dir = doc_dir.join("segments");
        ensure_directory(&out_dir)?;

        let mut extra = vec![
            "--pdf".to_string(),
            pdf_path.display().to_string(),
            "--out".to_string(),
            out_dir.display().to_string(),
        ];
        if self.extract_text {
            extra.push("--text".to_string());
            extra.push("--direction".to_string());
            extra.push(self.direction.as_str().to_string());
        }
        self.tool
            .run(&extra)
            .with_context(|| format!("segmenter failed for {}", document.source_id))?;

        let manifest_path = out_dir.join(SEGMENT_MANIFEST_FILE);
        let raw = fs::read(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let entries: Vec<SegmentManifestEntry> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

        Ok(segments_from_manifest(&document.source_id, &out_dir, entries))
    }
}

impl Segmenter for CommandSegmenter {
    fn segment(&self, documents: &[SourceDocument]) -> Result<SegmentationOutput> {
        let started = Instant::now();
        let workdir = tempfile::Builder::new()
            .prefix("molhunt_segments_")
            .tempdir()
            .context("failed to create segmentation work directory")?;
        let mut output = SegmentationOutput::with_workdir(workdir);
        let workdir = output
            .workdir()
            .map(Path::to_path_buf)
            .context("segmentation work directory missing")?;

        for (ordinal, document) in documents.iter().enumerate() {
            info!(source = %document.source_id, "segmenting document");
            match self.segment_document(&workdir, ordinal, document) {
                Ok(found) => {
                    info!(source = %document.source_id, segments = found.len(), "segmented document");
                    for (segment, text) in found {
                        if let Some(text) = text.filter(|_| self.extract_text) {
                            output.descriptions.push((segment.key.clone(), text));
                        }
                        output.segments.push(segment);
                    }
                    output.segmented_sources.push(document.source_id.clone());
                }
                Err(err) => {
                    warn!(source = %document.source_id, error = %err, "failed to segment document; skipping");
                    output
                        .warnings
                        .push(format!("segmentation failed for {}: {err:#}", document.source_id));
                }
            }
        }

        let elapsed = started.elapsed();
        let per_segment_ms = if output.segments.is_empty() {
            0
        } else {
            elapsed.as_millis() / output.segments.len() as u128
        };
        info!(
            segments = output.segments.len(),
            elapsed_ms = elapsed.as_millis(),
            per_segment_ms,
            "segmentation completed"
        );

        Ok(output)
    }
}

fn segments_from_manifest(
    source_id: &str,
    out_dir: &Path,
    entries: Vec<SegmentManifestEntry>,
) -> Vec<(Segment, Option<String>)> {
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let image_path = if entry.image.is_absolute() {
                entry.image
            } else {
                out_dir.join(entry.image)
            };
            let segment = Segment {
                key: SegmentKey::new(source_id, entry.page_number, index as u32),
                image_path,
            };
            (segment, entry.text)
        })
        .collect()
}

/// Copies segment images to `<target>/<source_id>/<segment_index>.png`.
pub fn export_segment_images(segments: &[Segment], target: &Path) -> Result<usize> {
    let mut copied = 0_usize;
    for segment in segments {
        let source_dir = target.join(sanitize_component(&segment.key.source_id));
        ensure_directory(&source_dir)?;
        let destination = source_dir.join(format!("{}.png", segment.key.segment_index));
        fs::copy(&segment.image_path, &destination).with_context(|| {
            format!(
                "failed to copy {} to {}",
                segment.image_path.display(),
                destination.display()
            )
        })?;
        copied += 1;
    }
    info!(dir = %target.display(), copied, "saved segment images");
    Ok(copied)
}

fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || matches!(character, '.' | '-' | '_') {
                character
            } else {
                '_'
            }
        })
        .collect()
}
