use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::model::{RecognitionResult, Segment, SegmentKey};
use crate::tooling::ToolCommand;

pub trait StructureRecognizer {
    fn name(&self) -> &str;

    fn recognize_one(&self, image: &Path) -> Result<RecognitionResult>;
}

/// Recognizer backed by an external program that prints `{"smiles", "inchi", "inchikey"}` JSON.
pub struct CommandRecognizer {
    name: String,
    tool: ToolCommand,
}

impl CommandRecognizer {
    pub fn new(name: impl Into<String>, tool: ToolCommand) -> Self {
        Self {
            name: name.into(),
            tool,
        }
    }
}

impl StructureRecognizer for CommandRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize_one(&self, image: &Path) -> Result<RecognitionResult> {
        let stdout = self.tool.run([image])?;
        parse_recognizer_output(&stdout)
            .with_context(|| format!("{} produced unreadable output", self.name))
    }
}

pub fn parse_recognizer_output(stdout: &str) -> Result<RecognitionResult> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(RecognitionResult::empty());
    }

    let mut result: RecognitionResult =
        serde_json::from_str(trimmed).context("recognizer output is not a JSON object")?;
    result.smiles = result.smiles.trim().to_string();
    result.inchi = result.inchi.trim().to_string();
    result.inchikey = result.inchikey.trim().to_string();
    Ok(result)
}

/// Runs `recognizer` over `segments` in order. A failing segment yields an empty result.
pub fn recognize_segments(
    recognizer: &dyn StructureRecognizer,
    segments: &[&Segment],
) -> Vec<(SegmentKey, RecognitionResult)> {
    let started = Instant::now();
    info!(
        recognizer = recognizer.name(),
        segments = segments.len(),
        "recognizing segments"
    );

    let mut results = Vec::with_capacity(segments.len());
    let mut failures = 0_usize;
    for segment in segments {
        let result = match recognizer.recognize_one(&segment.image_path) {
            Ok(result) => result,
            Err(err) => {
                failures += 1;
                warn!(
                    recognizer = recognizer.name(),
                    segment = %segment.key,
                    error = %format!("{err:#}"),
                    "recognition failed; recording empty result"
                );
                RecognitionResult::empty()
            }
        };
        debug!(segment = %segment.key, inchikey = %result.inchikey, "recognized segment");
        results.push((segment.key.clone(), result));
    }

    let recognized = results.iter().filter(|(_, result)| !result.is_empty()).count();
    info!(
        recognizer = recognizer.name(),
        recognized,
        failures,
        elapsed_ms = started.elapsed().as_millis(),
        "recognition completed"
    );
    results
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use anyhow::{Result, bail};

    use super::{StructureRecognizer, parse_recognizer_output, recognize_segments};
    use crate::model::{RecognitionResult, Segment, SegmentKey};

    struct PathRecognizer;

    impl StructureRecognizer for PathRecognizer {
        fn name(&self) -> &str {
            "path"
        }

        fn recognize_one(&self, image: &Path) -> Result<RecognitionResult> {
            let stem = image.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if stem == "broken" {
                bail!("model crashed");
            }
            Ok(RecognitionResult {
                smiles: format!("C{stem}"),
                inchi: String::new(),
                inchikey: stem.to_uppercase(),
            })
        }
    }

    fn segment(index: u32, file: &str) -> Segment {
        Segment {
            key: SegmentKey::new("doc.pdf", 0, index),
            image_path: PathBuf::from(file),
        }
    }

    #[test]
    fn recognize_segments_keeps_order_and_degrades_failures_to_empty() {
        let segments = vec![segment(0, "a.png"), segment(1, "broken.png"), segment(2, "c.png")];
        let refs: Vec<&Segment> = segments.iter().collect();

        let results = recognize_segments(&PathRecognizer, &refs);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, segments[0].key);
        assert_eq!(results[0].1.inchikey, "A");
        assert_eq!(results[1].0, segments[1].key);
        assert_eq!(results[1].1, RecognitionResult::empty());
        assert_eq!(results[2].1.inchikey, "C");
    }

    #[test]
    fn parse_recognizer_output_accepts_partial_and_empty_payloads() {
        let full = parse_recognizer_output(
            r#"{"smiles": "CC(=O)O", "inchi": "InChI=1S/C2H4O2", "inchikey": " QTBSBXVTEAMEQO-UHFFFAOYSA-N\n"}"#,
        )
        .unwrap();
        assert_eq!(full.inchikey, "QTBSBXVTEAMEQO-UHFFFAOYSA-N");

        let partial = parse_recognizer_output(r#"{"smiles": "C"}"#).unwrap();
        assert_eq!(partial.smiles, "C");
        assert!(partial.is_empty());

        assert!(parse_recognizer_output("").unwrap().is_empty());
        assert!(parse_recognizer_output("Traceback (most recent call last)").is_err());
    }
}
