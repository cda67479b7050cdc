use std::collections::HashMap;

use anyhow::bail;

use super::run::{manifest_path_for, render_extract_command};
use super::*;
use crate::cli::{TextDirection, ValidationOptions};
use crate::model::{Engine, RecognitionResult, Segment};
use crate::segmentation::SegmentationOutput;

struct FakeSegmenter {
    per_document: HashMap<String, Vec<(u32, Option<&'static str>)>>,
}

impl Segmenter for FakeSegmenter {
    fn segment(&self, documents: &[SourceDocument]) -> Result<SegmentationOutput> {
        let mut output = SegmentationOutput::default();
        for document in documents {
            let Some(pages) = self.per_document.get(&document.source_id) else {
                output
                    .warnings
                    .push(format!("segmentation failed for {}", document.source_id));
                continue;
            };
            for (index, (page_number, text)) in pages.iter().enumerate() {
                let key = SegmentKey::new(document.source_id.clone(), *page_number, index as u32);
                if let Some(text) = text {
                    output.descriptions.push((key.clone(), text.to_string()));
                }
                output.segments.push(Segment {
                    image_path: PathBuf::from(format!("{}-{index}.png", document.source_id)),
                    key,
                });
            }
            output.segmented_sources.push(document.source_id.clone());
        }
        Ok(output)
    }
}

struct TableRecognizer {
    name: &'static str,
    table: HashMap<PathBuf, &'static str>,
}

impl TableRecognizer {
    fn new(name: &'static str, rows: &[(&str, &'static str)]) -> Self {
        Self {
            name,
            table: rows
                .iter()
                .map(|(image, inchikey)| (PathBuf::from(image), *inchikey))
                .collect(),
        }
    }
}

impl StructureRecognizer for TableRecognizer {
    fn name(&self) -> &str {
        self.name
    }

    fn recognize_one(&self, image: &Path) -> Result<RecognitionResult> {
        let Some(inchikey) = self.table.get(image) else {
            bail!("unreadable image");
        };
        Ok(RecognitionResult {
            smiles: format!("{}-smiles", self.name),
            inchi: String::new(),
            inchikey: inchikey.to_string(),
        })
    }
}

struct SetValidator(Vec<&'static str>);

impl IdentityValidator for SetValidator {
    fn validate(&self, keys: &[String]) -> Result<Vec<Option<bool>>> {
        Ok(keys
            .iter()
            .map(|key| {
                if key.is_empty() {
                    None
                } else {
                    Some(self.0.contains(&key.as_str()))
                }
            })
            .collect())
    }
}

fn document(source_id: &str) -> SourceDocument {
    SourceDocument {
        source_id: source_id.to_string(),
        bytes: b"%PDF-1.7".to_vec(),
    }
}

fn options(extract_text: bool) -> PipelineOptions<'static> {
    PipelineOptions {
        extract_text,
        separator: "|",
        policy: ComplementPolicy::Invalid,
        seg_dir: None,
    }
}

#[test]
fn pipeline_reconciles_three_segments_and_attaches_descriptions() {
    let segmenter = FakeSegmenter {
        per_document: HashMap::from([(
            "june.pdf".to_string(),
            vec![
                (0, Some("Aspirin|COX enzyme\nextra line")),
                (0, Some("Ibuprofen\nCOX-2")),
                (1, None),
            ],
        )]),
    };
    let primary = TableRecognizer::new(
        "primary",
        &[
            ("june.pdf-0.png", "GOOD0"),
            ("june.pdf-1.png", "BAD1"),
            ("june.pdf-2.png", "BAD2"),
        ],
    );
    let complement = TableRecognizer::new(
        "complement",
        &[("june.pdf-1.png", "GOOD1"), ("june.pdf-2.png", "ALT2")],
    );
    let validator = SetValidator(vec!["GOOD0", "GOOD1"]);

    let outcome = extract_records(
        &mut [document("june.pdf")],
        &segmenter,
        &validator,
        &primary,
        Some(&complement),
        &options(true),
    )
    .unwrap();

    assert_eq!(outcome.counts.segment_count, 3);
    assert_eq!(outcome.counts.description_count, 2);
    assert_eq!(outcome.counts.reconcile.primary_validated, 1);
    assert_eq!(outcome.counts.reconcile.complement_recovered, 1);
    assert_eq!(outcome.counts.reconcile.final_validated, 2);
    assert_eq!(outcome.counts.records_after_dedupe, 3);

    let first = &outcome.records[0];
    assert_eq!(first.proposed_name.as_deref(), Some("Aspirin"));
    assert_eq!(first.proposed_target.as_deref(), Some("COX enzyme"));
    let second = &outcome.records[1];
    assert_eq!(second.proposed_name.as_deref(), Some("Ibuprofen"));
    assert_eq!(second.inchikey, "GOOD1");
    assert_eq!(second.recognized_by, Some(Engine::Complement));
    let third = &outcome.records[2];
    assert_eq!(third.inchikey, "BAD2");
    assert_eq!(third.validated, Some(false));
    assert_eq!(third.description, None);
}

#[test]
fn pipeline_skips_failed_documents_and_dedupes_across_sources() {
    let segmenter = FakeSegmenter {
        per_document: HashMap::from([
            ("a.pdf".to_string(), vec![(0, None)]),
            ("c.pdf".to_string(), vec![(2, None)]),
        ]),
    };
    let primary = TableRecognizer::new(
        "primary",
        &[("a.pdf-0.png", "SAME"), ("c.pdf-0.png", "SAME")],
    );
    let validator = SetValidator(vec!["SAME"]);

    let outcome = extract_records(
        &mut [document("a.pdf"), document("b.pdf"), document("c.pdf")],
        &segmenter,
        &validator,
        &primary,
        None,
        &options(false),
    )
    .unwrap();

    assert_eq!(outcome.counts.document_count, 3);
    assert_eq!(outcome.counts.segmented_document_count, 2);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.counts.records_before_dedupe, 2);
    assert_eq!(outcome.counts.records_after_dedupe, 1);
    assert_eq!(outcome.records[0].source_id, "a.pdf");
}

#[test]
fn pipeline_keeps_documents_that_share_a_file_name() {
    let segmenter = FakeSegmenter {
        per_document: HashMap::from([
            ("poster.pdf".to_string(), vec![(0, None)]),
            ("other.pdf".to_string(), vec![(0, None)]),
            ("poster-2.pdf".to_string(), vec![(0, None)]),
        ]),
    };
    let primary = TableRecognizer::new(
        "primary",
        &[
            ("poster.pdf-0.png", "KEY1"),
            ("other.pdf-0.png", "KEY2"),
            ("poster-2.pdf-0.png", "KEY3"),
        ],
    );
    let mut documents = vec![
        document("poster.pdf"),
        document("other.pdf"),
        document("poster.pdf"),
    ];

    let outcome = extract_records(
        &mut documents,
        &segmenter,
        &SetValidator(vec!["KEY1", "KEY3"]),
        &primary,
        None,
        &options(false),
    )
    .unwrap();

    let ids: Vec<&str> = documents.iter().map(|doc| doc.source_id.as_str()).collect();
    assert_eq!(ids, vec!["poster.pdf", "other.pdf", "poster-2.pdf"]);
    assert_eq!(outcome.counts.segmented_document_count, 3);
    assert_eq!(outcome.counts.records_after_dedupe, 3);
    assert_eq!(outcome.records[2].source_id, "poster-2.pdf");
    assert_eq!(outcome.records[2].inchikey, "KEY3");
    assert_eq!(outcome.records[2].validated, Some(true));
    assert_eq!(
        outcome.warnings,
        vec!["duplicate source id poster.pdf renamed to poster-2.pdf".to_string()]
    );
}

#[test]
fn pipeline_ignores_descriptions_when_text_extraction_is_off() {
    let segmenter = FakeSegmenter {
        per_document: HashMap::from([("a.pdf".to_string(), vec![(0, Some("Name|Target"))])]),
    };
    let primary = TableRecognizer::new("primary", &[]);

    let outcome = extract_records(
        &mut [document("a.pdf")],
        &segmenter,
        &SetValidator(Vec::new()),
        &primary,
        None,
        &options(false),
    )
    .unwrap();

    assert_eq!(outcome.counts.description_count, 0);
    assert_eq!(outcome.records[0].proposed_name, None);
    assert_eq!(outcome.records[0].validated, None);
}

#[test]
fn pipeline_with_no_segments_yields_no_records() {
    let segmenter = FakeSegmenter {
        per_document: HashMap::from([("a.pdf".to_string(), Vec::new())]),
    };
    let primary = TableRecognizer::new("primary", &[]);

    let outcome = extract_records(
        &mut [document("a.pdf")],
        &segmenter,
        &SetValidator(Vec::new()),
        &primary,
        None,
        &options(false),
    )
    .unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.counts.reconcile.processed, 0);
}

#[test]
fn manifest_path_sits_next_to_output() {
    let path = manifest_path_for(Path::new("out/results_20240101T000000Z.csv"));
    assert_eq!(
        path,
        PathBuf::from("out/results_20240101T000000Z.manifest.json")
    );
}

#[test]
fn render_extract_command_includes_non_default_flags() {
    let args = ExtractArgs {
        url: None,
        year: Some(2023),
        month: Some("1-3".to_string()),
        input_dir: None,
        base_url: crate::cli::DEFAULT_MONTHLY_BASE_URL.to_string(),
        text: true,
        direction: TextDirection::Right,
        separator: "|".to_string(),
        complement_off: false,
        complement_policy: ComplementPolicy::InvalidOrUnchecked,
        seg_dir: None,
        output_dir: PathBuf::from("out"),
        output_format: OutputFormat::Sqlite,
        segmenter_cmd: "decimer-segment".to_string(),
        primary_cmd: "molscribe-recognize".to_string(),
        complement_cmd: "decimer-recognize".to_string(),
        validation: ValidationOptions {
            chembl_url: crate::cli::DEFAULT_CHEMBL_URL.to_string(),
            http_timeout_secs: 30,
            validation_cache: None,
        },
    };

    let command = render_extract_command(&args);
    assert_eq!(
        command,
        "molhunt extract --year 2023 --month 1-3 --text --direction right --separator | --complement-policy invalid-or-unchecked --output-dir out --output-format sqlite"
    );
}

#[test]
fn render_extract_command_records_changed_tools_and_endpoints() {
    let mut args = ExtractArgs {
        url: None,
        year: Some(2024),
        month: None,
        input_dir: None,
        base_url: "https://mirror.example.org/motm".to_string(),
        text: false,
        direction: TextDirection::Right,
        separator: "|".to_string(),
        complement_off: false,
        complement_policy: ComplementPolicy::Invalid,
        seg_dir: None,
        output_dir: PathBuf::from("."),
        output_format: OutputFormat::Csv,
        segmenter_cmd: "decimer-segment".to_string(),
        primary_cmd: "molscribe-recognize --device cpu".to_string(),
        complement_cmd: "decimer-recognize".to_string(),
        validation: ValidationOptions {
            chembl_url: "http://localhost:8000/chembl".to_string(),
            http_timeout_secs: 90,
            validation_cache: None,
        },
    };

    assert_eq!(
        render_extract_command(&args),
        "molhunt extract --year 2024 --base-url https://mirror.example.org/motm --output-dir . --primary-cmd 'molscribe-recognize --device cpu' --chembl-url http://localhost:8000/chembl --http-timeout-secs 90"
    );

    args.complement_off = true;
    args.complement_cmd = "custom-recognize".to_string();
    assert!(!render_extract_command(&args).contains("--complement-cmd"));
}
