use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{ComplementPolicy, ExtractArgs, OutputFormat};
use crate::dedupe::dedupe;
use crate::description::parse_descriptions;
use crate::model::{
    ExtractCounts, ExtractRunManifest, ExtractionRecord, RecordSet, SegmentKey, SourceDocument,
    SourceEntry,
};
use crate::recognition::{CommandRecognizer, StructureRecognizer};
use crate::reconcile::reconcile;
use crate::segmentation::{CommandSegmenter, Segmenter, export_segment_images};
use crate::sink::{default_output_path, sink_for};
use crate::source::{
    DocumentSource, HttpDocumentSource, LocalDocumentSource, ensure_unique_source_ids,
};
use crate::target::Target;
use crate::tooling::{ToolCommand, command_available};
use crate::util::{
    now_utc_string, percentage, render_percentage, sha256_bytes, utc_compact_string,
    write_json_pretty,
};
use crate::validation::{IdentityValidator, build_validator};

mod pipeline;
mod run;
#[cfg(test)]
mod tests;

pub use run::run;

use pipeline::*;
