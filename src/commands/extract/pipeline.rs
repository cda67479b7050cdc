use super::*;

pub(super) struct PipelineOptions<'a> {
    pub(super) extract_text: bool,
    pub(super) separator: &'a str,
    pub(super) policy: ComplementPolicy,
    pub(super) seg_dir: Option<&'a Path>,
}

#[derive(Debug)]
pub(super) struct PipelineOutcome {
    pub(super) records: Vec<ExtractionRecord>,
    pub(super) counts: ExtractCounts,
    pub(super) warnings: Vec<String>,
}

/// Segments, recognizes, reconciles and deduplicates `documents`.
///
/// Repeated source ids are renamed in place first, so segment keys stay unique.
pub(super) fn extract_records(
    documents: &mut [SourceDocument],
    segmenter: &dyn Segmenter,
    validator: &dyn IdentityValidator,
    primary: &dyn StructureRecognizer,
    complement: Option<&dyn StructureRecognizer>,
    options: &PipelineOptions<'_>,
) -> Result<PipelineOutcome> {
    let mut warnings = Vec::new();
    for note in ensure_unique_source_ids(documents) {
        warn!("{note}");
        warnings.push(note);
    }

    let segmentation = segmenter.segment(documents)?;
    warnings.extend(segmentation.warnings.iter().cloned());

    if let Some(seg_dir) = options.seg_dir {
        if let Err(err) = export_segment_images(&segmentation.segments, seg_dir) {
            warn!(
                seg_dir = %seg_dir.display(),
                error = %format!("{err:#}"),
                "failed to save segment images"
            );
            warnings.push(format!("segment export failed: {err:#}"));
        }
    }

    let mut records = RecordSet::from_segments(&segmentation.segments)?;
    let description_count = if options.extract_text {
        attach_descriptions(
            &mut records,
            &segmentation.descriptions,
            options.separator,
            &mut warnings,
        )
    } else {
        0
    };

    let reconciliation = reconcile(
        records,
        &segmentation.segments,
        validator,
        primary,
        complement,
        options.policy,
    )?;

    let records_before_dedupe = reconciliation.records.len();
    let records = dedupe(reconciliation.records.into_records());

    let counts = ExtractCounts {
        document_count: documents.len(),
        segmented_document_count: segmentation.segmented_sources.len(),
        segment_count: segmentation.segments.len(),
        description_count,
        records_before_dedupe,
        records_after_dedupe: records.len(),
        reconcile: reconciliation.counts,
    };

    Ok(PipelineOutcome {
        records,
        counts,
        warnings,
    })
}

fn attach_descriptions(
    records: &mut RecordSet,
    descriptions: &[(SegmentKey, String)],
    separator: &str,
    warnings: &mut Vec<String>,
) -> usize {
    let texts: Vec<String> = descriptions.iter().map(|(_, text)| text.clone()).collect();
    let proposals = parse_descriptions(&texts, separator);

    let mut attached = 0_usize;
    for ((key, _), info) in descriptions.iter().zip(proposals) {
        let Some(record) = records.get_mut(key) else {
            warn!(segment = %key, "description without matching segment");
            warnings.push(format!("description without matching segment: {key}"));
            continue;
        };
        record.description = Some(info.description);
        record.proposed_name = Some(info.proposed_name);
        record.proposed_target = Some(info.proposed_target);
        attached += 1;
    }
    attached
}

pub(super) fn log_summary(counts: &ExtractCounts) {
    let stats = &counts.reconcile;
    info!(
        processed = stats.processed,
        primary_validated = stats.primary_validated,
        primary_rate = %render_percentage(percentage(
            stats.primary_validated,
            stats.primary_validated + stats.primary_invalid
        )),
        primary_unchecked = stats.primary_unchecked,
        "primary recognition summary"
    );
    info!(
        attempted = stats.complement_attempted,
        recovered = stats.complement_recovered,
        filled = stats.complement_filled,
        recovered_rate = %render_percentage(percentage(
            stats.complement_recovered,
            stats.complement_attempted
        )),
        "complement recognition summary"
    );
    info!(
        final_validated = stats.final_validated,
        final_rate = %render_percentage(percentage(
            stats.final_validated,
            stats.final_validated + stats.final_invalid
        )),
        final_unchecked = stats.final_unchecked,
        records_before_dedupe = counts.records_before_dedupe,
        records_after_dedupe = counts.records_after_dedupe,
        "extraction summary"
    );
}

pub(super) fn source_entries(documents: &[SourceDocument]) -> Vec<SourceEntry> {
    documents
        .iter()
        .map(|document| SourceEntry {
            source_id: document.source_id.clone(),
            byte_len: document.bytes.len(),
            sha256: sha256_bytes(&document.bytes),
        })
        .collect()
}
