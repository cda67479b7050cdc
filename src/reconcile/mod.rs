use anyhow::{Context, Result, ensure};
use tracing::info;

use crate::cli::ComplementPolicy;
use crate::model::{
    Engine, ExtractionRecord, RecognitionResult, ReconcileCounts, RecordSet, Segment, SegmentKey,
};
use crate::recognition::{StructureRecognizer, recognize_segments};
use crate::util::{percentage, render_percentage};
use crate::validation::IdentityValidator;


#[derive(Debug)]
pub struct Reconciliation {
    pub records: RecordSet,
    pub counts: ReconcileCounts,
}

/// Fills `records` from the primary recognizer and retries the segments selected by
/// `policy` with the complement recognizer, when one is given.
pub fn reconcile(
    mut records: RecordSet,
    segments: &[Segment],
    validator: &dyn IdentityValidator,
    primary: &dyn StructureRecognizer,
    complement: Option<&dyn StructureRecognizer>,
    policy: ComplementPolicy,
) -> Result<Reconciliation> {
    ensure!(
        records.len() == segments.len(),
        "record set holds {} records for {} segments",
        records.len(),
        segments.len()
    );

    let mut counts = ReconcileCounts {
        processed: segments.len(),
        ..ReconcileCounts::default()
    };

    if records.is_empty() {
        return Ok(Reconciliation { records, counts });
    }

    let all_segments: Vec<&Segment> = segments.iter().collect();
    let primary_results = recognize_segments(primary, &all_segments);
    let primary_validated = validate_results(validator, &primary_results)?;

    for ((key, result), validated) in primary_results.into_iter().zip(primary_validated) {
        record_for(&mut records, &key)?.apply_recognition(result, validated, Engine::Primary);
    }

    let (validated, invalid, unchecked) = tally(records.iter());
    counts.primary_validated = validated;
    counts.primary_invalid = invalid;
    counts.primary_unchecked = unchecked;
    info!(
        recognizer = primary.name(),
        validated,
        invalid,
        unchecked,
        success_rate = %render_percentage(percentage(validated, validated + invalid)),
        "primary recognition validated"
    );

    if let Some(complement) = complement {
        let candidates: Vec<&Segment> = segments
            .iter()
            .filter(|segment| {
                records
                    .get(&segment.key)
                    .is_some_and(|record| policy.wants_complement(record.validated))
            })
            .collect();
        counts.complement_attempted = candidates.len();

        if candidates.is_empty() {
            info!(recognizer = complement.name(), "no segments need the complement pass");
        } else {
            info!(
                recognizer = complement.name(),
                candidates = candidates.len(),
                policy = policy.as_str(),
                "running complement pass"
            );
            let complement_results = recognize_segments(complement, &candidates);
            let complement_validated = validate_results(validator, &complement_results)?;

            for ((key, result), validated) in
                complement_results.into_iter().zip(complement_validated)
            {
                let record = record_for(&mut records, &key)?;
                if !complement_wins(record, &result, validated) {
                    continue;
                }
                if validated == Some(true) {
                    counts.complement_recovered += 1;
                } else {
                    counts.complement_filled += 1;
                }
                record.apply_recognition(result, validated, Engine::Complement);
            }

            info!(
                recognizer = complement.name(),
                recovered = counts.complement_recovered,
                filled = counts.complement_filled,
                "complement pass merged"
            );
        }
    }

    let (validated, invalid, unchecked) = tally(records.iter());
    counts.final_validated = validated;
    counts.final_invalid = invalid;
    counts.final_unchecked = unchecked;

    Ok(Reconciliation { records, counts })
}

/// Merge rule for one complemented segment: a validated complement always wins, otherwise
/// any complement answer beats no primary answer. A validated primary is never replaced.
pub fn complement_wins(
    current: &ExtractionRecord,
    candidate: &RecognitionResult,
    candidate_validated: Option<bool>,
) -> bool {
    if current.validated == Some(true) {
        return false;
    }
    candidate_validated == Some(true) || (!candidate.is_empty() && current.inchikey.is_empty())
}

/// Counts records as (validated, invalid, unchecked).
pub fn tally<'a>(records: impl Iterator<Item = &'a ExtractionRecord>) -> (usize, usize, usize) {
    records.fold((0, 0, 0), |(yes, no, unknown), record| match record.validated {
        Some(true) => (yes + 1, no, unknown),
        Some(false) => (yes, no + 1, unknown),
        None => (yes, no, unknown + 1),
    })
}

fn validate_results(
    validator: &dyn IdentityValidator,
    results: &[(SegmentKey, RecognitionResult)],
) -> Result<Vec<Option<bool>>> {
    let keys: Vec<String> = results
        .iter()
        .map(|(_, result)| result.inchikey.clone())
        .collect();
    let validated = validator
        .validate(&keys)
        .context("identity validation failed")?;
    ensure!(
        validated.len() == keys.len(),
        "validator returned {} results for {} identity keys",
        validated.len(),
        keys.len()
    );
    Ok(validated)
}

fn record_for<'a>(
    records: &'a mut RecordSet,
    key: &SegmentKey,
) -> Result<&'a mut ExtractionRecord> {
    records
        .get_mut(key)
        .with_context(|| format!("no extraction record for segment {key}"))
}
