use std::collections::HashMap;

use crate::model::ExtractionRecord;

/// Collapses records sharing a non-empty inchikey.
///
/// The first validated record of each group survives, or the first record when none is
/// validated. Records without an inchikey are always kept. Survivors keep their relative order.
pub fn dedupe(records: Vec<ExtractionRecord>) -> Vec<ExtractionRecord> {
    let mut winners = HashMap::<String, (usize, bool)>::new();

    for (position, record) in records.iter().enumerate() {
        if record.inchikey.is_empty() {
            continue;
        }
        let validated = record.validated == Some(true);
        winners
            .entry(record.inchikey.clone())
            .and_modify(|(winner, winner_validated)| {
                if validated && !*winner_validated {
                    *winner = position;
                    *winner_validated = true;
                }
            })
            .or_insert((position, validated));
    }

    records
        .into_iter()
        .enumerate()
        .filter(|(position, record)| {
            record.inchikey.is_empty()
                || winners
                    .get(&record.inchikey)
                    .is_some_and(|(winner, _)| winner == position)
        })
        .map(|(_, record)| record)
        .collect()
}
