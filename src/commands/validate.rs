use anyhow::{Result, ensure};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::util::{percentage, render_percentage};
use crate::validation::build_validator;

#[derive(Debug, Serialize, PartialEq, Eq)]
struct KeyValidation {
    inchikey: String,
    validated: Option<bool>,
}

pub fn run(args: ValidateArgs) -> Result<()> {
    let validator = build_validator(&args.validation)?;
    let keys: Vec<String> = args
        .inchikeys
        .iter()
        .map(|key| key.trim().to_string())
        .collect();

    let results = validator.validate(&keys)?;
    ensure!(
        results.len() == keys.len(),
        "validator returned {} results for {} identity keys",
        results.len(),
        keys.len()
    );

    let rows: Vec<KeyValidation> = keys
        .into_iter()
        .zip(results)
        .map(|(inchikey, validated)| KeyValidation {
            inchikey,
            validated,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!("{}\t{}", row.inchikey, render_validation(row.validated));
        }
    }

    let valid = rows.iter().filter(|row| row.validated == Some(true)).count();
    let invalid = rows.iter().filter(|row| row.validated == Some(false)).count();
    info!(
        keys = rows.len(),
        valid,
        invalid,
        unchecked = rows.len() - valid - invalid,
        valid_rate = %render_percentage(percentage(valid, valid + invalid)),
        "validation finished"
    );

    Ok(())
}

fn render_validation(validated: Option<bool>) -> &'static str {
    match validated {
        Some(true) => "valid",
        Some(false) => "invalid",
        None => "unchecked",
    }
}
