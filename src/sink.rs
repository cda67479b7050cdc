use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::info;

use crate::cli::OutputFormat;
use crate::model::{Engine, ExtractionRecord};
use crate::util::write_atomically;

pub trait TabularSink {
    fn write(&self, records: &[ExtractionRecord]) -> Result<PathBuf>;
}

pub fn sink_for(format: OutputFormat, path: PathBuf) -> Box<dyn TabularSink> {
    match format {
        OutputFormat::Csv => Box::new(CsvSink { path }),
        OutputFormat::Sqlite => Box::new(SqliteSink { path }),
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    source: &'a str,
    page_number: u32,
    segment_number: u32,
    description: &'a str,
    proposed_name: &'a str,
    proposed_target: &'a str,
    smiles: &'a str,
    inchi: &'a str,
    inchikey: &'a str,
    validated: Option<bool>,
    recognized_by: Option<Engine>,
}

impl<'a> From<&'a ExtractionRecord> for CsvRow<'a> {
    fn from(record: &'a ExtractionRecord) -> Self {
        Self {
            source: &record.source_id,
            page_number: record.page_number,
            segment_number: record.segment_index,
            description: record.description.as_deref().unwrap_or_default(),
            proposed_name: record.proposed_name.as_deref().unwrap_or_default(),
            proposed_target: record.proposed_target.as_deref().unwrap_or_default(),
            smiles: &record.smiles,
            inchi: &record.inchi,
            inchikey: &record.inchikey,
            validated: record.validated,
            recognized_by: record.recognized_by,
        }
    }
}

pub struct CsvSink {
    pub path: PathBuf,
}

impl TabularSink for CsvSink {
    fn write(&self, records: &[ExtractionRecord]) -> Result<PathBuf> {
        write_atomically(&self.path, |file| {
            let mut writer = csv::Writer::from_writer(file.as_file_mut());
            for record in records {
                writer
                    .serialize(CsvRow::from(record))
                    .with_context(|| format!("failed to write csv row to {}", self.path.display()))?;
            }
            writer
                .flush()
                .with_context(|| format!("failed to flush {}", self.path.display()))?;
            Ok(())
        })?;

        info!(path = %self.path.display(), rows = records.len(), "exported records to csv");
        Ok(self.path.clone())
    }
}

pub struct SqliteSink {
    pub path: PathBuf,
}

impl TabularSink for SqliteSink {
    fn write(&self, records: &[ExtractionRecord]) -> Result<PathBuf> {
        write_atomically(&self.path, |file| {
            let mut connection = Connection::open(file.path())
                .with_context(|| format!("failed to open {}", file.path().display()))?;
            insert_records(&mut connection, records)?;
            connection
                .close()
                .map_err(|(_, err)| err)
                .context("failed to close result database")?;
            Ok(())
        })?;

        info!(path = %self.path.display(), rows = records.len(), "exported records to sqlite");
        Ok(self.path.clone())
    }
}

fn insert_records(connection: &mut Connection, records: &[ExtractionRecord]) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS extraction_records (
              source TEXT NOT NULL,
              page_number INTEGER NOT NULL,
              segment_number INTEGER NOT NULL,
              description TEXT,
              proposed_name TEXT,
              proposed_target TEXT,
              smiles TEXT NOT NULL,
              inchi TEXT NOT NULL,
              inchikey TEXT NOT NULL,
              validated INTEGER,
              recognized_by TEXT,
              PRIMARY KEY(source, page_number, segment_number)
            );
            ",
        )
        .context("failed to create extraction_records schema")?;

    let tx = connection.transaction()?;
    {
        let mut statement = tx.prepare(
            "
            INSERT INTO extraction_records(
              source, page_number, segment_number, description, proposed_name,
              proposed_target, smiles, inchi, inchikey, validated, recognized_by
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
        )?;
        for record in records {
            statement
                .execute(params![
                    record.source_id,
                    record.page_number,
                    record.segment_index,
                    record.description,
                    record.proposed_name,
                    record.proposed_target,
                    record.smiles,
                    record.inchi,
                    record.inchikey,
                    record.validated,
                    record.recognized_by.map(engine_label),
                ])
                .with_context(|| format!("failed to insert record {}", record.key()))?;
        }
    }
    tx.commit().context("failed to commit extraction records")?;
    Ok(())
}

fn engine_label(engine: Engine) -> &'static str {
    match engine {
        Engine::Primary => "primary",
        Engine::Complement => "complement",
    }
}

pub fn default_output_path(output_dir: &Path, stamp: &str, format: OutputFormat) -> PathBuf {
    output_dir.join(format!("results_{stamp}.{}", format.extension()))
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{CsvSink, SqliteSink, TabularSink, default_output_path};
    use crate::cli::OutputFormat;
    use crate::model::{Engine, ExtractionRecord, SegmentKey};

    fn sample_records() -> Vec<ExtractionRecord> {
        let mut checked = ExtractionRecord::for_segment(&SegmentKey::new("june.pdf", 0, 0));
        checked.proposed_name = Some("Aspirin".to_string());
        checked.proposed_target = Some("COX".to_string());
        checked.smiles = "CC(=O)OC1=CC=CC=C1C(=O)O".to_string();
        checked.inchikey = "BSYNRYMUTXBXSQ-UHFFFAOYSA-N".to_string();
        checked.validated = Some(true);
        checked.recognized_by = Some(Engine::Complement);

        let unchecked = ExtractionRecord::for_segment(&SegmentKey::new("june.pdf", 1, 1));
        vec![checked, unchecked]
    }

    #[test]
    fn csv_sink_writes_header_and_blank_unchecked_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.csv");

        let written = CsvSink { path: path.clone() }.write(&sample_records()).unwrap();

        assert_eq!(written, path);
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "source,page_number,segment_number,description,proposed_name,proposed_target,smiles,inchi,inchikey,validated,recognized_by"
        );
        assert!(lines[1].starts_with("june.pdf,0,0,,Aspirin,COX,"));
        assert!(lines[1].ends_with(",BSYNRYMUTXBXSQ-UHFFFAOYSA-N,true,complement"));
        assert_eq!(lines[2], "june.pdf,1,1,,,,,,,,");
    }

    #[test]
    fn sqlite_sink_persists_all_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.sqlite");

        SqliteSink { path: path.clone() }.write(&sample_records()).unwrap();

        let connection = Connection::open(&path).unwrap();
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM extraction_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
        let validated: Option<bool> = connection
            .query_row(
                "SELECT validated FROM extraction_records WHERE segment_number = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(validated, None);
    }

    #[test]
    fn default_output_path_uses_stamp_and_extension() {
        let path = default_output_path(std::path::Path::new("out"), "20240101T000000Z", OutputFormat::Sqlite);
        assert_eq!(path, std::path::PathBuf::from("out/results_20240101T000000Z.sqlite"));
    }
}
