use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cli::ValidationOptions;
use crate::util::now_utc_string;

/// Confirms identity keys against a chemical authority.
///
/// Returns one entry per input key, in input order. `None` marks a key that could not be
/// checked, which includes every empty key.
pub trait IdentityValidator {
    fn validate(&self, keys: &[String]) -> Result<Vec<Option<bool>>>;
}

pub fn build_validator(options: &ValidationOptions) -> Result<Box<dyn IdentityValidator>> {
    let chembl = ChemblValidator::new(
        &options.chembl_url,
        Duration::from_secs(options.http_timeout_secs),
        3,
    )?;

    match &options.validation_cache {
        Some(path) => Ok(Box::new(CachedValidator::open(path, chembl)?)),
        None => Ok(Box::new(chembl)),
    }
}

pub struct ChemblValidator {
    client: Client,
    endpoint: String,
    max_retries: usize,
}

#[derive(Debug, Deserialize)]
struct MoleculePage {
    page_meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    total_count: u64,
}

impl ChemblValidator {
    pub fn new(base_url: &str, timeout: Duration, max_retries: usize) -> Result<Self> {
        ensure!(!base_url.trim().is_empty(), "missing ChEMBL base url");
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build ChEMBL HTTP client")?;
        let endpoint = format!("{}/molecule.json", base_url.trim().trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            max_retries: max_retries.max(1),
        })
    }

    fn lookup(&self, inchikey: &str) -> Result<bool> {
        let mut attempt = 0_usize;
        loop {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("molecule_structures__standard_inchi_key", inchikey),
                    ("limit", "1"),
                ])
                .send();

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let page: MoleculePage =
                        resp.json().context("failed to parse ChEMBL molecule page")?;
                    return Ok(page.page_meta.total_count > 0);
                }
                Ok(resp) => {
                    let status = resp.status();
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    anyhow::bail!("ChEMBL lookup for {inchikey} failed ({status})");
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(err).with_context(|| format!("ChEMBL lookup for {inchikey}"));
                }
            }
        }
    }
}

impl IdentityValidator for ChemblValidator {
    fn validate(&self, keys: &[String]) -> Result<Vec<Option<bool>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.trim();
            if key.is_empty() {
                out.push(None);
                continue;
            }
            match self.lookup(key) {
                Ok(valid) => {
                    debug!(inchikey = %key, valid, "validated identity key");
                    out.push(Some(valid));
                }
                Err(err) => {
                    warn!(inchikey = %key, error = %format!("{err:#}"), "validation unavailable");
                    out.push(None);
                }
            }
        }
        Ok(out)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    Duration::from_millis(500 * (1_u64 << attempt.min(4)))
}

/// Answers from a SQLite cache of earlier definite results before asking `inner`.
pub struct CachedValidator<V> {
    connection: Connection,
    inner: V,
}

impl<V: IdentityValidator> CachedValidator<V> {
    pub fn open(path: &Path, inner: V) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            crate::util::ensure_directory(parent)?;
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open validation cache {}", path.display()))?;
        Self::with_connection(connection, inner)
    }

    pub fn with_connection(connection: Connection, inner: V) -> Result<Self> {
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS validation_cache (
                  inchikey TEXT PRIMARY KEY,
                  valid INTEGER NOT NULL,
                  checked_at TEXT NOT NULL
                );
                ",
            )
            .context("failed to create validation cache schema")?;
        Ok(Self { connection, inner })
    }

    fn cached(&self, key: &str) -> Result<Option<bool>> {
        let valid = self
            .connection
            .query_row(
                "SELECT valid FROM validation_cache WHERE inchikey = ?1",
                params![key],
                |row| row.get::<_, bool>(0),
            )
            .optional()
            .with_context(|| format!("failed to read validation cache for {key}"))?;
        Ok(valid)
    }

    fn store(&self, key: &str, valid: bool) -> Result<()> {
        self.connection
            .execute(
                "
                INSERT INTO validation_cache(inchikey, valid, checked_at)
                VALUES(?1, ?2, ?3)
                ON CONFLICT(inchikey) DO UPDATE SET
                  valid=excluded.valid,
                  checked_at=excluded.checked_at
                ",
                params![key, valid, now_utc_string()],
            )
            .with_context(|| format!("failed to write validation cache for {key}"))?;
        Ok(())
    }
}

struct CacheLookup {
    results: Vec<Option<bool>>,
    misses: Vec<usize>,
    hits: usize,
}

impl<V: IdentityValidator> CachedValidator<V> {
    fn lookup_cached(&self, keys: &[String]) -> Result<CacheLookup> {
        let mut lookup = CacheLookup {
            results: vec![None; keys.len()],
            misses: Vec::new(),
            hits: 0,
        };

        for (position, key) in keys.iter().enumerate() {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            match self.cached(key)? {
                Some(valid) => {
                    lookup.results[position] = Some(valid);
                    lookup.hits += 1;
                }
                None => lookup.misses.push(position),
            }
        }

        Ok(lookup)
    }
}

impl<V: IdentityValidator> IdentityValidator for CachedValidator<V> {
    fn validate(&self, keys: &[String]) -> Result<Vec<Option<bool>>> {
        let CacheLookup {
            results: mut out,
            misses,
            hits,
        } = self.lookup_cached(keys)?;

        let miss_keys: Vec<String> = misses
            .iter()
            .map(|position| keys[*position].trim().to_string())
            .collect();
        let fresh = if miss_keys.is_empty() {
            Vec::new()
        } else {
            self.inner.validate(&miss_keys)?
        };
        ensure!(
            fresh.len() == miss_keys.len(),
            "validator returned {} results for {} keys",
            fresh.len(),
            miss_keys.len()
        );

        for ((position, key), result) in misses.iter().zip(&miss_keys).zip(fresh) {
            if let Some(valid) = result {
                self.store(key, valid)?;
            }
            out[*position] = result;
        }

        info!(
            keys = keys.len(),
            cache_hits = hits,
            lookups = misses.len(),
            "validation completed"
        );
        Ok(out)
    }
}
