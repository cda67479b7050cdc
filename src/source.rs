use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use regex::Regex;
use reqwest::Url;
use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::model::SourceDocument;
use crate::target::Target;

pub trait DocumentSource {
    fn fetch(&self, target: &Target) -> Result<Vec<SourceDocument>>;
}

pub struct HttpDocumentSource {
    client: Client,
    href_pattern: Regex,
}

impl HttpDocumentSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("molhunt/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build document HTTP client")?;
        let href_pattern = pdf_href_pattern()?;
        Ok(Self {
            client,
            href_pattern,
        })
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request failed: {url}"))?;
        let status = response.status();
        ensure!(status.is_success(), "GET {url} returned {status}");
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read body: {url}"))?;
        Ok(bytes.to_vec())
    }

    fn pdf_links(&self, page_url: &str) -> Result<Vec<String>> {
        let body = self.download(page_url)?;
        let html = String::from_utf8_lossy(&body);
        let base = Url::parse(page_url).with_context(|| format!("invalid url: {page_url}"))?;
        Ok(discover_pdf_links(&html, &base, &self.href_pattern))
    }

    fn fetch_page(
        &self,
        page_url: &str,
        download_all: bool,
        fetched: &mut HashSet<String>,
    ) -> Vec<SourceDocument> {
        let links = if is_pdf_url(page_url) {
            vec![page_url.to_string()]
        } else {
            match self.pdf_links(page_url) {
                Ok(links) => links,
                Err(err) => {
                    warn!(url = %page_url, error = %err, "failed to load page; skipping");
                    return Vec::new();
                }
            }
        };

        if links.is_empty() {
            warn!(url = %page_url, "no PDF links found on page");
        }

        let take = if download_all { links.len() } else { 1 };
        let mut documents = Vec::new();
        for link in links.into_iter().take(take) {
            if !fetched.insert(link.clone()) {
                info!(url = %link, "document already fetched; skipping");
                continue;
            }
            match self.download(&link) {
                Ok(bytes) => {
                    info!(url = %link, bytes = bytes.len(), "downloaded document");
                    documents.push(SourceDocument {
                        source_id: source_id_for_url(&link),
                        bytes,
                    });
                }
                Err(err) => warn!(url = %link, error = %err, "failed to download document; skipping"),
            }
        }
        documents
    }
}

impl DocumentSource for HttpDocumentSource {
    fn fetch(&self, target: &Target) -> Result<Vec<SourceDocument>> {
        let mut documents = Vec::new();
        let mut fetched = HashSet::new();
        for (page_url, download_all) in target.page_urls() {
            info!(url = %page_url, download_all, "fetching documents");
            documents.extend(self.fetch_page(&page_url, download_all, &mut fetched));
        }
        Ok(documents)
    }
}

pub struct LocalDocumentSource;

impl DocumentSource for LocalDocumentSource {
    fn fetch(&self, target: &Target) -> Result<Vec<SourceDocument>> {
        let Target::Directory(dir) = target else {
            return Ok(Vec::new());
        };

        let mut documents = Vec::new();
        for path in discover_pdfs(dir)? {
            let source_id = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(ToOwned::to_owned)
                .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
            match fs::read(&path) {
                Ok(bytes) => documents.push(SourceDocument { source_id, bytes }),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to read document; skipping")
                }
            }
        }
        Ok(documents)
    }
}

pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();

    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if is_pdf {
            pdfs.push(path);
        }
    }

    pdfs.sort();
    Ok(pdfs)
}

fn pdf_href_pattern() -> Result<Regex> {
    Regex::new(r#"(?i)href\s*=\s*["']([^"'#]+?\.pdf(?:\?[^"'#]*)?)["']"#)
        .context("failed to compile PDF href regex")
}

pub fn discover_pdf_links(html: &str, base: &Url, pattern: &Regex) -> Vec<String> {
    let mut links = Vec::<String>::new();
    for captures in pattern.captures_iter(html) {
        let Some(raw) = captures.get(1) else {
            continue;
        };
        let Ok(resolved) = base.join(raw.as_str().trim()) else {
            continue;
        };
        let resolved = resolved.to_string();
        if !links.contains(&resolved) {
            links.push(resolved);
        }
    }
    links
}

fn is_pdf_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| parsed.path().to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

pub fn source_id_for_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(ToOwned::to_owned))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| url.to_string())
}

/// Renames documents whose source id repeats an earlier one (`poster.pdf` becomes
/// `poster-2.pdf`) and returns one note per rename.
pub fn ensure_unique_source_ids(documents: &mut [SourceDocument]) -> Vec<String> {
    let mut taken = HashSet::<String>::new();
    let mut renamed = Vec::new();

    for document in documents.iter_mut() {
        if taken.insert(document.source_id.clone()) {
            continue;
        }

        let (stem, extension) = match document.source_id.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() => {
                (stem.to_string(), format!(".{extension}"))
            }
            _ => (document.source_id.clone(), String::new()),
        };
        let mut suffix = 2_usize;
        let unique = loop {
            let candidate = format!("{stem}-{suffix}{extension}");
            if !taken.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };

        taken.insert(unique.clone());
        renamed.push(format!(
            "duplicate source id {} renamed to {unique}",
            document.source_id
        ));
        document.source_id = unique;
    }

    renamed
}
