// Asset pipeline: find remote storage URLs in converted content, keep a
// manifest of what was found, and mirror each file into a local directory
// with a JSON download log.

use crate::logger;
use crate::progress::ProgressManager;
use ahash::AHashSet;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

// Everything discovered by a content scan. file_image_map is keyed by file
// name so the manifest JSON stays stable across runs.
#[derive(Debug, Serialize)]
pub struct AssetManifest {
    pub total_images: usize,
    pub total_files_with_images: usize,
    pub image_urls: Vec<String>,
    pub file_image_map: BTreeMap<String, Vec<String>>,
}

// URL pattern for one storage base. Extensions match case-insensitively;
// the class stops at whitespace, quotes, and a closing Markdown paren.
fn asset_url_pattern(
    storage_url: &str,
) -> Result<Regex, Box<dyn std::error::Error + Send + Sync>> {
    let base = regex::escape(storage_url.trim_end_matches('/'));
    let pattern = format!(r#"(?i){}/[^\s)"']+\.(?:png|jpg|jpeg|gif|webp|svg)"#, base);
    Ok(Regex::new(&pattern)?)
}

// Sorted list of .md files directly under dir.
pub fn markdown_files(
    dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// Scan every Markdown file under content_dir for storage asset URLs.
pub fn scan_content_dir(
    content_dir: &Path,
    storage_url: &str,
) -> Result<AssetManifest, Box<dyn std::error::Error + Send + Sync>> {
    let url_re = asset_url_pattern(storage_url)?;
    let mut unique: AHashSet<String> = AHashSet::new();
    let mut per_file: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for path in markdown_files(content_dir)? {
        let content = fs::read_to_string(&path)?;
        let mut found = Vec::new();
        for m in url_re.find_iter(&content) {
            unique.insert(m.as_str().to_string());
            found.push(m.as_str().to_string());
        }
        if !found.is_empty() {
            let name = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            logger::debug(&format!("scan: {} urls in {}", found.len(), name));
            per_file.insert(name, found);
        }
    }

    let mut image_urls: Vec<String> = unique.into_iter().collect();
    image_urls.sort();
    Ok(AssetManifest {
        total_images: image_urls.len(),
        total_files_with_images: per_file.len(),
        image_urls,
        file_image_map: per_file,
    })
}

// Local name for a storage object segment: %20 decoded, spaces collapsed
// to dashes. Download and rewrite share this rule so links stay valid.
pub fn normalize_filename(segment: &str) -> String {
    let decoded = segment.replace("%20", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join("-")
}

// Filename an asset URL is saved under: its last path segment, normalized.
pub fn local_asset_name(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or(url);
    normalize_filename(segment)
}

// One entry in the download log.
#[derive(Debug, Serialize)]
pub struct DownloadOutcome {
    pub url: String,
    pub filename: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadOutcome {
    fn new(url: &str, filename: &str, status: &str) -> Self {
        Self {
            url: url.to_string(),
            filename: filename.to_string(),
            status: status.to_string(),
            size_bytes: None,
            hash: None,
            local_path: None,
            error: None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct DownloadLog {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub downloads: Vec<DownloadOutcome>,
}

pub struct Downloader {
    client: reqwest::blocking::Client,
    retries: u32,
    delay: Duration,
}

impl Downloader {
    pub fn new(
        timeout_secs: u64,
        retries: u32,
        delay_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        // Some storage frontends refuse requests without a browser UA.
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            retries: retries.max(1),
            delay: Duration::from_millis(delay_ms),
        })
    }

    // Mirror every URL into out_dir. Existing files are skipped without a
    // request; failures are recorded and the batch carries on.
    pub fn mirror(
        &self,
        urls: &[String],
        out_dir: &Path,
        progress: &ProgressManager,
    ) -> Result<DownloadLog, Box<dyn std::error::Error + Send + Sync>> {
        fs::create_dir_all(out_dir)?;
        let bar = progress.new_count_bar(urls.len() as u64, "Downloading assets");

        let mut log = DownloadLog {
            total: urls.len(),
            ..Default::default()
        };

        for (idx, url) in urls.iter().enumerate() {
            if let Some(b) = &bar {
                b.inc(1);
            }
            let filename = local_asset_name(url);
            let target = out_dir.join(&filename);

            if target.exists() {
                logger::debug(&format!("mirror: {} already exists, skipping", filename));
                log.skipped += 1;
                log.downloads.push(DownloadOutcome::new(url, &filename, "skipped"));
                continue;
            }

            match self.fetch(url) {
                Ok(bytes) => match fs::write(&target, &bytes) {
                    Ok(()) => {
                        logger::debug(&format!(
                            "mirror: {} ({} bytes)",
                            filename,
                            bytes.len()
                        ));
                        let mut outcome = DownloadOutcome::new(url, &filename, "success");
                        outcome.size_bytes = Some(bytes.len() as u64);
                        outcome.hash = Some(blake3::hash(&bytes).to_hex().to_string());
                        outcome.local_path = Some(target.display().to_string());
                        log.success += 1;
                        log.downloads.push(outcome);
                    }
                    Err(e) => {
                        logger::error(&format!("mirror: writing {} failed: {}", filename, e));
                        let mut outcome = DownloadOutcome::new(url, &filename, "failed");
                        outcome.error = Some(e.to_string());
                        log.failed += 1;
                        log.downloads.push(outcome);
                    }
                },
                Err(e) => {
                    logger::error(&format!("mirror: {} failed: {}", url, e));
                    let mut outcome = DownloadOutcome::new(url, &filename, "failed");
                    outcome.error = Some(e);
                    log.failed += 1;
                    log.downloads.push(outcome);
                }
            }

            // Politeness delay between requests.
            if idx + 1 < urls.len() && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }

        if let Some(b) = bar {
            b.finish();
        }
        Ok(log)
    }

    // GET with bounded retries and a linear backoff.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            match self.try_fetch(url) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    logger::debug(&format!(
                        "fetch: attempt {}/{} for {} failed: {}",
                        attempt, self.retries, url, e
                    ));
                    last_error = e;
                }
            }
            if attempt < self.retries {
                thread::sleep(Duration::from_millis(500 * attempt as u64));
            }
        }
        Err(last_error)
    }

    fn try_fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| e.to_string())
    }
}
