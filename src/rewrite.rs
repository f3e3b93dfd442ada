// Rewrite remote storage URLs in converted content to local paths.
// Per-file work is independent, so files are processed in parallel and the
// tallies merged into one report.

use crate::assets;
use crate::logger;
use crate::progress::ProgressManager;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::Path;

// Bucket -> local path prefix. resource-media collapses into /resources to
// match where the site serves those files from.
const BUCKET_MAP: &[(&str, &str)] = &[
    ("blog-images", "/blog-images"),
    ("images", "/images"),
    ("fonts", "/fonts"),
    ("videos", "/videos"),
    ("resource-media", "/resources"),
    ("resources", "/resources"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct RewriteReport {
    pub files_processed: usize,
    pub files_updated: usize,
    pub urls_replaced: usize,
}

pub struct UrlRewriter {
    rules: Vec<(Regex, String)>,
}

impl UrlRewriter {
    pub fn new(storage_url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let base = regex::escape(storage_url.trim_end_matches('/'));
        let mut rules = Vec::new();
        for (bucket, local) in BUCKET_MAP {
            let pattern = format!(r#"(?i){}/{}/([^\s)"']+)"#, base, regex::escape(bucket));
            rules.push((Regex::new(&pattern)?, (*local).to_string()));
        }
        Ok(Self { rules })
    }

    // Replace storage URLs in one document, returning the rewritten text
    // and the number of replacements. Captured object paths go through the
    // same filename normalization the download step uses, so rewritten
    // links point at files that actually exist locally.
    pub fn apply(&self, content: &str) -> (String, usize) {
        let mut text = content.to_string();
        let mut replaced = 0usize;
        for (url_re, local) in &self.rules {
            let mut count = 0usize;
            let rewritten = url_re.replace_all(&text, |caps: &regex::Captures| {
                count += 1;
                let object = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let name = object
                    .split('/')
                    .map(assets::normalize_filename)
                    .collect::<Vec<_>>()
                    .join("/");
                format!("{}/{}", local, name)
            });
            if count > 0 {
                text = rewritten.into_owned();
                replaced += count;
            }
        }
        (text, replaced)
    }
}

// Rewrite every Markdown file under content_dir in place. Files are only
// written back when at least one URL changed; read/write failures are
// logged and the rest of the batch continues.
pub fn rewrite_dir(
    content_dir: &Path,
    rewriter: &UrlRewriter,
    progress: &ProgressManager,
) -> Result<RewriteReport, Box<dyn std::error::Error + Send + Sync>> {
    let files = assets::markdown_files(content_dir)?;
    let bar = progress.new_count_bar(files.len() as u64, "Rewriting URLs");

    let stats: Vec<(usize, usize)> = files
        .par_iter()
        .map(|path| {
            if let Some(b) = &bar {
                b.inc(1);
            }
            let content = match fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    logger::error(&format!(
                        "rewrite: reading {} failed: {}",
                        path.display(),
                        e
                    ));
                    return (0, 0);
                }
            };
            let (updated, replaced) = rewriter.apply(&content);
            if replaced == 0 {
                return (0, 0);
            }
            match fs::write(path, updated) {
                Ok(()) => {
                    logger::debug(&format!(
                        "rewrite: {} ({} urls)",
                        path.display(),
                        replaced
                    ));
                    (1, replaced)
                }
                Err(e) => {
                    logger::error(&format!(
                        "rewrite: writing {} failed: {}",
                        path.display(),
                        e
                    ));
                    (0, 0)
                }
            }
        })
        .collect();

    if let Some(b) = bar {
        b.finish();
    }

    let mut report = RewriteReport {
        files_processed: files.len(),
        ..Default::default()
    };
    for (updated, replaced) in stats {
        report.files_updated += updated;
        report.urls_replaced += replaced;
    }
    Ok(report)
}
