// Blog post mapping and Markdown conversion.
// The parser hands over positional fields; this module gives them names,
// renders frontmatter, and writes one file per post.

use crate::logger;
use crate::parser::{self, DumpFile, FieldValue, SkippedRow};
use crate::progress::ProgressManager;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// Column order of the posts table as exported:
// id, title, excerpt, content, category, author_name, author_avatar,
// published_at, read_time, cover_image, slug, created_at, updated_at.
pub const POST_COLUMNS: usize = 13;

const DEFAULT_DATE: &str = "2025-01-01";
const DEFAULT_READ_TIME: u32 = 5;
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub category: String,
    pub author_name: String,
    pub published_at: Option<String>,
    pub read_time: u32,
    pub cover_image: Option<String>,
    pub slug: Option<String>,
}

impl BlogPost {
    // Map a positional record onto named attributes. A width mismatch is a
    // per-row skip for the caller, never a batch failure.
    pub fn from_record(fields: &[FieldValue]) -> Result<Self, String> {
        if fields.len() != POST_COLUMNS {
            return Err(format!(
                "expected {} fields, got {}",
                POST_COLUMNS,
                fields.len()
            ));
        }
        Ok(Self {
            id: text_or_empty(&fields[0]),
            title: text_or_empty(&fields[1]),
            excerpt: text_or_empty(&fields[2]),
            content: text_or_empty(&fields[3]),
            category: text_or_empty(&fields[4]),
            author_name: text_or_empty(&fields[5]),
            published_at: fields[7].as_text().map(str::to_string),
            read_time: fields[8]
                .as_text()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_READ_TIME),
            cover_image: fields[9].as_text().map(str::to_string),
            slug: fields[10]
                .as_text()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    // {date}-{slug}.md, with fallbacks for posts missing either.
    pub fn filename(&self) -> String {
        let date = self
            .published_at
            .as_deref()
            .and_then(|s| s.split_whitespace().next())
            .unwrap_or(DEFAULT_DATE);
        match &self.slug {
            Some(slug) => format!("{}-{}.md", date, slug),
            None => {
                let short: String = self.id.chars().take(8).collect();
                format!("{}-post-{}.md", date, short)
            }
        }
    }

    // Frontmatter plus body. The tags line appears only when the tag dumps
    // were supplied and this post has any.
    pub fn render(&self, tags: &[String]) -> String {
        let excerpt: String = self.excerpt.chars().take(EXCERPT_CHARS).collect();
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("title: \"{}\"\n", yaml_escape(&self.title)));
        out.push_str(&format!(
            "date: \"{}\"\n",
            self.published_at.as_deref().unwrap_or("")
        ));
        out.push_str(&format!("category: \"{}\"\n", yaml_escape(&self.category)));
        if !tags.is_empty() {
            let list = serde_json::to_string(tags).expect("tag list serializes");
            out.push_str(&format!("tags: {}\n", list));
        }
        out.push_str(&format!("author: \"{}\"\n", yaml_escape(&self.author_name)));
        out.push_str(&format!("excerpt: \"{}...\"\n", yaml_escape(&excerpt)));
        out.push_str(&format!(
            "coverImage: \"{}\"\n",
            self.cover_image.as_deref().unwrap_or("")
        ));
        out.push_str(&format!("readTime: {}\n", self.read_time));
        out.push_str(&format!(
            "slug: \"{}\"\n",
            self.slug.as_deref().unwrap_or("")
        ));
        out.push_str("---\n\n");
        out.push_str(&self.content);
        out.push('\n');
        out
    }
}

fn text_or_empty(field: &FieldValue) -> String {
    field.as_text().unwrap_or("").to_string()
}

// Frontmatter values are double-quoted; keep embedded quotes from breaking
// the YAML.
fn yaml_escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

// Outcome of one conversion run, returned by value so the caller owns the
// tally and prints the summary.
#[derive(Debug, Default)]
pub struct ConvertReport {
    pub written: usize,
    pub write_errors: usize,
    pub skipped: Vec<SkippedRow>,
}

// Tag id -> display name, from the tags dump (rows: id, name, ...).
pub fn load_tag_names(
    path: &str,
) -> Result<HashMap<String, String>, Box<dyn std::error::Error + Send + Sync>> {
    let dump = DumpFile::open(path)?;
    let body = dump.values_body()?;
    let mut names = HashMap::new();
    for (index, record) in parser::parse_records(body).into_iter().enumerate() {
        if record.len() < 2 {
            logger::debug(&format!(
                "load_tag_names: row {} has {} fields, skipping",
                index,
                record.len()
            ));
            continue;
        }
        if let (Some(id), Some(name)) = (record[0].as_text(), record[1].as_text()) {
            names.insert(id.to_string(), name.to_string());
        }
    }
    logger::debug(&format!("load_tag_names: {} tags from {}", names.len(), path));
    Ok(names)
}

// Post id -> tag names, joined through the link dump (rows: id, post, tag).
// Unknown tag ids are dropped.
pub fn load_post_tags(
    path: &str,
    tag_names: &HashMap<String, String>,
) -> Result<HashMap<String, Vec<String>>, Box<dyn std::error::Error + Send + Sync>> {
    let dump = DumpFile::open(path)?;
    let body = dump.values_body()?;
    let mut post_tags: HashMap<String, Vec<String>> = HashMap::new();
    for (index, record) in parser::parse_records(body).into_iter().enumerate() {
        if record.len() < 3 {
            logger::debug(&format!(
                "load_post_tags: row {} has {} fields, skipping",
                index,
                record.len()
            ));
            continue;
        }
        if let (Some(post_id), Some(tag_id)) = (record[1].as_text(), record[2].as_text()) {
            if let Some(name) = tag_names.get(tag_id) {
                post_tags
                    .entry(post_id.to_string())
                    .or_default()
                    .push(name.clone());
            }
        }
    }
    Ok(post_tags)
}

// Convert a posts dump into one Markdown file per row. Rows that do not
// match the expected width are skipped and reported; a failed file write is
// logged and counted without stopping the run.
pub fn convert_dump(
    dump_path: &str,
    out_dir: &Path,
    post_tags: &HashMap<String, Vec<String>>,
    progress: &ProgressManager,
) -> Result<ConvertReport, Box<dyn std::error::Error + Send + Sync>> {
    let dump = DumpFile::open(dump_path)?;
    let body = dump.values_body()?;
    let spans = parser::values::split_records(body);
    logger::info(&format!(
        "convert: {} records found in {}",
        spans.len(),
        dump_path
    ));

    fs::create_dir_all(out_dir)?;
    let bar = progress.new_count_bar(spans.len() as u64, "Converting posts");

    let mut report = ConvertReport::default();
    for (index, span) in spans.iter().enumerate() {
        if let Some(b) = &bar {
            b.inc(1);
        }
        let fields = parser::values::tokenize_fields(span);
        let post = match BlogPost::from_record(&fields) {
            Ok(post) => post,
            Err(reason) => {
                logger::debug(&format!("convert: skipping record {}: {}", index, reason));
                report.skipped.push(SkippedRow {
                    index,
                    fields: fields.len(),
                });
                continue;
            }
        };

        let tags = post_tags
            .get(&post.id)
            .map(|v| v.as_slice())
            .unwrap_or(&[]);
        let filename = post.filename();
        match fs::write(out_dir.join(&filename), post.render(tags)) {
            Ok(()) => {
                report.written += 1;
                logger::debug(&format!("convert: wrote {}", filename));
            }
            Err(e) => {
                report.write_errors += 1;
                logger::error(&format!("convert: failed to write {}: {}", filename, e));
            }
        }
    }

    if let Some(b) = bar {
        b.finish();
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn sample_fields() -> Vec<FieldValue> {
        vec![
            text("01234567-89ab-cdef-0123-456789abcdef"),
            text("Hello \"World\""),
            text("An excerpt"),
            text("Body text"),
            text("news"),
            text("Alice"),
            text("avatar.png"),
            text("2025-03-04 10:00:00+00"),
            text("7"),
            FieldValue::Null,
            text("hello-world"),
            text("2025-03-04 10:00:00+00"),
            text("2025-03-04 10:00:00+00"),
        ]
    }

    #[test]
    fn test_from_record_maps_columns() {
        let post = BlogPost::from_record(&sample_fields()).unwrap();
        assert_eq!(post.title, "Hello \"World\"");
        assert_eq!(post.category, "news");
        assert_eq!(post.read_time, 7);
        assert_eq!(post.cover_image, None);
        assert_eq!(post.slug.as_deref(), Some("hello-world"));
    }

    #[test]
    fn test_from_record_rejects_wrong_width() {
        let fields = vec![text("1"), text("2")];
        let err = BlogPost::from_record(&fields).unwrap_err();
        assert!(err.contains("expected 13 fields, got 2"));
    }

    #[test]
    fn test_read_time_defaults_when_null_or_garbage() {
        let mut fields = sample_fields();
        fields[8] = FieldValue::Null;
        assert_eq!(BlogPost::from_record(&fields).unwrap().read_time, 5);
        fields[8] = text("soon");
        assert_eq!(BlogPost::from_record(&fields).unwrap().read_time, 5);
    }

    #[test]
    fn test_filename_uses_date_and_slug() {
        let post = BlogPost::from_record(&sample_fields()).unwrap();
        assert_eq!(post.filename(), "2025-03-04-hello-world.md");
    }

    #[test]
    fn test_filename_falls_back_without_slug_or_date() {
        let mut fields = sample_fields();
        fields[7] = FieldValue::Null;
        fields[10] = FieldValue::Null;
        let post = BlogPost::from_record(&fields).unwrap();
        assert_eq!(post.filename(), "2025-01-01-post-01234567.md");
    }

    #[test]
    fn test_render_escapes_quotes_and_truncates_excerpt() {
        let mut fields = sample_fields();
        fields[2] = text(&"x".repeat(300));
        let post = BlogPost::from_record(&fields).unwrap();
        let md = post.render(&[]);
        assert!(md.starts_with("---\n"));
        assert!(md.contains("title: \"Hello \\\"World\\\"\""));
        assert!(md.contains(&format!("excerpt: \"{}...\"", "x".repeat(200))));
        assert!(!md.contains("tags:"));
        assert!(md.ends_with("Body text\n"));
    }

    #[test]
    fn test_render_includes_tag_list() {
        let post = BlogPost::from_record(&sample_fields()).unwrap();
        let md = post.render(&["rust".to_string(), "sql".to_string()]);
        assert!(md.contains("tags: [\"rust\",\"sql\"]"));
    }

    #[test]
    fn test_convert_dump_writes_files_and_reports_skips() {
        let dir = std::env::temp_dir().join(format!(
            "blogmigrate-post-{}-convert",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        let dump_path = dir.join("posts.sql");
        let out_dir = dir.join("content");
        fs::create_dir_all(&dir).unwrap();

        let row = "('id-1', 'T', 'E', 'B', 'c', 'A', 'av', \
                   '2025-03-04 10:00:00+00', '7', NULL, 's-1', 'x', 'y')";
        let dump = format!(
            "INSERT INTO \"public\".\"blog_posts\" VALUES {}, ('short', 'row');",
            row
        );
        fs::write(&dump_path, dump).unwrap();

        let report = convert_dump(
            dump_path.to_str().unwrap(),
            &out_dir,
            &HashMap::new(),
            &ProgressManager::new(false),
        )
        .unwrap();

        assert_eq!(report.written, 1);
        assert_eq!(report.write_errors, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 1);
        assert_eq!(report.skipped[0].fields, 2);
        assert!(out_dir.join("2025-03-04-s-1.md").exists());

        fs::remove_dir_all(&dir).unwrap();
    }
}
