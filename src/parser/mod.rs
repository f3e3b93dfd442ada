// Parser module: dump file loading and VALUES-clause parsing into records.

pub mod values;

use crate::logger;
use memmap2::Mmap;
use regex::Regex;
use std::fs::File;

// One decoded field literal: NULL or a string with quoting removed.
// Non-string literals (numbers, timestamps) stay as opaque text; the caller
// interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.as_str()),
        }
    }
}

// One parsed row: decoded fields in column order.
pub type Record = Vec<FieldValue>;

// Diagnostic for a row whose field count does not match the table width.
// The row is skipped; the batch carries on.
#[derive(Debug, Clone)]
pub struct SkippedRow {
    pub index: usize,
    pub fields: usize,
}

// A dump file mapped into memory. Record spans borrow from the map, so
// nothing is copied until field decoding rewrites quoted content.
pub struct DumpFile {
    path: String,
    mmap: Mmap,
}

impl DumpFile {
    pub fn open(path: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        logger::debug(&format!("DumpFile: opening {}", path));
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(format!("dump file {} is empty", path).into());
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            path: path.to_string(),
            mmap,
        })
    }

    pub fn text(&self) -> Result<&str, Box<dyn std::error::Error + Send + Sync>> {
        Ok(std::str::from_utf8(&self.mmap)?)
    }

    // Everything after the first VALUES keyword. Its absence is the only
    // fatal parse error; all later damage degrades to per-record skips.
    pub fn values_body(&self) -> Result<&str, Box<dyn std::error::Error + Send + Sync>> {
        let text = self.text()?;
        let values_re = Regex::new(r"(?s)VALUES\s+(.+)$").expect("valid values regex");
        match values_re.captures(text).and_then(|cap| cap.get(1)) {
            Some(body) => Ok(body.as_str()),
            None => Err(format!("no VALUES clause found in {}", self.path).into()),
        }
    }
}

// Parse every record in a VALUES body, in source order.
pub fn parse_records(body: &str) -> Vec<Record> {
    values::split_records(body)
        .into_iter()
        .map(values::tokenize_fields)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "blogmigrate-parser-{}-{}",
            std::process::id(),
            name
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_values_body_returns_statement_tail() {
        let path = scratch_file(
            "tail.sql",
            "INSERT INTO \"public\".\"blog_posts\" (\"id\", \"title\") VALUES ('1', 'T');",
        );
        let dump = DumpFile::open(path.to_str().unwrap()).unwrap();
        let body = dump.values_body().unwrap();
        assert_eq!(body, "('1', 'T');");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_values_keyword_is_fatal() {
        let path = scratch_file("novalues.sql", "SELECT * FROM blog_posts;");
        let dump = DumpFile::open(path.to_str().unwrap()).unwrap();
        let err = dump.values_body().unwrap_err();
        assert!(err.to_string().contains("no VALUES clause"));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_parse_records_end_to_end() {
        let body = "('1', 'Title', NULL, 'Body, with comma'), ('2', 'T2', 'X', 'Y')";
        let records = parse_records(body);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            vec![
                FieldValue::Text("1".into()),
                FieldValue::Text("Title".into()),
                FieldValue::Null,
                FieldValue::Text("Body, with comma".into()),
            ]
        );
        assert_eq!(
            records[1],
            vec![
                FieldValue::Text("2".into()),
                FieldValue::Text("T2".into()),
                FieldValue::Text("X".into()),
                FieldValue::Text("Y".into()),
            ]
        );
    }

    #[test]
    fn test_record_count_matches_group_count() {
        let groups: Vec<String> = (0..7).map(|i| format!("('{}')", i)).collect();
        let body = groups.join(", ");
        assert_eq!(parse_records(&body).len(), 7);
    }
}
