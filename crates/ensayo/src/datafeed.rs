//! Data-driven test feeds.
//!
//! Reads tabular/structured files and yields one key-value record per test
//! iteration. The first row (or the object keys, for JSON) defines the
//! field names; every key and value is trimmed of surrounding whitespace
//! before being handed to a test.

use crate::result::{EnsayoError, EnsayoResult};
use std::collections::HashMap;
use std::path::Path;

/// One parameterized test iteration: field name → value
pub type Record = HashMap<String, String>;

/// Read a CSV feed. The header row defines field names; each following row
/// is one record. Quoted fields may contain commas and doubled quotes.
///
/// # Errors
///
/// `DataFeed` for a missing/empty file or a row whose width differs from
/// the header.
pub fn read_csv(path: impl AsRef<Path>) -> EnsayoResult<Vec<Record>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| EnsayoError::data_feed(format!("failed to read {}: {e}", path.display())))?;
    parse_csv(&text)
}

/// Parse CSV text. See [`read_csv`].
pub fn parse_csv(text: &str) -> EnsayoResult<Vec<Record>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| EnsayoError::data_feed("empty data file"))?;
    let fields: Vec<String> = split_csv_line(header)
        .into_iter()
        .map(|f| f.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for (index, line) in lines.enumerate() {
        let values = split_csv_line(line);
        if values.len() != fields.len() {
            return Err(EnsayoError::data_feed(format!(
                "row {} has {} fields, header has {}",
                index + 2,
                values.len(),
                fields.len()
            )));
        }
        let record: Record = fields
            .iter()
            .cloned()
            .zip(values.into_iter().map(|v| v.trim().to_string()))
            .collect();
        records.push(record);
    }
    Ok(records)
}

/// Split one CSV line, honoring double quotes. `""` inside a quoted field
/// is an escaped quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Read a JSON feed: a top-level array of flat objects. Scalar values are
/// stringified; keys and values are trimmed.
///
/// # Errors
///
/// `DataFeed` for a missing file, invalid JSON, or a non-array top level.
pub fn read_json(path: impl AsRef<Path>) -> EnsayoResult<Vec<Record>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| EnsayoError::data_feed(format!("failed to read {}: {e}", path.display())))?;
    parse_json(&text)
}

/// Parse a JSON feed. See [`read_json`].
pub fn parse_json(text: &str) -> EnsayoResult<Vec<Record>> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| EnsayoError::data_feed(format!("invalid JSON: {e}")))?;
    let items = value
        .as_array()
        .ok_or_else(|| EnsayoError::data_feed("JSON feed must be a top-level array"))?;

    let mut records = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| {
            EnsayoError::data_feed(format!("element {index} is not an object"))
        })?;
        let mut record = Record::new();
        for (key, raw) in object {
            let rendered = match raw {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            record.insert(key.trim().to_string(), rendered.trim().to_string());
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_trims_keys_and_values() {
        let records = parse_csv(
            "username,password\n tomsmith ,pw1\njsmith,pw2\nasmith, pw3 \n",
        )
        .unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.len(), 2);
            assert!(record.contains_key("username"));
            assert!(record.contains_key("password"));
        }
        assert_eq!(records[0]["username"], "tomsmith");
        assert_eq!(records[2]["password"], "pw3");
    }

    #[test]
    fn test_csv_quoted_fields() {
        let records = parse_csv("name,note\nalice,\"hello, world\"\nbob,\"say \"\"hi\"\"\"\n")
            .unwrap();
        assert_eq!(records[0]["note"], "hello, world");
        assert_eq!(records[1]["note"], "say \"hi\"");
    }

    #[test]
    fn test_csv_width_mismatch_is_error() {
        let err = parse_csv("a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(err, EnsayoError::DataFeed { .. }));
    }

    #[test]
    fn test_csv_empty_file_is_error() {
        assert!(parse_csv("").is_err());
        assert!(parse_csv("\n\n").is_err());
    }

    #[test]
    fn test_csv_header_only_yields_no_records() {
        assert!(parse_csv("a,b\n").unwrap().is_empty());
    }

    #[test]
    fn test_json_feed() {
        let records = parse_json(
            r#"[{"username": " tomsmith ", "attempts": 3}, {"username": "jsmith", "attempts": 1}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["username"], "tomsmith");
        assert_eq!(records[0]["attempts"], "3");
    }

    #[test]
    fn test_json_must_be_array_of_objects() {
        assert!(parse_json(r#"{"a": 1}"#).is_err());
        assert!(parse_json(r"[1, 2]").is_err());
        assert!(parse_json("not json").is_err());
    }

    #[test]
    fn test_read_csv_missing_file() {
        let err = read_csv("/nonexistent/users.csv").unwrap_err();
        assert!(matches!(err, EnsayoError::DataFeed { .. }));
    }

    #[test]
    fn test_read_csv_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        std::fs::write(&path, "user,pw\na,1\nb,2\n").unwrap();
        assert_eq!(read_csv(&path).unwrap().len(), 2);
    }

    mod trim_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_values_never_carry_surrounding_whitespace(
                value in "[a-z0-9]{1,12}",
                left in " {0,3}",
                right in " {0,3}",
            ) {
                let csv = format!("field\n{left}{value}{right}\n");
                let records = parse_csv(&csv).unwrap();
                prop_assert_eq!(records[0]["field"].as_str(), value.as_str());
            }
        }
    }
}
