//! JSON, JSONL and CSV file readers feeding the record normalizer.

use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::records::RawRecord;

async fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::InvalidInput(format!(
            "file not found: {}",
            path.display()
        )));
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::InvalidInput(format!("failed to read {}: {e}", path.display())))
}

/// `.jsonl` files hold one object per line; anything else must be a JSON array.
pub async fn read_json_records(path: &Path) -> Result<Vec<RawRecord>> {
    let contents = read_file(path).await?;
    let is_jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));
    let records = if is_jsonl {
        parse_jsonl(&contents)?
    } else {
        parse_json_array(&contents)?
    };
    tracing::debug!(path = %path.display(), records = records.len(), "json file read");
    Ok(records)
}

fn parse_jsonl(contents: &str) -> Result<Vec<RawRecord>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Value>(line)
                .map(RawRecord::from_value)
                .map_err(|e| Error::InvalidInput(format!("line {}: invalid JSON: {e}", n + 1)))
        })
        .collect()
}

fn parse_json_array(contents: &str) -> Result<Vec<RawRecord>> {
    match serde_json::from_str::<Value>(contents) {
        Ok(Value::Array(items)) => Ok(items.into_iter().map(RawRecord::from_value).collect()),
        Ok(_) => Err(Error::InvalidInput(
            "JSON file must contain an array of objects".into(),
        )),
        Err(e) => Err(Error::InvalidInput(format!("invalid JSON: {e}"))),
    }
}

/// Read a CSV file with a header row.
pub async fn read_csv_records(path: &Path, delimiter: u8) -> Result<Vec<RawRecord>> {
    let contents = read_file(path).await?;
    let records = parse_csv(&contents, delimiter)?;
    tracing::debug!(path = %path.display(), records = records.len(), "csv file read");
    Ok(records)
}

fn parse_csv(contents: &str, delimiter: u8) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| Error::InvalidInput(format!("invalid CSV header: {e}")))?
        .clone();

    // Ragged rows keep the cells they have; a row that cannot be read is rejected later.
    Ok(reader
        .records()
        .map(|row| match row {
            Ok(row) => RawRecord::csv(headers.iter(), row.iter()),
            Err(e) => RawRecord::unreadable_csv(format!("invalid CSV row: {e}")),
        })
        .collect())
}

/// Parse a delimiter argument: exactly one ASCII character, or `\t`.
pub fn parse_delimiter(delimiter: &str) -> Result<u8> {
    match delimiter {
        "\\t" | "\t" => Ok(b'\t'),
        d if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
        other => Err(Error::InvalidInput(format!(
            "CSV delimiter must be a single ASCII character, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RawKind;

    #[test]
    fn jsonl_skips_blank_lines() {
        let records = parse_jsonl("{\"id\": 1}\n\n{\"id\": 2}\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].fields["id"], 2);
    }

    #[test]
    fn jsonl_reports_bad_line_number() {
        let err = parse_jsonl("{\"id\": 1}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn json_must_be_array() {
        assert!(parse_json_array("{\"id\": 1}").is_err());
        assert_eq!(parse_json_array("[{\"id\": 1}, 5]").unwrap().len(), 2);
    }

    #[test]
    fn csv_rows_become_string_fields() {
        let records = parse_csv("id;text;price\na;hello;3.5\nb;world;4\n", b';').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, RawKind::Csv);
        assert_eq!(records[0].fields["price"], "3.5");
        assert_eq!(records[1].fields["text"], "world");
    }

    #[test]
    fn ragged_csv_rows_keep_their_cells() {
        let records = parse_csv("id,text,lang\na,hello\nb,world,en,extra\n", b',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields.len(), 2);
        assert!(!records[0].fields.contains_key("lang"));
        assert_eq!(records[1].fields["lang"], "en");
        assert!(records.iter().all(|r| r.unreadable.is_none()));
    }

    #[test]
    fn delimiter_parsing() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert!(parse_delimiter("::").is_err());
    }
}
