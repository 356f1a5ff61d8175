//! Bulk record input with encoding and format auto-detection.
//!
//! Accepts the three bulk formats clients submit: CSV (header row names the
//! attributes), JSON lines (one record object per line), and a single JSON
//! array of record objects. Rows become [`RawRecord`]s; per-record parse
//! failures are yielded as malformed items so one bad line never kills a
//! batch.

use serde_json::{Map, Value};

use crate::error::{RecordError, RecordResult};

/// Reserved record fields that name the record rather than describe it.
pub const RESERVED_FIELDS: &[&str] = &["DATA_SOURCE", "RECORD_ID", "ENTITY_TYPE", "LOAD_ID"];

/// Whether a field is reserved (case-insensitive).
pub fn is_reserved_field(name: &str) -> bool {
    RESERVED_FIELDS
        .iter()
        .any(|f| f.eq_ignore_ascii_case(name.trim()))
}

// =============================================================================
// Raw Record
// =============================================================================

/// One record as submitted, before classification.
///
/// Holds the ordered attribute map plus the record's 1-based position in
/// the stream. Transient: exists only while the stream is consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    position: usize,
    attributes: Map<String, Value>,
}

impl RawRecord {
    pub fn new(position: usize, attributes: Map<String, Value>) -> Self {
        Self {
            position,
            attributes,
        }
    }

    /// 1-based position in the input stream.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The full ordered field map, reserved fields included.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Explicit data source code, if the record carries one.
    pub fn data_source(&self) -> Option<&str> {
        self.reserved_str("DATA_SOURCE")
    }

    /// Explicit record id, if the record carries one. Numbers stringify.
    pub fn record_id(&self) -> Option<String> {
        let value = self.reserved_value("RECORD_ID")?;
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Explicit entity type, if the record carries one.
    pub fn entity_type(&self) -> Option<&str> {
        self.reserved_str("ENTITY_TYPE")
    }

    /// Iterate the non-reserved attribute names, in arrival order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .keys()
            .map(String::as_str)
            .filter(|name| !is_reserved_field(name))
    }

    /// Whether the record has any non-reserved attribute at all.
    pub fn has_attributes(&self) -> bool {
        self.attribute_names().next().is_some()
    }

    fn reserved_value(&self, field: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(field))
            .map(|(_, value)| value)
    }

    fn reserved_str(&self, field: &str) -> Option<&str> {
        self.reserved_value(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// =============================================================================
// Encoding & Format Detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
pub fn decode_content(bytes: &[u8], encoding: &str) -> RecordResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .or_else(|_| Ok(String::from_utf8_lossy(bytes).to_string())),
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.to_string())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string()),
        _ => {
            // Fallback: try UTF-8 with lossy conversion
            Ok(String::from_utf8_lossy(bytes).to_string())
        }
    }
    .map_err(|e: std::string::FromUtf8Error| RecordError::Encoding(e.to_string()))
}

/// The bulk formats a submission may arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkFormat {
    Csv,
    JsonLines,
    JsonArray,
}

impl BulkFormat {
    /// Stable name for responses and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::JsonLines => "JSON_LINES",
            Self::JsonArray => "JSON_ARRAY",
        }
    }
}

/// Sniff the bulk format from the first significant character.
pub fn detect_format(content: &str) -> BulkFormat {
    match content.trim_start().chars().next() {
        Some('[') => BulkFormat::JsonArray,
        Some('{') => BulkFormat::JsonLines,
        _ => BulkFormat::Csv,
    }
}

/// Detect the CSV delimiter by counting occurrences in the first line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

// =============================================================================
// Parsed Batch
// =============================================================================

/// A decoded bulk submission plus detection metadata.
///
/// The records themselves are not materialized here; [`ParsedBatch::records`]
/// yields them one at a time so analysis and load both stream.
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    /// Detected bulk format.
    pub format: BulkFormat,
    /// Detected or used encoding.
    pub encoding: String,
    /// Detected delimiter (CSV only).
    pub delimiter: Option<char>,
    /// Column headers (CSV only).
    pub headers: Vec<String>,
    content: String,
}

impl ParsedBatch {
    /// Iterate the batch as raw records.
    pub fn records(&self) -> RecordIter<'_> {
        match self.format {
            BulkFormat::Csv => RecordIter::csv(
                &self.content,
                self.headers.clone(),
                self.delimiter.unwrap_or(','),
            ),
            BulkFormat::JsonLines => RecordIter::json_lines(&self.content),
            BulkFormat::JsonArray => RecordIter::json_array(&self.content),
        }
    }
}

/// Decode bytes and sniff their bulk format.
///
/// Fails only for input that yields no records at all (empty body, CSV
/// without headers, an unreadable JSON array). Individual bad rows are
/// reported later, per record, by the iterator.
pub fn parse_bytes_auto(bytes: &[u8]) -> RecordResult<ParsedBatch> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;

    if content.trim().is_empty() {
        return Err(RecordError::EmptyInput);
    }

    let format = detect_format(&content);
    let (delimiter, headers) = match format {
        BulkFormat::Csv => {
            let delimiter = detect_delimiter(&content);
            let header_line = content.lines().next().ok_or(RecordError::EmptyInput)?;
            let headers: Vec<String> = header_line
                .split(delimiter)
                .map(|s| s.trim().trim_matches('"').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if headers.is_empty() {
                return Err(RecordError::NoHeaders);
            }
            (Some(delimiter), headers)
        }
        BulkFormat::JsonArray => {
            // An unreadable array yields nothing; reject it up front.
            serde_json::from_str::<Value>(&content)
                .map_err(|e| RecordError::Malformed {
                    line: 1,
                    message: format!("Invalid JSON array: {}", e),
                })?
                .as_array()
                .ok_or_else(|| RecordError::Malformed {
                    line: 1,
                    message: "Expected a JSON array of records".to_string(),
                })?;
            (None, Vec::new())
        }
        BulkFormat::JsonLines => (None, Vec::new()),
    };

    Ok(ParsedBatch {
        format,
        encoding,
        delimiter,
        headers,
        content,
    })
}

// =============================================================================
// Record Iterator
// =============================================================================

/// Streaming iterator over the records of one parsed batch.
///
/// Yields `Err(RecordError::Malformed)` for rows that fail to parse and
/// keeps going; fatal stream errors end iteration.
pub struct RecordIter<'a> {
    kind: IterKind<'a>,
}

enum IterKind<'a> {
    Csv {
        lines: std::str::Lines<'a>,
        headers: Vec<String>,
        delimiter: char,
        position: usize,
    },
    JsonLines {
        lines: std::str::Lines<'a>,
        line: usize,
        position: usize,
    },
    JsonArray {
        values: std::vec::IntoIter<Value>,
        position: usize,
    },
}

impl<'a> RecordIter<'a> {
    fn csv(content: &'a str, headers: Vec<String>, delimiter: char) -> Self {
        let mut lines = content.lines();
        lines.next(); // header row
        Self {
            kind: IterKind::Csv {
                lines,
                headers,
                delimiter,
                position: 0,
            },
        }
    }

    fn json_lines(content: &'a str) -> Self {
        Self {
            kind: IterKind::JsonLines {
                lines: content.lines(),
                line: 0,
                position: 0,
            },
        }
    }

    fn json_array(content: &'a str) -> Self {
        let values = serde_json::from_str::<Value>(content)
            .ok()
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        Self {
            kind: IterKind::JsonArray {
                values: values.into_iter(),
                position: 0,
            },
        }
    }
}

impl Iterator for RecordIter<'_> {
    type Item = RecordResult<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.kind {
            IterKind::Csv {
                lines,
                headers,
                delimiter,
                position,
            } => {
                for raw in lines.by_ref() {
                    if raw.trim().is_empty() {
                        continue;
                    }
                    *position += 1;
                    let values: Vec<&str> = raw.split(*delimiter).collect();
                    let mut attributes = Map::new();
                    for (i, header) in headers.iter().enumerate() {
                        let cell = values
                            .get(i)
                            .map(|s| s.trim().trim_matches('"'))
                            .unwrap_or("");
                        // Empty cells mean "attribute absent"
                        if !cell.is_empty() {
                            attributes.insert(header.clone(), Value::String(cell.to_string()));
                        }
                    }
                    return Some(Ok(RawRecord::new(*position, attributes)));
                }
                None
            }
            IterKind::JsonLines {
                lines,
                line,
                position,
            } => {
                for raw in lines.by_ref() {
                    *line += 1;
                    if raw.trim().is_empty() {
                        continue;
                    }
                    *position += 1;
                    let parsed = match serde_json::from_str::<Value>(raw) {
                        Ok(value) => value,
                        Err(e) => {
                            return Some(Err(RecordError::Malformed {
                                line: *line,
                                message: format!("Invalid JSON: {}", e),
                            }))
                        }
                    };
                    return Some(match parsed {
                        Value::Object(attributes) => Ok(RawRecord::new(*position, attributes)),
                        _ => Err(RecordError::Malformed {
                            line: *line,
                            message: "Expected a JSON object".to_string(),
                        }),
                    });
                }
                None
            }
            IterKind::JsonArray { values, position } => {
                let value = values.next()?;
                *position += 1;
                Some(match value {
                    Value::Object(attributes) => Ok(RawRecord::new(*position, attributes)),
                    _ => Err(RecordError::Malformed {
                        line: *position,
                        message: "Expected a JSON object".to_string(),
                    }),
                })
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(batch: &ParsedBatch) -> Vec<RecordResult<RawRecord>> {
        batch.records().collect()
    }

    #[test]
    fn test_csv_batch() {
        let csv = "DATA_SOURCE,RECORD_ID,NAME_FULL\nCUSTOMERS,1,Alice\nCUSTOMERS,2,Bob";
        let batch = parse_bytes_auto(csv.as_bytes()).unwrap();

        assert_eq!(batch.format, BulkFormat::Csv);
        assert_eq!(batch.delimiter, Some(','));
        assert_eq!(batch.headers, vec!["DATA_SOURCE", "RECORD_ID", "NAME_FULL"]);

        let records = collect(&batch);
        assert_eq!(records.len(), 2);
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.data_source(), Some("CUSTOMERS"));
        assert_eq!(first.record_id().as_deref(), Some("1"));
        assert_eq!(first.fields()["NAME_FULL"], "Alice");
    }

    #[test]
    fn test_csv_semicolon_delimiter() {
        let csv = "DATA_SOURCE;NAME_FULL\nCUSTOMERS;Alice";
        let batch = parse_bytes_auto(csv.as_bytes()).unwrap();
        assert_eq!(batch.delimiter, Some(';'));
        assert_eq!(collect(&batch).len(), 1);
    }

    #[test]
    fn test_csv_empty_cells_are_absent() {
        let csv = "DATA_SOURCE,NAME_FULL,PHONE_NUMBER\nCUSTOMERS,Alice,";
        let batch = parse_bytes_auto(csv.as_bytes()).unwrap();
        let records = collect(&batch);
        let record = records[0].as_ref().unwrap();
        assert!(record.fields().get("PHONE_NUMBER").is_none());
        assert!(record.has_attributes());
    }

    #[test]
    fn test_csv_empty_lines_skipped() {
        let csv = "A,B\n1,2\n\n3,4\n";
        let batch = parse_bytes_auto(csv.as_bytes()).unwrap();
        assert_eq!(collect(&batch).len(), 2);
    }

    #[test]
    fn test_json_lines_batch() {
        let input = r#"{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":"1","NAME_FULL":"Alice"}
{"DATA_SOURCE":"CUSTOMERS","RECORD_ID":2,"PHONE_NUMBER":"555-1212"}"#;
        let batch = parse_bytes_auto(input.as_bytes()).unwrap();
        assert_eq!(batch.format, BulkFormat::JsonLines);

        let records = collect(&batch);
        assert_eq!(records.len(), 2);
        // Numeric record ids stringify
        assert_eq!(records[1].as_ref().unwrap().record_id().as_deref(), Some("2"));
    }

    #[test]
    fn test_json_lines_bad_line_is_local() {
        let input = "{\"NAME_FULL\":\"Alice\"}\nnot json at all {{{\n{\"NAME_FULL\":\"Bob\"}";
        let batch = parse_bytes_auto(input.as_bytes()).unwrap();
        let records = collect(&batch);
        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(matches!(
            records[1],
            Err(RecordError::Malformed { line: 2, .. })
        ));
        assert!(records[2].is_ok());
    }

    #[test]
    fn test_json_array_batch() {
        let input = json!([
            { "DATA_SOURCE": "CUSTOMERS", "NAME_FULL": "Alice" },
            { "DATA_SOURCE": "CUSTOMERS", "NAME_FULL": "Bob" }
        ])
        .to_string();
        let batch = parse_bytes_auto(input.as_bytes()).unwrap();
        assert_eq!(batch.format, BulkFormat::JsonArray);
        assert_eq!(collect(&batch).len(), 2);
    }

    #[test]
    fn test_json_array_invalid_rejected() {
        let result = parse_bytes_auto(b"[ this is not json ]");
        assert!(matches!(result, Err(RecordError::Malformed { .. })));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            parse_bytes_auto(b"   \n  "),
            Err(RecordError::EmptyInput)
        ));
    }

    #[test]
    fn test_reserved_fields() {
        assert!(is_reserved_field("DATA_SOURCE"));
        assert!(is_reserved_field("record_id"));
        assert!(!is_reserved_field("NAME_FULL"));

        let mut attributes = Map::new();
        attributes.insert("DATA_SOURCE".into(), json!("CUSTOMERS"));
        attributes.insert("NAME_FULL".into(), json!("Alice"));
        let record = RawRecord::new(1, attributes);
        let names: Vec<&str> = record.attribute_names().collect();
        assert_eq!(names, vec!["NAME_FULL"]);
    }

    #[test]
    fn test_record_without_attributes() {
        let mut attributes = Map::new();
        attributes.insert("DATA_SOURCE".into(), json!("CUSTOMERS"));
        attributes.insert("RECORD_ID".into(), json!("9"));
        let record = RawRecord::new(1, attributes);
        assert!(!record.has_attributes());
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("a,b\n1,2"), BulkFormat::Csv);
        assert_eq!(detect_format("  {\"a\":1}"), BulkFormat::JsonLines);
        assert_eq!(detect_format("\n[{\"a\":1}]"), BulkFormat::JsonArray);
    }

    #[test]
    fn test_parse_from_file() {
        // Same path the CLI takes: bytes off disk, format sniffed
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.jsonl");
        std::fs::write(&path, "{\"DATA_SOURCE\":\"CUSTOMERS\",\"NAME_FULL\":\"Alice\"}\n").unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let batch = parse_bytes_auto(&bytes).unwrap();
        assert_eq!(batch.format, BulkFormat::JsonLines);
        assert_eq!(collect(&batch).len(), 1);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert!(decoded.contains("Soci"));
    }
}
