use serde::de::DeserializeOwned;

use crate::error::DecodeError;

/// Decode a newline-delimited JSON body into records.
///
/// Blank lines are skipped. A body holding a single JSON array is read as the
/// array's records whether it sits on one line or is pretty-printed, and a
/// lone pretty-printed object is read as one record. Any malformed record,
/// invalid UTF-8 included, fails the whole body; partial results are never
/// returned.
pub fn decode_ndjson<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>, DecodeError> {
    let document = trim_ascii(body);
    if document.is_empty() {
        return Ok(Vec::new());
    }

    if document.first() == Some(&b'[') {
        if let Ok(records) = serde_json::from_slice::<Vec<T>>(document) {
            return Ok(records);
        }
    }

    match decode_lines(body) {
        Ok(records) => Ok(records),
        // Pretty-printed single objects span several lines
        Err(line_error) => serde_json::from_slice::<T>(document).map(|record| vec![record]).map_err(|_| line_error),
    }
}

fn decode_lines<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>, DecodeError> {
    body.split(|byte| *byte == b'\n')
        .enumerate()
        .map(|(index, line)| (index + 1, trim_ascii(line)))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line, record)| serde_json::from_slice(record).map_err(|source| DecodeError::InvalidRecord { line, source }))
        .collect()
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Decode a single JSON document
pub fn decode_document<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::EmptyBody);
    }
    serde_json::from_slice(body).map_err(DecodeError::InvalidDocument)
}
