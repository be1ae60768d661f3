//! Correlation identifier resolution.
//!
//! Inbound ids are reused verbatim when usable; otherwise a time-sortable
//! UUIDv7 is generated.

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::error::CorrelationError;

/// Where a request's correlation id came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSource {
    /// Taken from the inbound header.
    Inbound,
    /// No header (or an empty one) was sent.
    Generated,
    /// The header was present but unusable.
    Fallback(CorrelationError),
}

/// Generate a fresh, time-sortable identifier.
pub fn generate() -> String {
    Uuid::now_v7().to_string()
}

/// Validate a raw header value for reuse.
pub fn parse_inbound(raw: &[u8], max_length: usize) -> Result<Option<String>, CorrelationError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if raw.len() > max_length {
        return Err(CorrelationError::TooLong {
            len: raw.len(),
            max: max_length,
        });
    }
    if !raw.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        return Err(CorrelationError::NotVisibleAscii);
    }
    // Checked ASCII above.
    Ok(Some(String::from_utf8_lossy(raw).into_owned()))
}

/// Resolve the id for one request from its headers.
pub fn resolve(headers: &HeaderMap, header_name: &str, max_length: usize) -> (String, IdSource) {
    let Some(value) = headers.get(header_name) else {
        return (generate(), IdSource::Generated);
    };

    match parse_inbound(value.as_bytes(), max_length) {
        Ok(Some(id)) => (id, IdSource::Inbound),
        Ok(None) => (generate(), IdSource::Generated),
        Err(error) => (generate(), IdSource::Fallback(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::collections::HashSet;

    #[test]
    fn reuses_inbound_value_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static("abc123"));

        let (id, source) = resolve(&headers, "X-Correlation-Id", 128);
        assert_eq!(id, "abc123");
        assert_eq!(source, IdSource::Inbound);
    }

    #[test]
    fn empty_header_generates() {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static(""));

        let (id, source) = resolve(&headers, "X-Correlation-Id", 128);
        assert!(!id.is_empty());
        assert_eq!(source, IdSource::Generated);
    }

    #[test]
    fn oversized_header_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static("0123456789"));

        let (id, source) = resolve(&headers, "x-correlation-id", 4);
        assert_ne!(id, "0123456789");
        assert_eq!(source, IdSource::Fallback(CorrelationError::TooLong { len: 10, max: 4 }));
    }

    #[test]
    fn opaque_bytes_fall_back() {
        assert_eq!(
            parse_inbound(&[0x61, 0xff, 0x62], 128),
            Err(CorrelationError::NotVisibleAscii)
        );
    }

    #[test]
    fn generated_ids_are_unique_and_sortable() {
        let ids: Vec<String> = (0..1_000).map(|_| generate()).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        // Ordering is by millisecond timestamp; ids a few ms apart must sort.
        let mut spaced = Vec::new();
        for _ in 0..5 {
            spaced.push(generate());
            std::thread::sleep(std::time::Duration::from_millis(3));
        }
        let mut sorted = spaced.clone();
        sorted.sort();
        assert_eq!(sorted, spaced);
    }
}
