//! DNS-SD TXT record payloads
//!
//! A TXT payload is a sequence of length-prefixed strings, each of the form
//! `key=value` or a bare `key` (RFC 6763 section 6). Decoding is lenient:
//! anything that cannot be read yields an empty property map rather than an
//! error, so a broken advertisement still produces a service entry.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Longest string a single length byte can describe
const MAX_ENTRY_LEN: usize = u8::MAX as usize;

/// Incrementally builds a TXT payload
#[derive(Debug, Default, Clone)]
pub struct TxtRecordBuilder {
    buf: BytesMut,
}

impl TxtRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `key=value` entry
    pub fn pair(mut self, key: &str, value: impl AsRef<[u8]>) -> Self {
        let value = value.as_ref();
        let len = key.len() + 1 + value.len();
        if self.fits(key, len) {
            self.buf.put_u8(len as u8);
            self.buf.put_slice(key.as_bytes());
            self.buf.put_u8(b'=');
            self.buf.put_slice(value);
        }
        self
    }

    /// Appends a bare `key` entry (a boolean attribute with no value)
    pub fn flag(mut self, key: &str) -> Self {
        if self.fits(key, key.len()) {
            self.buf.put_u8(key.len() as u8);
            self.buf.put_slice(key.as_bytes());
        }
        self
    }

    pub fn build(self) -> Bytes {
        self.buf.freeze()
    }

    fn fits(&self, key: &str, len: usize) -> bool {
        if key.is_empty() {
            warn!("Skipping TXT entry with an empty key");
            return false;
        }
        if len > MAX_ENTRY_LEN {
            warn!(key = key, len = len, "Skipping oversized TXT entry");
            return false;
        }
        true
    }
}

/// Encodes `key=value` pairs into a TXT payload
pub fn encode_pairs<I, K, V>(pairs: I) -> Bytes
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    pairs
        .into_iter()
        .fold(TxtRecordBuilder::new(), |builder, (key, value)| {
            builder.pair(key.as_ref(), value)
        })
        .build()
}

/// Decodes a TXT payload into a property map.
///
/// - duplicate keys: the last entry wins
/// - a bare `key` maps to the empty string
/// - entries with an empty key and zero-length strings are skipped
/// - an absent payload, or one whose length prefixes overrun the buffer,
///   yields an empty map
pub fn parse_properties(payload: Option<&[u8]>) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    let Some(mut rest) = payload else {
        return properties;
    };

    while let Some((&len, tail)) = rest.split_first() {
        let len = len as usize;
        if len > tail.len() {
            debug!(
                declared = len,
                remaining = tail.len(),
                "Malformed TXT payload, ignoring all properties"
            );
            return HashMap::new();
        }

        let (entry, next) = tail.split_at(len);
        rest = next;

        if entry.is_empty() {
            continue;
        }

        let (key, value) = match entry.iter().position(|&b| b == b'=') {
            Some(eq) => (&entry[..eq], &entry[eq + 1..]),
            None => (entry, &[][..]),
        };

        if key.is_empty() {
            continue;
        }

        properties.insert(
            String::from_utf8_lossy(key).into_owned(),
            String::from_utf8_lossy(value).into_owned(),
        );
    }

    properties
}
