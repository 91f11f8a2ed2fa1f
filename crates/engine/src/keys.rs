//! Blob storage key naming for micro-batch records.
//!
//! The format is `"{number zero-padded}/{fromTimestamp}/{short fingerprint}.json"`.
//! The padding and fingerprint widths are fixed constants shared between
//! writers and readers, so keys sort by micro-batch number.

use tidemark_primitives::Buf32;

/// Zero-padding width of the micro-batch number component.
pub const KEY_NUMBER_PAD_WIDTH: usize = 12;

/// Hex characters of fingerprint carried in the key.
pub const KEY_FINGERPRINT_HEX_LEN: usize = 12;

const KEY_SUFFIX: &str = ".json";

/// Builds the storage key for a micro-batch record.
pub fn micro_batch_key(number: u64, from_timestamp: u64, fingerprint: &Buf32) -> String {
    format!(
        "{number:0width$}/{from_timestamp}/{fp}{KEY_SUFFIX}",
        width = KEY_NUMBER_PAD_WIDTH,
        fp = fingerprint.short_hex(KEY_FINGERPRINT_HEX_LEN / 2),
    )
}

/// Components recovered from a well-formed micro-batch key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyParts {
    pub number: u64,
    pub from_timestamp: u64,
    pub fingerprint_hex: String,
}

/// Parses a storage key, returning `None` if it doesn't match the format.
pub fn parse_key(key: &str) -> Option<KeyParts> {
    let rest = key.strip_suffix(KEY_SUFFIX)?;
    let mut parts = rest.split('/');

    let number_part = parts.next()?;
    if number_part.len() != KEY_NUMBER_PAD_WIDTH {
        return None;
    }
    let number = number_part.parse().ok()?;

    let from_timestamp = parts.next()?.parse().ok()?;

    let fp_part = parts.next()?;
    if fp_part.len() != KEY_FINGERPRINT_HEX_LEN
        || !fp_part.chars().all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }

    if parts.next().is_some() {
        return None;
    }

    Some(KeyParts {
        number,
        from_timestamp,
        fingerprint_hex: fp_part.to_owned(),
    })
}
