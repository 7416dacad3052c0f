//! Storage key generation and display-name recovery.
//!
//! Keys have the shape `<base>-<millis>-<random><ext>`: the uploader's file
//! stem, a millisecond timestamp, a random integer below one billion, and the
//! original extension. Keys stay readable in the bucket while making
//! collisions between concurrent uploads of the same name very unlikely.

use chrono::Utc;
use rand::Rng;

/// Separator between the base name and the generated suffix parts.
pub const SEPARATOR: char = '-';

/// Exclusive upper bound of the random suffix component.
const RANDOM_BOUND: u32 = 1_000_000_000;

/// Base used when the uploaded name has no usable stem.
const FALLBACK_BASE: &str = "file";

/// Longest key S3 accepts, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Stand-in for control characters in client-supplied names.
const REPLACEMENT: char = '_';

/// Derive a fresh storage key for `original_name` using the current time and
/// a random value.
pub fn encode(original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let random = rand::rng().random_range(0..RANDOM_BOUND);
    encode_with(original_name, millis, random)
}

/// Deterministic core of [`encode`].
///
/// Control characters become `_` and the base is shortened so the key never
/// exceeds [`MAX_KEY_LEN`] bytes. The extension is kept intact unless it
/// alone would take more than half of the room left after the suffix.
pub fn encode_with(original_name: &str, millis: i64, random: u32) -> String {
    let name = sanitize(file_name(original_name));
    let (base, ext) = split_extension(&name);
    let base = if base.is_empty() { FALLBACK_BASE } else { base };

    let suffix = format!("{SEPARATOR}{millis}{SEPARATOR}{random}");
    let room = MAX_KEY_LEN.saturating_sub(suffix.len());
    let ext = truncate(ext, room / 2);
    let base = truncate(base, room - ext.len());
    format!("{base}{suffix}{ext}")
}

/// Best-effort reconstruction of the uploader's filename from a storage key.
///
/// Returns the key unchanged when it contains no separator.
pub fn decode(key: &str) -> String {
    let (stem, ext) = split_extension(key);
    let parts: Vec<&str> = stem.split(SEPARATOR).collect();
    if parts.len() < 2 {
        return key.to_string();
    }

    // A full generated suffix is two numeric segments; anything else only
    // gives up its last segment.
    let n = parts.len();
    let suffix_len = if n > 2 && is_numeric(parts[n - 1]) && is_numeric(parts[n - 2]) {
        2
    } else {
        1
    };

    let base = parts[..n - suffix_len].join(&SEPARATOR.to_string());
    format!("{base}{ext}")
}

/// Extension of `name` including the leading dot, lowercased. Empty when
/// there is none.
pub fn extension(name: &str) -> String {
    split_extension(file_name(name)).1.to_ascii_lowercase()
}

/// Last path component of a client-supplied name.
fn file_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Split into `(stem, ext)` where `ext` keeps its leading dot. A dot at
/// position zero marks a hidden file, not an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_control() { REPLACEMENT } else { c })
        .collect()
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}
