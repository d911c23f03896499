//! Sticker cache keys and `.tgs` payload decoding.
//!
//! Animated gift stickers are distributed as `.tgs` files: gzip-compressed
//! Lottie JSON. The cache stores the decoded JSON keyed by the sticker's
//! unique id (falling back to the file id), and those keys double as file
//! names on disk, so they are validated before use.

use std::io::Read;
use std::sync::LazyLock;

use flate2::read::GzDecoder;
use regex::Regex;

use crate::error::CoreError;

/// Maximum length of a cache key.
pub const MAX_CACHE_KEY_LEN: usize = 128;

/// Upper bound on the decompressed payload size (8 MiB).
pub const MAX_DECODED_BYTES: u64 = 8 * 1024 * 1024;

/// Mime type the platform reports for animated stickers.
pub const TGS_MIME: &str = "application/x-tgsticker";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

static CACHE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Cache keys
// ---------------------------------------------------------------------------

/// Pick the cache key for a sticker: the unique id when present, else the
/// file id. Blank identifiers count as absent.
pub fn cache_key<'a>(unique_id: Option<&'a str>, file_id: Option<&'a str>) -> Option<&'a str> {
    let non_blank = |s: &'a str| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    };
    unique_id.and_then(non_blank).or_else(|| file_id.and_then(non_blank))
}

/// Reject keys that cannot be used verbatim as file names.
pub fn validate_cache_key(key: &str) -> Result<(), CoreError> {
    if key.is_empty() || key.len() > MAX_CACHE_KEY_LEN {
        return Err(CoreError::Validation(format!(
            "sticker key must be 1..={MAX_CACHE_KEY_LEN} characters"
        )));
    }
    if !CACHE_KEY_RE.is_match(key) {
        return Err(CoreError::Validation(
            "sticker key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Map a sticker mime type to the file extension the platform uses.
pub fn extension_for_mime(mime: Option<&str>) -> &'static str {
    match mime.map(str::trim) {
        Some(TGS_MIME) => "tgs",
        Some("video/webm") => "webm",
        Some("image/webp") => "webp",
        Some("image/png") => "png",
        _ => "bin",
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Why a downloaded sticker could not be turned into an animation payload.
#[derive(Debug, thiserror::Error)]
pub enum StickerDecodeError {
    #[error("sticker source is not gzip-compressed")]
    NotGzip,

    #[error("sticker decompression failed: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("decoded sticker exceeds {MAX_DECODED_BYTES} bytes")]
    TooLarge,

    #[error("decoded sticker is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),
}

/// `true` when `raw` starts with the gzip magic bytes.
pub fn is_gzip(raw: &[u8]) -> bool {
    raw.starts_with(&GZIP_MAGIC)
}

/// Decompress a `.tgs` file and check that the result is JSON.
///
/// Returns the decoded JSON bytes unchanged so they can be served as-is.
pub fn decode_tgs(raw: &[u8]) -> Result<Vec<u8>, StickerDecodeError> {
    if !is_gzip(raw) {
        return Err(StickerDecodeError::NotGzip);
    }

    let mut decoded = Vec::new();
    GzDecoder::new(raw)
        .take(MAX_DECODED_BYTES + 1)
        .read_to_end(&mut decoded)?;

    if decoded.len() as u64 > MAX_DECODED_BYTES {
        return Err(StickerDecodeError::TooLarge);
    }

    serde_json::from_slice::<serde::de::IgnoredAny>(&decoded)?;
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn cache_key_prefers_unique_id() {
        assert_eq!(cache_key(Some("uniq"), Some("file")), Some("uniq"));
        assert_eq!(cache_key(None, Some("file")), Some("file"));
        assert_eq!(cache_key(Some("  "), Some(" file ")), Some("file"));
        assert_eq!(cache_key(None, None), None);
        assert_eq!(cache_key(Some(""), Some("")), None);
    }

    #[test]
    fn validate_cache_key_rejects_path_characters() {
        assert!(validate_cache_key("AgADBAADr6cxG-abc_123").is_ok());
        assert!(validate_cache_key("../etc/passwd").is_err());
        assert!(validate_cache_key("a b").is_err());
        assert!(validate_cache_key("").is_err());
        assert!(validate_cache_key(&"x".repeat(MAX_CACHE_KEY_LEN + 1)).is_err());
        assert!(validate_cache_key(&"x".repeat(MAX_CACHE_KEY_LEN)).is_ok());
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(extension_for_mime(Some(TGS_MIME)), "tgs");
        assert_eq!(extension_for_mime(Some("video/webm")), "webm");
        assert_eq!(extension_for_mime(Some("text/plain")), "bin");
        assert_eq!(extension_for_mime(None), "bin");
    }

    #[test]
    fn decode_valid_tgs() {
        let json = br#"{"v":"5.5.2","fr":60,"layers":[]}"#;
        let decoded = decode_tgs(&gzip(json)).unwrap();
        assert_eq!(decoded, json);
    }

    #[test]
    fn decode_rejects_plain_json() {
        let err = decode_tgs(br#"{"v":"5.5.2"}"#).unwrap_err();
        assert!(matches!(err, StickerDecodeError::NotGzip));
    }

    #[test]
    fn decode_rejects_non_json_payload() {
        let err = decode_tgs(&gzip(b"not json at all")).unwrap_err();
        assert!(matches!(err, StickerDecodeError::NotJson(_)));
    }

    #[test]
    fn decode_rejects_truncated_gzip() {
        let mut raw = gzip(br#"{"layers":[1,2,3,4,5,6,7,8,9]}"#);
        raw.truncate(raw.len() / 2);
        assert!(decode_tgs(&raw).is_err());
    }
}
