//! Document hashing and content sniffing.

pub mod hash;

pub use hash::{canonical_json, hash_json, is_sha256_hex, normalize_hash, sha256_hex};

use crate::domain::DocumentKind;

/// Classify uploaded bytes. The filename only breaks ties for empty sniffs.
pub fn detect_kind(bytes: &[u8], filename: Option<&str>) -> DocumentKind {
    if bytes.starts_with(b"%PDF-") {
        return DocumentKind::Pdf;
    }
    if serde_json::from_slice::<serde_json::Value>(bytes).is_ok() {
        return DocumentKind::Json;
    }
    match filename.and_then(|f| f.rsplit_once('.')).map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "pdf" => DocumentKind::Pdf,
        _ => DocumentKind::Binary,
    }
}
