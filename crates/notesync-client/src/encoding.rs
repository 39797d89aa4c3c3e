//! Document id encoding for URL paths.
//!
//! Document ids are opaque strings chosen by the backend and may contain
//! characters that are unsafe in a URL path segment (`/`, `+`, unicode).
//! They are therefore passed whole, base64url-encoded without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode a document id using base64url without padding.
///
/// # Examples
///
/// ```
/// use notesync_client::encode_doc_id;
///
/// let encoded = encode_doc_id("workspace/42/notebook");
/// assert!(!encoded.contains('='));  // No padding
/// assert!(!encoded.contains('+'));  // No standard base64 chars
/// assert!(!encoded.contains('/'));
/// ```
#[must_use]
pub fn encode_doc_id(doc_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(doc_id.as_bytes())
}

/// Decode a base64url-encoded document id.
///
/// # Errors
///
/// Returns error if the input is not valid base64url or not UTF-8.
///
/// # Examples
///
/// ```
/// use notesync_client::{decode_doc_id, encode_doc_id};
///
/// let original = "workspace/42/notebook";
/// let encoded = encode_doc_id(original);
/// assert_eq!(decode_doc_id(&encoded).unwrap(), original);
/// ```
pub fn decode_doc_id(encoded: &str) -> Result<String, EncodingError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| EncodingError::Base64Decode(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| EncodingError::Utf8Decode(e.to_string()))
}

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EncodingError {
    /// Base64 decoding failed
    #[error("base64 decode error: {0}")]
    Base64Decode(String),
    /// UTF-8 decoding failed
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(String),
}
