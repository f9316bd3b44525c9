//! Opaque pagination cursors.
//!
//! A cursor is the base64url encoding (no padding) of the ASCII decimal
//! result offset. This is the only externally stable format in the crate;
//! changing it breaks clients holding cursors across a deploy.

use crate::ValidationError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Encode a result offset.
pub fn encode(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(offset.to_string())
}

/// Decode a cursor into a result offset. Absent or blank means offset 0.
pub fn decode(cursor: Option<&str>) -> Result<usize, ValidationError> {
    let cursor = match cursor.map(str::trim) {
        None | Some("") => return Ok(0),
        Some(cursor) => cursor,
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim_end_matches('='))
        .map_err(|_| ValidationError::Cursor)?;
    let text = std::str::from_utf8(&bytes).map_err(|_| ValidationError::Cursor)?;
    // a negative offset fails here as well
    text.parse::<usize>().map_err(|_| ValidationError::Cursor)
}
