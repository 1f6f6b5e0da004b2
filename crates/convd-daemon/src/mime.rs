// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content types for served artifacts.

/// Content type for an artifact filename, derived from its extension.
///
/// Unknown or missing extensions fall back to `application/octet-stream`.
pub fn get_mimetype(filename: Option<&str>) -> String {
    match filename {
        Some(name) => mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        None => "application/octet-stream".to_string(),
    }
}
