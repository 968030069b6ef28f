//! Type MIME d'un fichier média d'après son extension.

use std::path::Path;

pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Extension (insensible à la casse) -> type MIME ; `video/mp4` par défaut
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
