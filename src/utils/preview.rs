// In-memory preview references for selected images
//
// The preview is a display-only data URL handed back to the client; nothing is
// persisted.

use base64::{engine::general_purpose, Engine};

/// Lowercased extension of a filename, if it has one.
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Build a `data:` URL for the selected image bytes.
pub fn preview_data_url(filename: &str, bytes: &[u8]) -> String {
    let mime = match file_extension(filename).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}
