//! Preview classification and size formatting for listing entries

use serde::Serialize;

const IMAGE_EXTS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".ico"];
const VIDEO_EXTS: &[&str] = &[".mp4", ".webm", ".ogg", ".avi", ".mov", ".wmv", ".flv", ".mkv"];
const AUDIO_EXTS: &[&str] = &[".mp3", ".wav", ".ogg", ".m4a", ".aac", ".flac", ".wma"];
const DOCUMENT_EXTS: &[&str] = &[".pdf", ".txt", ".md", ".html", ".htm", ".xml", ".json", ".csv"];
const CODE_EXTS: &[&str] = &[".js", ".py", ".java", ".cpp", ".c", ".css", ".php", ".rb", ".go", ".rs", ".ts"];

/// How the front end should render an entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewType {
    Image,
    Video,
    Audio,
    Pdf,
    Text,
    Code,
    Download,
}

impl PreviewType {
    /// Icon hint paired with the preview type
    pub fn icon_class(&self) -> &'static str {
        match self {
            PreviewType::Image => "image",
            PreviewType::Video => "video",
            PreviewType::Audio => "audio",
            PreviewType::Pdf => "pdf",
            PreviewType::Text => "document",
            PreviewType::Code => "code",
            PreviewType::Download => "file",
        }
    }
}

/// Preview fields attached to every directory entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PreviewInfo {
    pub preview_type: PreviewType,
    pub icon_class: &'static str,
    pub extension: String,
    pub can_preview: bool,
}

/// Classify a file by extension, falling back to its content type.
///
/// Tiers are checked in order: image, video, audio, pdf, text, code.
/// Anything else is a plain download.
pub fn classify(filename: &str, content_type: Option<&str>) -> PreviewInfo {
    let extension = extension_of(filename);
    let ext = extension.as_str();
    let has_prefix = |prefix: &str| content_type.is_some_and(|ct| ct.starts_with(prefix));

    let preview_type = if IMAGE_EXTS.contains(&ext) || has_prefix("image/") {
        PreviewType::Image
    } else if VIDEO_EXTS.contains(&ext) || has_prefix("video/") {
        PreviewType::Video
    } else if AUDIO_EXTS.contains(&ext) || has_prefix("audio/") {
        PreviewType::Audio
    } else if ext == ".pdf" || content_type == Some("application/pdf") {
        PreviewType::Pdf
    } else if DOCUMENT_EXTS.contains(&ext) || has_prefix("text/") {
        PreviewType::Text
    } else if CODE_EXTS.contains(&ext) {
        PreviewType::Code
    } else {
        PreviewType::Download
    };

    PreviewInfo {
        preview_type,
        icon_class: preview_type.icon_class(),
        can_preview: preview_type != PreviewType::Download,
        extension,
    }
}

/// Lowercased extension including the dot, or "" when there is none.
///
/// Leading dots of the final path segment do not start an extension, so
/// ".bashrc" has none.
pub fn extension_of(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem_start = base.len() - base.trim_start_matches('.').len();
    match base[stem_start..].rfind('.') {
        Some(idx) => base[stem_start + idx..].to_lowercase(),
        None => String::new(),
    }
}

/// MIME type guessed from a file name
pub fn guess_mime(filename: &str) -> Option<String> {
    mime_guess::from_path(filename)
        .first_raw()
        .map(|mime| mime.to_string())
}

/// Preferred file extension (with dot) for a content type, or ""
pub fn extension_for_mime(content_type: &str) -> String {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    mime_guess::get_mime_extensions_str(essence)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// Leading bytes examined by [`sniff_mime`]
const SNIFF_LEN: usize = 1024;

/// MIME type detected from the leading bytes of a file's content.
///
/// Recognizes common image, audio, video, document and archive signatures.
/// Anything else is `text/plain` when it decodes as UTF-8 without NULs,
/// else `application/octet-stream`.
pub fn sniff_mime(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(SNIFF_LEN)];
    let riff_kind = || (head.starts_with(b"RIFF") && head.len() >= 12).then(|| &head[8..12]);

    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        "image/gif"
    } else if riff_kind() == Some(b"WEBP".as_slice()) {
        "image/webp"
    } else if riff_kind() == Some(b"WAVE".as_slice()) {
        "audio/wav"
    } else if head.starts_with(b"%PDF-") {
        "application/pdf"
    } else if head.len() >= 8 && &head[4..8] == b"ftyp" {
        "video/mp4"
    } else if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        "video/webm"
    } else if head.starts_with(b"OggS") {
        "audio/ogg"
    } else if head.starts_with(b"ID3") || head.starts_with(&[0xFF, 0xFB]) {
        "audio/mpeg"
    } else if head.starts_with(b"PK\x03\x04") {
        "application/zip"
    } else if head.starts_with(&[0x1F, 0x8B]) {
        "application/gzip"
    } else if looks_like_html(head) {
        "text/html"
    } else if is_text(head) {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

fn looks_like_html(head: &[u8]) -> bool {
    let start = head.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(head.len());
    let lead = &head[start..head.len().min(start + 14)];
    lead.eq_ignore_ascii_case(b"<!doctype html")
        || lead.get(..5).is_some_and(|l| l.eq_ignore_ascii_case(b"<html"))
}

fn is_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte character cut off by the sniff window
        Err(e) => e.error_len().is_none(),
    }
}

/// Human-readable size with one decimal above bytes.
///
/// Values just under a unit boundary round up inside the lower unit
/// (1048575 formats as "1024.0 KB").
pub fn format_size(size_bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    match size_bytes {
        0 => "0 B".to_string(),
        n if n < KB => format!("{} B", n),
        n if n < MB => format!("{:.1} KB", n as f64 / KB as f64),
        n if n < GB => format!("{:.1} MB", n as f64 / MB as f64),
        n => format!("{:.1} GB", n as f64 / GB as f64),
    }
}
