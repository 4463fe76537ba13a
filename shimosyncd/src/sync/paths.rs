use std::path::{Path, PathBuf};

const ILLEGAL_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
const REPLACEMENT: char = '-';

/// Extension that gets converted to markdown after download.
pub const CONVERTIBLE_EXTENSION: &str = "docx";

/// Makes a remote display name usable as a single path component.
/// Names made only of dots would resolve to the current or parent
/// directory, so every dot is replaced.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if ILLEGAL_CHARS.contains(&c) { REPLACEMENT } else { c })
        .collect();
    if !cleaned.is_empty() && cleaned.chars().all(|c| c == '.') {
        return cleaned.chars().map(|_| REPLACEMENT).collect();
    }
    cleaned
}

/// Maps a remote document type to the extension it is exported as.
/// `None` marks the type as unsupported.
pub fn extension_for_type(item_type: &str) -> Option<&'static str> {
    match item_type {
        "docx" => Some("docx"),
        "doc" => Some("doc"),
        "pptx" => Some("pptx"),
        "ppt" => Some("ppt"),
        "pdf" => Some("pdf"),
        "newdoc" | "document" | "modoc" => Some("docx"),
        "sheet" | "mosheet" | "spreadsheet" | "table" => Some("xlsx"),
        "slide" | "presentation" => Some("pptx"),
        "mindmap" => Some("xmind"),
        _ => None,
    }
}

/// Uploaded office files are served as-is and need no export round-trip.
pub fn is_direct_download_type(item_type: &str) -> bool {
    matches!(item_type, "docx" | "doc" | "pptx" | "ppt" | "pdf")
}

pub fn is_convertible(ext: &str) -> bool {
    ext == CONVERTIBLE_EXTENSION
}

/// Path of `base/file_name` relative to `root`. Falls back to the bare file
/// name when `base` lives outside `root`.
pub fn relative_to_root(root: &Path, base: &Path, file_name: &str) -> PathBuf {
    match base.strip_prefix(root) {
        Ok(relative) => relative.join(file_name),
        Err(_) => PathBuf::from(file_name),
    }
}
