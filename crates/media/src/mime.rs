//! Media-kind detection from a locator and an optional declared MIME type.

/// Kind of media, driving the upload encoding on the target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "aac"];

/// Classify `locator` into a [`MediaKind`].
///
/// Any recognised path suffix wins, image before video before audio. The
/// declared MIME type's top-level category is only consulted when no suffix is
/// recognised. Anything else is a generic file.
pub fn classify(locator: &str, declared_mime: Option<&str>) -> MediaKind {
    let candidates: Vec<String> = suffixes(locator)
        .into_iter()
        .map(str::to_ascii_lowercase)
        .collect();
    let groups = [
        (IMAGE_EXTENSIONS, MediaKind::Image),
        (VIDEO_EXTENSIONS, MediaKind::Video),
        (AUDIO_EXTENSIONS, MediaKind::Audio),
    ];
    for (group, kind) in groups {
        if candidates.iter().any(|ext| group.contains(&ext.as_str())) {
            return kind;
        }
    }

    match declared_mime.map(|m| m.trim().to_ascii_lowercase()) {
        Some(m) if m.starts_with("image/") => MediaKind::Image,
        Some(m) if m.starts_with("video/") => MediaKind::Video,
        Some(m) if m.starts_with("audio/") => MediaKind::Audio,
        _ => MediaKind::File,
    }
}

/// File extension of `locator`, lower-cased, or `bin` when there is none.
///
/// Used only to name transient and uploaded files.
pub fn extension(locator: &str) -> String {
    suffixes(locator)
        .first()
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Alphanumeric runs that follow a dot and end at `?` or end of input, in
/// order of appearance.
fn suffixes(locator: &str) -> Vec<&str> {
    let bytes = locator.as_bytes();
    let mut found = Vec::new();
    for (dot, _) in locator.match_indices('.') {
        let start = dot + 1;
        let len = bytes[start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        let end = start + len;
        if len > 0 && (end == bytes.len() || bytes[end] == b'?') {
            found.push(&locator[start..end]);
        }
    }
    found
}
