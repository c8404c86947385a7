use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use image::{GenericImageView, ImageFormat};

use crate::models::{ClueKind, FileContents, SourceFile};

const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("ogv", "video/ogg"),
];

const AUDIO_TYPES: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("opus", "audio/opus"),
];

/// Media type a file declares through its extension, if any is recognised.
pub fn declared_media_type(path: &Path) -> Option<String> {
    if let Ok(format) = ImageFormat::from_path(path) {
        return Some(format.to_mime_type().to_string());
    }

    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    VIDEO_TYPES
        .iter()
        .chain(AUDIO_TYPES)
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| (*mime).to_string())
}

pub fn matches_kind(media_type: Option<&str>, kind: ClueKind) -> bool {
    media_type.is_some_and(|mime| mime.starts_with(kind.media_prefix()))
}

/// Upload surface a declared media type belongs to.
pub fn kind_of(media_type: Option<&str>) -> Option<ClueKind> {
    ClueKind::ALL
        .into_iter()
        .find(|kind| matches_kind(media_type, *kind))
}

/// Extensions offered by the file picker for a given upload surface.
pub fn picker_extensions(kind: ClueKind) -> Vec<&'static str> {
    match kind {
        ClueKind::Image => vec!["jpg", "jpeg", "png", "gif", "webp", "bmp"],
        ClueKind::Video => VIDEO_TYPES.iter().map(|(ext, _)| *ext).collect(),
        ClueKind::Audio => AUDIO_TYPES.iter().map(|(ext, _)| *ext).collect(),
    }
}

/// Describes a picked file without reading its contents.
pub fn source_file(path: PathBuf) -> Result<SourceFile> {
    let metadata =
        fs::metadata(&path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SourceFile {
        name,
        size: metadata.len(),
        media_type: declared_media_type(&path),
        contents: FileContents::OnDisk(path),
    })
}

/// Files dropped onto the window come with a path, or only with their bytes.
pub fn dropped_source(
    name: &str,
    path: Option<PathBuf>,
    bytes: Option<Arc<[u8]>>,
) -> Result<SourceFile> {
    if let Some(path) = path {
        return source_file(path);
    }
    let Some(bytes) = bytes else {
        bail!("Dropped file {name} has no readable contents");
    };
    Ok(SourceFile {
        name: name.to_string(),
        size: bytes.len() as u64,
        media_type: declared_media_type(Path::new(name)),
        contents: FileContents::InMemory(bytes),
    })
}

#[derive(Clone)]
pub struct DecodedImageData {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

/// Decodes an image clue for preview, shrinking it to fit `max_dimension`.
pub fn decode_preview(bytes: &[u8], max_dimension: u32) -> Option<DecodedImageData> {
    let mut decoded = image::load_from_memory(bytes).ok()?;
    let (width, height) = decoded.dimensions();
    if width.max(height) > max_dimension {
        decoded = decoded.resize(
            max_dimension,
            max_dimension,
            image::imageops::FilterType::Triangle,
        );
    }
    let rgba = decoded.to_rgba8();
    Some(DecodedImageData {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn extensions_map_to_media_types() {
        assert_eq!(
            declared_media_type(Path::new("clue.PNG")).as_deref(),
            Some("image/png")
        );
        assert_eq!(
            declared_media_type(Path::new("clip.webm")).as_deref(),
            Some("video/webm")
        );
        assert_eq!(
            declared_media_type(Path::new("voice.mp3")).as_deref(),
            Some("audio/mpeg")
        );
        assert_eq!(declared_media_type(Path::new("notes.txt")), None);
        assert_eq!(declared_media_type(Path::new("no_extension")), None);
    }

    #[test]
    fn kind_check_uses_the_top_level_type() {
        assert!(matches_kind(Some("image/jpeg"), ClueKind::Image));
        assert!(!matches_kind(Some("image/jpeg"), ClueKind::Video));
        assert!(!matches_kind(None, ClueKind::Audio));
    }

    #[test]
    fn picked_files_are_described_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, [0u8; 12]).unwrap();

        let file = source_file(path.clone()).unwrap();
        assert_eq!(file.name, "clip.mp4");
        assert_eq!(file.size, 12);
        assert_eq!(file.media_type.as_deref(), Some("video/mp4"));
        assert_eq!(file.contents, FileContents::OnDisk(path));

        assert!(source_file(dir.path().join("missing.png")).is_err());
    }

    #[test]
    fn dropped_bytes_are_kept_in_memory() {
        let bytes: Arc<[u8]> = Arc::from(vec![1u8, 2, 3]);
        let file = dropped_source("hum.ogg", None, Some(Arc::clone(&bytes))).unwrap();
        assert_eq!(file.size, 3);
        assert_eq!(file.media_type.as_deref(), Some("audio/ogg"));
        assert_eq!(kind_of(file.media_type.as_deref()), Some(ClueKind::Audio));
        assert_eq!(file.contents, FileContents::InMemory(bytes));

        assert!(dropped_source("ghost.png", None, None).is_err());
        assert_eq!(kind_of(declared_media_type(Path::new("a.txt")).as_deref()), None);
    }

    #[test]
    fn previews_are_shrunk_to_the_bounding_box() {
        let img = image::RgbaImage::from_pixel(40, 20, image::Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let preview = decode_preview(&bytes, 10).unwrap();
        assert_eq!((preview.width, preview.height), (10, 5));
        assert_eq!(preview.rgba.len(), 10 * 5 * 4);
        assert!(decode_preview(b"not an image", 10).is_none());
    }
}
