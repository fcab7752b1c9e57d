use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::foundation::error::{TalkieError, TalkieResult};

/// A fetched media resource, either in memory (remote downloads) or as a
/// filesystem path (local inputs).
pub(crate) enum MediaPayload {
    Memory(Vec<u8>),
    File(PathBuf),
}

impl MediaPayload {
    /// Resource bytes, reading from disk for file-backed payloads.
    pub(crate) fn bytes(&self) -> TalkieResult<Vec<u8>> {
        match self {
            Self::Memory(bytes) => Ok(bytes.clone()),
            Self::File(path) => std::fs::read(path).map_err(|e| {
                TalkieError::media_load(format!("failed to read '{}': {e}", path.display()))
            }),
        }
    }

    /// A seekable path for the resource, spooling in-memory payloads to a
    /// temp file. `ffmpeg`/`ffprobe` address inputs by path, so video clips
    /// always go through here. The returned guard (if any) removes the temp
    /// file when dropped and must outlive all decode calls against the path.
    pub(crate) fn into_path(self) -> TalkieResult<(PathBuf, Option<tempfile::NamedTempFile>)> {
        match self {
            Self::File(path) => Ok((path, None)),
            Self::Memory(bytes) => {
                let mut tmp = tempfile::NamedTempFile::new().map_err(|e| {
                    TalkieError::media_load(format!("failed to create media temp file: {e}"))
                })?;
                tmp.write_all(&bytes).map_err(|e| {
                    TalkieError::media_load(format!("failed to spool media to temp file: {e}"))
                })?;
                Ok((tmp.path().to_path_buf(), Some(tmp)))
            }
        }
    }
}

/// Resolve a segment's media reference into a payload.
///
/// `http(s)` URLs are downloaded with a blocking client; `file://` prefixes
/// are stripped; anything else is treated as a filesystem path. Any failure
/// is a [`TalkieError::MediaLoad`].
pub(crate) fn fetch_media(url: &str) -> TalkieResult<MediaPayload> {
    let url = url.trim();
    if url.is_empty() {
        return Err(TalkieError::media_load("media url is empty"));
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        let response = reqwest::blocking::get(url)
            .map_err(|e| TalkieError::media_load(format!("failed to fetch '{url}': {e}")))?
            .error_for_status()
            .map_err(|e| TalkieError::media_load(format!("failed to fetch '{url}': {e}")))?;
        let bytes = response
            .bytes()
            .map_err(|e| TalkieError::media_load(format!("failed to read body of '{url}': {e}")))?;
        return Ok(MediaPayload::Memory(bytes.to_vec()));
    }

    let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
    if !path.exists() {
        return Err(TalkieError::media_load(format!(
            "media file '{}' does not exist",
            path.display()
        )));
    }
    Ok(MediaPayload::File(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn fetch_media_rejects_empty_and_missing() {
        assert!(matches!(
            fetch_media("  "),
            Err(TalkieError::MediaLoad(_))
        ));
        assert!(matches!(
            fetch_media("/definitely/not/here.png"),
            Err(TalkieError::MediaLoad(_))
        ));
    }

    #[test]
    fn fetch_media_reads_local_files_with_and_without_scheme() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"pixels").unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let payload = fetch_media(&path).unwrap();
        assert_eq!(payload.bytes().unwrap(), b"pixels");

        let payload = fetch_media(&format!("file://{path}")).unwrap();
        assert_eq!(payload.bytes().unwrap(), b"pixels");
    }

    #[test]
    fn memory_payload_spools_to_a_seekable_path() {
        let payload = MediaPayload::Memory(b"clip bytes".to_vec());
        let (path, guard) = payload.into_path().unwrap();
        assert!(guard.is_some());
        assert_eq!(std::fs::read(&path).unwrap(), b"clip bytes");
    }
}
