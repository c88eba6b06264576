//! Artifact kind detection for files found on disk.
//!
//! The policy is chosen once per run: extension-only (default) or content
//! sniffing. The two are never mixed per file.

use crate::archive::config::ClassificationMode;
use crate::archive::record::{ArtifactKind, PRIMARY_EXTENSION, SUBTITLE_EXTENSION};
use crate::archive::warn::{self, WarnEvent};
use crate::error::WarnCode;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const SUBTITLE_MARKER: &str = "WEBVTT";
const LANGUAGE_HEADER: &str = "Language:";
const MAX_SNIFF_LINES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ArtifactKind,
    pub language: Option<String>,
}

impl Classification {
    fn other() -> Self {
        Self {
            kind: ArtifactKind::Other,
            language: None,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Language tag from the secondary extension (`name.en.vtt` -> `en`),
/// stripped of ASCII punctuation.
pub fn language_from_filename(path: &Path) -> Option<String> {
    let stem = Path::new(path.file_stem()?);
    let secondary = stem.extension()?.to_str()?;
    let lang: String = secondary
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    if lang.is_empty() { None } else { Some(lang) }
}

fn classify_by_extension(path: &Path) -> Classification {
    match extension_of(path).as_deref() {
        Some(PRIMARY_EXTENSION) => Classification {
            kind: ArtifactKind::Primary,
            language: None,
        },
        Some(SUBTITLE_EXTENSION) => Classification {
            kind: ArtifactKind::Subtitle,
            language: language_from_filename(path),
        },
        _ => Classification::other(),
    }
}

fn sniff_subtitle(path: &Path) -> std::io::Result<Option<Option<String>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();
    let Some(first) = lines.next().transpose()? else {
        return Ok(None);
    };
    if !first.contains(SUBTITLE_MARKER) {
        return Ok(None);
    }

    let mut language = None;
    for line in lines.take(MAX_SNIFF_LINES) {
        let line = line?;
        if let Some(idx) = line.find(LANGUAGE_HEADER) {
            let value = line[idx + LANGUAGE_HEADER.len()..]
                .split_whitespace()
                .last()
                .map(str::to_ascii_lowercase);
            if value.is_some() {
                language = value;
            }
        }
    }
    Ok(Some(language))
}

fn classify_by_content(path: &Path) -> Classification {
    let mime = mime_guess::from_path(path).first();
    if let Some(mime) = &mime {
        if mime.type_() == mime_guess::mime::VIDEO {
            return Classification {
                kind: ArtifactKind::Primary,
                language: None,
            };
        }
        if mime.type_() != mime_guess::mime::TEXT {
            return Classification::other();
        }
    }

    match sniff_subtitle(path) {
        Ok(Some(language)) => Classification {
            kind: ArtifactKind::Subtitle,
            language: language.or_else(|| language_from_filename(path)),
        },
        Ok(None) => Classification::other(),
        Err(err) => {
            warn::emit(WarnEvent {
                code: WarnCode::ClassifyFailed,
                stage: "classify",
                item: "",
                path: &path.display().to_string(),
                reason: "content-sniff-read-failed",
                err: &err.to_string(),
            });
            Classification::other()
        }
    }
}

/// Classify `path`. A subtitle whose language cannot be determined is
/// downgraded to `Other`: it has no canonical name and no index entry to patch.
pub fn classify(path: &Path, mode: ClassificationMode) -> Classification {
    let out = match mode {
        ClassificationMode::Extension => classify_by_extension(path),
        ClassificationMode::Sniff => classify_by_content(path),
    };
    if out.kind == ArtifactKind::Subtitle && out.language.is_none() {
        warn::emit(WarnEvent {
            code: WarnCode::ClassifyFailed,
            stage: "classify",
            item: "",
            path: &path.display().to_string(),
            reason: "subtitle-without-language",
            err: "",
        });
        return Classification::other();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn extension_mode_maps_known_extensions() {
        let mode = ClassificationMode::Extension;
        assert_eq!(
            classify(Path::new("/a/20230101_abcdefghijk_video.mp4"), mode).kind,
            ArtifactKind::Primary
        );
        let sub = classify(Path::new("/a/20230101_abcdefghijk.en.vtt"), mode);
        assert_eq!(sub.kind, ArtifactKind::Subtitle);
        assert_eq!(sub.language.as_deref(), Some("en"));
        assert_eq!(
            classify(Path::new("/a/20230101_abcdefghijk_video.jpg"), mode).kind,
            ArtifactKind::Other
        );
    }

    #[test]
    fn language_segment_is_stripped_of_punctuation() {
        assert_eq!(
            language_from_filename(Path::new("x_video.pt-BR.vtt")).as_deref(),
            Some("ptBR")
        );
        assert_eq!(language_from_filename(Path::new("plain.vtt")), None);
    }

    #[test]
    fn subtitle_without_language_degrades_to_other() {
        let got = classify(Path::new("/a/abcdefghijk.vtt"), ClassificationMode::Extension);
        assert_eq!(got.kind, ArtifactKind::Other);
    }

    #[test]
    fn sniff_mode_reads_webvtt_header_language() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("20230101_abcdefghijk_subs");
        fs::write(&path, "WEBVTT\nKind: captions\nLanguage: DE\n\n00:00.000 --> 00:01.000\nhallo\n")
            .expect("write");
        let got = classify(&path, ClassificationMode::Sniff);
        assert_eq!(got.kind, ArtifactKind::Subtitle);
        assert_eq!(got.language.as_deref(), Some("de"));
    }

    #[test]
    fn sniff_mode_trusts_video_mime() {
        let got = classify(Path::new("/nowhere/clip.mkv"), ClassificationMode::Sniff);
        assert_eq!(got.kind, ArtifactKind::Primary);
    }

    #[test]
    fn sniff_mode_unreadable_file_is_other() {
        let got = classify(Path::new("/nowhere/mystery-file"), ClassificationMode::Sniff);
        assert_eq!(got.kind, ArtifactKind::Other);
    }

    #[test]
    fn sniff_mode_plain_text_is_other() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "hello\n").expect("write");
        assert_eq!(
            classify(&path, ClassificationMode::Sniff).kind,
            ArtifactKind::Other
        );
    }
}
