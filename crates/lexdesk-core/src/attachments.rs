use std::time::Duration;

use tracing::warn;

use crate::{
    blob::BlobStore,
    model::{AnalysisModel, ContentPart, ModelError},
};

/// Media kind inferred from a blob reference's file-name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Document,
    Image,
    Audio,
    Binary,
}

pub fn media_kind(path: &str) -> MediaKind {
    let lower = path.to_lowercase();
    if lower.ends_with(".pdf") {
        MediaKind::Document
    } else if lower.ends_with(".png")
        || lower.ends_with(".jpg")
        || lower.ends_with(".jpeg")
        || lower.ends_with(".webp")
    {
        MediaKind::Image
    } else if lower.ends_with(".mp3") || lower.ends_with(".m4a") || lower.ends_with(".wav") {
        MediaKind::Audio
    } else {
        MediaKind::Binary
    }
}

pub fn media_type(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".mp3") {
        "audio/mpeg"
    } else if lower.ends_with(".m4a") {
        "audio/mp4"
    } else if lower.ends_with(".wav") {
        "audio/wav"
    } else {
        "application/octet-stream"
    }
}

const TRANSCRIBE_INSTRUCTION: &str = "Transcreva este áudio em português brasileiro com \
fidelidade. Retorne apenas o texto transcrito, sem comentários adicionais.";

/// Verbatim transcript of a stored audio file.
pub async fn transcribe_audio(
    blobs: &dyn BlobStore,
    model: &dyn AnalysisModel,
    path: &str,
    timeout: Duration,
) -> Result<String, ModelError> {
    let bytes = blobs
        .fetch(path)
        .await
        .map_err(|e| ModelError::Transport(e.to_string()))?;
    let parts = [
        ContentPart::text(TRANSCRIBE_INSTRUCTION),
        ContentPart::Inline {
            media_type: media_type(path).to_string(),
            data: bytes,
        },
    ];
    model.generate_text(&parts, timeout).await
}

/// Converts stored case attachments into model-ready parts: audio becomes a
/// tagged transcript, documents and images become inline parts. Files are
/// processed one at a time to bound memory, and every per-file failure is
/// logged and skipped — partial context beats failing the whole stage here.
pub async fn case_parts(
    blobs: &dyn BlobStore,
    model: &dyn AnalysisModel,
    refs: &[String],
    timeout: Duration,
) -> Vec<ContentPart> {
    let mut parts = Vec::new();
    for path in refs {
        if media_kind(path) == MediaKind::Audio {
            match transcribe_audio(blobs, model, path, timeout).await {
                Ok(transcript) => {
                    parts.push(ContentPart::text(format!(
                        "[Transcrição de áudio]: {transcript}"
                    )));
                }
                Err(e) => warn!("skipping audio attachment {path}: {e}"),
            }
        } else {
            match blobs.fetch(path).await {
                Ok(data) => parts.push(ContentPart::Inline {
                    media_type: media_type(path).to_string(),
                    data,
                }),
                Err(e) => warn!("skipping attachment {path}: {e}"),
            }
        }
    }
    parts
}

/// Knowledge-context files as inline parts. Audio never carries house style
/// or precedent, so it is not fetched at all; fetch failures are skipped.
pub async fn knowledge_parts(blobs: &dyn BlobStore, refs: &[String]) -> Vec<ContentPart> {
    let mut parts = Vec::new();
    for path in refs {
        if media_kind(path) == MediaKind::Audio {
            continue;
        }
        match blobs.fetch(path).await {
            Ok(data) => parts.push(ContentPart::Inline {
                media_type: media_type(path).to_string(),
                data,
            }),
            Err(e) => warn!("skipping knowledge file {path}: {e}"),
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_from_suffix() {
        assert_eq!(media_kind("tenants/t/docs/contrato.PDF"), MediaKind::Document);
        assert_eq!(media_kind("a/b/foto.jpeg"), MediaKind::Image);
        assert_eq!(media_kind("a/b/print.webp"), MediaKind::Image);
        assert_eq!(media_kind("a/b/depoimento.m4a"), MediaKind::Audio);
        assert_eq!(media_kind("a/b/planilha.xlsx"), MediaKind::Binary);
    }

    #[test]
    fn media_type_matches_kind() {
        assert_eq!(media_type("x.pdf"), "application/pdf");
        assert_eq!(media_type("x.JPG"), "image/jpeg");
        assert_eq!(media_type("x.mp3"), "audio/mpeg");
        assert_eq!(media_type("x.wav"), "audio/wav");
        assert_eq!(media_type("x.bin"), "application/octet-stream");
    }
}
