//! Speech recognition with diarization via the media gateway.

use crate::catalog::FileRecord;
use crate::digest::digester::{DigestContext, DigestOutput, Digester};
use crate::digest::text_source::SPEECH_RECOGNITION;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Extensions treated as audio even when the guessed MIME type disagrees
/// (`.webm` voice notes report video/webm).
pub const AUDIO_EXTENSIONS: &[&str] =
    &["mp3", "wav", "m4a", "ogg", "oga", "opus", "flac", "webm", "aac"];

fn is_audio(file: &FileRecord) -> bool {
    if file.is_folder || file.size == 0 {
        return false;
    }

    if file
        .mime_type
        .as_deref()
        .is_some_and(|mime| mime.starts_with("audio/"))
    {
        return true;
    }

    Path::new(&file.path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct SpeechDigester;

#[async_trait]
impl Digester for SpeechDigester {
    fn name(&self) -> &'static str {
        SPEECH_RECOGNITION
    }

    fn label(&self) -> &'static str {
        "Speech recognition"
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        Ok(ctx.deps.media.is_some() && is_audio(ctx.file))
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(media) = ctx.deps.media.as_ref() else {
            return Ok(Vec::new());
        };
        let bytes = ctx.read_file().await?;

        let transcript = media.transcribe(&ctx.file.name, &bytes).await?;
        if transcript.transcript.trim().is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!(
            path = %ctx.file.path,
            segments = transcript.segments.len(),
            "audio transcribed"
        );

        let content = serde_json::to_string(&transcript)
            .map_err(|error| anyhow::anyhow!("failed to serialize transcript: {error}"))?;
        Ok(vec![
            DigestOutput::completed(SPEECH_RECOGNITION).with_content(content),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn file(path: &str, mime: Option<&str>) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            is_folder: false,
            size: 2048,
            mime_type: mime.map(str::to_string),
            content_hash: None,
            modified_at: None,
            created_at: NaiveDateTime::default(),
            last_scanned_at: None,
            preview: None,
            screenshot_key: None,
        }
    }

    #[test]
    fn webm_voice_notes_count_as_audio() {
        assert!(is_audio(&file("inbox/voice.webm", Some("video/webm"))));
        assert!(is_audio(&file("inbox/memo.mp3", Some("audio/mpeg"))));
        assert!(is_audio(&file("inbox/memo.unknownext", Some("audio/x-custom"))));
        assert!(!is_audio(&file("inbox/movie.mp4", Some("video/mp4"))));
        assert!(!is_audio(&file("inbox/note.txt", Some("text/plain"))));
    }
}
