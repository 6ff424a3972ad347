//! Image OCR via the media gateway. Output is plain text, not JSON.

use crate::digest::digester::{DigestContext, DigestOutput, Digester};
use crate::digest::text_source::IMAGE_OCR;
use crate::error::Result;
use async_trait::async_trait;

pub struct ImageOcrDigester;

#[async_trait]
impl Digester for ImageOcrDigester {
    fn name(&self) -> &'static str {
        IMAGE_OCR
    }

    fn label(&self) -> &'static str {
        "Image OCR"
    }

    async fn applies(&self, ctx: &DigestContext<'_>) -> Result<bool> {
        let is_image = ctx
            .file
            .mime_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("image/"));

        Ok(ctx.deps.media.is_some() && !ctx.file.is_folder && ctx.file.size > 0 && is_image)
    }

    async fn run(&self, ctx: &DigestContext<'_>) -> Result<Vec<DigestOutput>> {
        let Some(media) = ctx.deps.media.as_ref() else {
            return Ok(Vec::new());
        };
        let bytes = ctx.read_file().await?;

        let text = media.image_ocr(&ctx.file.name, &bytes).await?;
        if text.trim().is_empty() {
            // Nothing legible in the image.
            return Ok(Vec::new());
        }

        Ok(vec![DigestOutput::completed(IMAGE_OCR).with_content(text)])
    }
}
