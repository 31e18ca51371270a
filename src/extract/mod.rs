//! Text extraction from question photos.
//!
//! We run OCR on several preprocessed renderings of the photo and keep the
//! longest result, on the theory that a longer extraction is usually a more
//! complete one. One bad variant never aborts the others: each OCR attempt
//! yields its own `Result`, and only successful candidates are ranked. If
//! the whole pipeline comes up empty we try the original image untouched,
//! which rescues already-high-contrast scans that preprocessing degrades.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;

use crate::errors::AnswerError;
use crate::prelude::*;

pub mod preprocess;
pub mod tesseract;

pub use preprocess::VariantId;

/// Page layout hint passed to the OCR engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutHint {
    /// A single uniform block of text (tesseract `--psm 6`).
    SingleBlock,
}

impl LayoutHint {
    /// The tesseract page segmentation mode for this hint.
    pub fn psm(self) -> &'static str {
        match self {
            LayoutHint::SingleBlock => "6",
        }
    }
}

/// Interface to the OCR engine, which we treat as a black box.
#[async_trait]
pub trait Ocr: fmt::Debug + Send + Sync + 'static {
    /// Recognize text in an image. May fail; the extractor treats any
    /// failure as "no text" for that variant.
    async fn recognize(&self, image: &DynamicImage, layout: LayoutHint) -> Result<String>;
}

/// One successful OCR attempt. Never persisted beyond the extraction call.
#[derive(Debug)]
struct OcrCandidate {
    variant: VariantId,
    text: String,
}

/// Extracts question text from inbound photos.
pub struct Extractor {
    ocr: Arc<dyn Ocr>,
}

impl Extractor {
    pub fn new(ocr: Arc<dyn Ocr>) -> Self {
        Self { ocr }
    }

    /// Extract text from raw image bytes.
    ///
    /// Fails only with [`AnswerError::ExtractionEmpty`]: any internal fault
    /// (undecodable image, OCR engine missing, task panic) is logged here
    /// and surfaced to the caller as "no text".
    #[instrument(level = "debug", skip_all)]
    pub async fn extract(&self, image_bytes: Vec<u8>) -> Result<String, AnswerError> {
        match self.try_extract(image_bytes).await {
            Ok(text) if !text.is_empty() => Ok(text),
            Ok(_) => Err(AnswerError::ExtractionEmpty),
            Err(err) => {
                warn!(stage = "extract", "extraction failed: {err:#}");
                Err(AnswerError::ExtractionEmpty)
            }
        }
    }

    async fn try_extract(&self, image_bytes: Vec<u8>) -> Result<String> {
        // Preprocessing is CPU-bound, so keep it off the event-dispatch
        // threads.
        let variants =
            tokio::task::spawn_blocking(move || preprocess::prepare_variants(&image_bytes))
                .await
                .context("preprocessing task panicked")??;

        let mut best: Option<OcrCandidate> = None;
        for (variant, image) in &variants.variants {
            let candidate = match self.ocr.recognize(image, LayoutHint::SingleBlock).await {
                Ok(text) => OcrCandidate {
                    variant: *variant,
                    text,
                },
                Err(err) => {
                    warn!(variant = ?variant, "skipping failed OCR variant: {err:#}");
                    continue;
                }
            };
            // Longest candidate wins; ties go to the first one produced.
            let candidate_len = candidate.text.chars().count();
            let best_len = best
                .as_ref()
                .map(|b| b.text.chars().count())
                .unwrap_or_default();
            if best.is_none() || candidate_len > best_len {
                best = Some(candidate);
            }
        }

        if let Some(best) = &best {
            debug!(variant = ?best.variant, chars = best.text.chars().count(), "selected OCR candidate");
        }
        let text = best.map(|b| b.text).unwrap_or_default();
        if !text.trim().is_empty() {
            return Ok(text.trim().to_owned());
        }

        // Safety net: the preprocessing pipeline can degrade inputs that
        // were already clean. Try the original image as decoded.
        debug!("preprocessed variants were empty; trying the original image");
        let fallback = self
            .ocr
            .recognize(&variants.original, LayoutHint::SingleBlock)
            .await
            .unwrap_or_default();
        Ok(fallback.trim().to_owned())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// An OCR engine that replays canned results in call order.
    #[derive(Debug, Default)]
    pub struct ScriptedOcr {
        replies: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedOcr {
        pub fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl Ocr for ScriptedOcr {
        async fn recognize(
            &self,
            _image: &DynamicImage,
            _layout: LayoutHint,
        ) -> Result<String> {
            let mut replies = self.replies.lock().expect("lock poisoned");
            replies.pop_front().unwrap_or_else(|| Ok(String::new()))
        }
    }
}
