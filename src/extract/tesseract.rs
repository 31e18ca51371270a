//! OCR engine wrapping the `tesseract` CLI tool.

use anyhow::anyhow;
use async_trait::async_trait;
use image::DynamicImage;
use tokio::process::Command;

use crate::prelude::*;

use super::{LayoutHint, Ocr};

/// OCR via the `tesseract` CLI. Each invocation gets its own temp
/// directory, so scratch images are removed on every exit path.
#[derive(Debug, Default)]
pub struct TesseractOcr {}

impl TesseractOcr {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl Ocr for TesseractOcr {
    #[instrument(level = "debug", skip_all, fields(layout = ?layout))]
    async fn recognize(&self, image: &DynamicImage, layout: LayoutHint) -> Result<String> {
        let tmpdir = tempfile::TempDir::with_prefix("snapsolve")?;
        let input_path = tmpdir.path().join("input.png");
        let output_base = tmpdir.path().join("output");
        image
            .save(&input_path)
            .context("cannot write tesseract input file")?;

        let output = Command::new("tesseract")
            .arg(&input_path)
            .arg(&output_base)
            .args(["--psm", layout.psm()])
            .output()
            .await
            .context("cannot run tesseract")?;
        if !output.status.success() {
            return Err(anyhow!(
                "tesseract failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        let text = tokio::fs::read_to_string(output_base.with_extension("txt"))
            .await
            .context("cannot read tesseract output file")?;
        Ok(text)
    }
}
