use base64::Engine as _;

use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::perception::types::ScreenSize;
use crate::sandbox::Desktop;

pub struct ScreenshotResult {
    /// Always PNG, whatever format the sandbox returned.
    pub png: Vec<u8>,
    pub size: ScreenSize,
}

/// Captures the sandbox screen. Any failure is a `CaptureFailure`.
pub async fn capture(desktop: &dyn Desktop) -> DeskBenchResult<ScreenshotResult> {
    let bytes = desktop.screenshot().await.map_err(|e| match e {
        DeskBenchError::CaptureFailure(_) => e,
        other => DeskBenchError::CaptureFailure(other.to_string()),
    })?;
    tokio::task::spawn_blocking(move || normalize(&bytes))
        .await
        .map_err(|e| DeskBenchError::CaptureFailure(format!("join: {e}")))?
}

/// Decode and re-encode as PNG so every saved step has the same format.
pub fn normalize(bytes: &[u8]) -> DeskBenchResult<ScreenshotResult> {
    if bytes.is_empty() {
        return Err(DeskBenchError::CaptureFailure("empty screenshot".into()));
    }
    let format = image::guess_format(bytes)
        .map_err(|e| DeskBenchError::CaptureFailure(format!("unknown screenshot format: {e}")))?;
    let img = image::load_from_memory(bytes)
        .map_err(|e| DeskBenchError::CaptureFailure(format!("screenshot decode: {e}")))?;
    let size = ScreenSize {
        width: img.width(),
        height: img.height(),
    };
    let png = if format == image::ImageFormat::Png {
        bytes.to_vec()
    } else {
        crate::perception::annotator::encode_png(img.to_rgba8())?
    };
    Ok(ScreenshotResult { png, size })
}

/// `data:` URI accepted by OpenAI-compatible vision endpoints.
pub fn to_data_uri(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}
