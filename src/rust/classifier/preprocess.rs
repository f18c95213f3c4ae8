use image::imageops::FilterType;
use ndarray::Array4;

use crate::error::PipelineError;

/// Decodes an image and turns it into a `[1, height, width, 3]` tensor in `0.0..=1.0`.
///
/// The resize is an exact fit, so the aspect ratio is not preserved. Any
/// alpha channel is dropped. The encoding is sniffed from the bytes, so every
/// raster format the `image` crate was built with is accepted.
pub fn preprocess(image_bytes: &[u8], (width, height): (u32, u32)) -> Result<Array4<f32>, PipelineError> {
    if image_bytes.is_empty() {
        return Err(PipelineError::ImageDecode("image is empty".into()));
    }
    if width == 0 || height == 0 {
        return Err(PipelineError::Inference(format!(
            "invalid model input size {}x{}",
            width, height
        )));
    }

    let image = image::load_from_memory(image_bytes)?;
    let rgb = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();

    let pixels: Vec<f32> = rgb.into_raw().into_iter().map(|b| b as f32 / 255.0).collect();
    Array4::from_shape_vec((1, height as usize, width as usize, 3), pixels)
        .map_err(|e| PipelineError::Inference(format!("failed to shape input tensor: {}", e)))
}
