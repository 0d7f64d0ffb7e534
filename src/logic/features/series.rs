//! Series building - payload → fixed-shape channel tensors
//!
//! Every payload is first reduced to a 1-D base series, then windowed to
//! `crop`, expanded into difference channels and optionally normalized.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::logic::dataset::{Payload, RawRecord};
use crate::logic::error::{PipelineError, PipelineResult};

use super::transform::TransformSpec;

/// Half-width of the uniform jitter added to augmented copies
pub const AUGMENT_JITTER: f32 = 0.02;

// ============================================================================
// BASE SERIES
// ============================================================================

/// Reduce a record's payload to a 1-D series
pub fn base_series(record: &RawRecord, raster_size: usize) -> PipelineResult<Vec<f32>> {
    let series = match &record.payload {
        Payload::Signal { samples } => {
            if samples.is_empty() {
                return Err(PipelineError::shape(&record.id, "empty signal"));
            }
            samples.clone()
        }
        Payload::Image {
            width,
            height,
            pixels,
        } => {
            let (w, h) = (*width as usize, *height as usize);
            if w == 0 || h == 0 {
                return Err(PipelineError::shape(&record.id, "image has zero size"));
            }
            if pixels.len() != w * h {
                return Err(PipelineError::shape(
                    &record.id,
                    format!("image has {} pixels, expected {}x{}", pixels.len(), w, h),
                ));
            }
            column_profile(pixels, w, h)
        }
        Payload::Stroke { x, y } => {
            if x.len() != y.len() {
                return Err(PipelineError::shape(
                    &record.id,
                    format!("stroke x/y length mismatch ({} vs {})", x.len(), y.len()),
                ));
            }
            if x.len() < 2 {
                return Err(PipelineError::shape(&record.id, "stroke needs at least 2 points"));
            }
            if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
                return Err(PipelineError::shape(&record.id, "stroke has non-finite coordinates"));
            }
            let canvas = rasterize(x, y, raster_size);
            column_profile(&canvas, raster_size, raster_size)
        }
    };

    if series.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::shape(&record.id, "series has non-finite values"));
    }
    Ok(series)
}

/// Column-wise mean intensity scaled to [0, 1]
fn column_profile(pixels: &[u8], width: usize, height: usize) -> Vec<f32> {
    (0..width)
        .map(|col| {
            let sum: u32 = (0..height).map(|row| pixels[row * width + col] as u32).sum();
            sum as f32 / (height as f32 * 255.0)
        })
        .collect()
}

// ============================================================================
// RASTERIZE
// ============================================================================

/// Draw a pen trajectory onto a black `size`×`size` canvas (row-major).
/// Coordinates are min-max scaled to the canvas; a degenerate axis maps to 0.
pub fn rasterize(x: &[f32], y: &[f32], size: usize) -> Vec<u8> {
    let mut canvas = vec![0u8; size * size];
    let max_px = (size - 1) as f32;

    let scale = |values: &[f32]| -> Vec<i64> {
        let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;
        values
            .iter()
            .map(|v| {
                if range > 0.0 {
                    (((v - min) / range) * max_px).clamp(0.0, max_px) as i64
                } else {
                    0
                }
            })
            .collect()
    };

    let xs = scale(x);
    let ys = scale(y);

    for i in 1..xs.len() {
        draw_line(&mut canvas, size, (xs[i - 1], ys[i - 1]), (xs[i], ys[i]));
    }
    canvas
}

/// Bresenham line, 1px wide, value 255
fn draw_line(canvas: &mut [u8], size: usize, from: (i64, i64), to: (i64, i64)) {
    let (mut x0, mut y0) = from;
    let (x1, y1) = to;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 >= 0 && y0 >= 0 && (x0 as usize) < size && (y0 as usize) < size {
            canvas[y0 as usize * size + x0 as usize] = 255;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

// ============================================================================
// WINDOWING
// ============================================================================

/// Cut a series into `crop`-length windows.
///
/// Short series yield one window padded with the last value. Long series
/// yield every full stride window, or just the first window without stride.
pub fn windows(series: &[f32], crop: usize, stride: Option<usize>) -> Vec<Vec<f32>> {
    if series.len() <= crop {
        let last = series.last().copied().unwrap_or(0.0);
        let mut window = series.to_vec();
        window.resize(crop, last);
        return vec![window];
    }

    match stride {
        Some(step) if step > 0 => {
            let mut out = Vec::new();
            let mut start = 0;
            while start + crop <= series.len() {
                out.push(series[start..start + crop].to_vec());
                start += step;
            }
            out
        }
        _ => vec![series[..crop].to_vec()],
    }
}

// ============================================================================
// CHANNELS
// ============================================================================

/// Channel 0 is the window; channel k is the k-th order difference,
/// front-padded with 0 to keep the window length.
pub fn derive_channels(window: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut out = Vec::with_capacity(channels);
    out.push(window.to_vec());

    for k in 1..channels {
        let prev = &out[k - 1];
        let diff: Vec<f32> = (0..prev.len())
            .map(|i| if i == 0 { 0.0 } else { prev[i] - prev[i - 1] })
            .collect();
        out.push(diff);
    }
    out
}

/// Min-max rescale in place; a constant channel maps to 0
pub fn normalize(channel: &mut [f32]) {
    let min = channel.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = channel.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    for v in channel.iter_mut() {
        *v = if range > 0.0 { (*v - min) / range } else { 0.0 };
    }
}

/// Full per-window pipeline: channels → normalize → flatten
pub fn window_tensor(window: &[f32], spec: &TransformSpec) -> Vec<f32> {
    let mut channels = derive_channels(window, spec.channels);
    if spec.normalize {
        for channel in channels.iter_mut() {
            normalize(channel);
        }
    }
    channels.into_iter().flatten().collect()
}

// ============================================================================
// AUGMENTATION
// ============================================================================

/// Seed for a record's augmented copies, stable across runs and platforms
pub fn augment_seed(pipeline_seed: u64, record_id: &str) -> u64 {
    pipeline_seed ^ (crc32fast::hash(record_id.as_bytes()) as u64).rotate_left(32)
}

/// Jittered copy of a tensor
pub fn jitter(values: &[f32], rng: &mut StdRng) -> Vec<f32> {
    values
        .iter()
        .map(|v| v + rng.gen_range(-AUGMENT_JITTER..=AUGMENT_JITTER))
        .collect()
}

pub fn augment_rng(pipeline_seed: u64, record_id: &str) -> StdRng {
    StdRng::seed_from_u64(augment_seed(pipeline_seed, record_id))
}
