//! Per-render post-processing: crop, tone-map (or clip), composite, quantize.
//!
//! This is the transform applied to every HDR probe render before it is
//! written out as an 8-bit viewable image. It is a pure function of the
//! decoded render and the configured options; persistence stays with the
//! caller.

use image::DynamicImage;

use crate::error::{ProbeError, ProbeResult};
use crate::hdr::{AlphaMask, CropMode, HdrImage, ProbeRender};
use crate::tonemap::{ToneMapParams, ToneMapper};

#[derive(Clone, Debug)]
pub struct PostProcessor {
    crop_mode: CropMode,
    clip_only: bool,
    tonemapper: ToneMapper,
    white_background: bool,
}

impl PostProcessor {
    pub fn new(
        crop_mode: CropMode,
        clip_only: bool,
        tone: ToneMapParams,
        white_background: bool,
    ) -> ProbeResult<Self> {
        Ok(Self {
            crop_mode,
            clip_only,
            tonemapper: ToneMapper::new(tone)?,
            white_background,
        })
    }

    /// Convert one HDR render into an encodable 8-bit image.
    ///
    /// Renders without an alpha mask skip compositing entirely and come out
    /// as opaque RGB; the white-background option then has no effect.
    pub fn process(&self, render: &ProbeRender) -> ProbeResult<DynamicImage> {
        let cropped = render.crop(self.crop_mode.window())?;

        let rgb = if self.clip_only {
            cropped.color.map(|v| v.clamp(0.0, 1.0))
        } else {
            self.tonemapper.apply(&cropped.color, true, None, true).clipped
        };

        match cropped.alpha {
            Some(mut alpha) => {
                alpha.clamp_unit();
                if self.white_background {
                    let composited = composite_over_white(&rgb, &alpha)?;
                    encode_rgb8(&composited)
                } else {
                    encode_rgba8(&rgb, &alpha)
                }
            }
            None => encode_rgb8(&rgb),
        }
    }
}

/// Blend straight-alpha RGB over an all-white background:
/// `out = rgb * a + 1 * (1 - a)`.
fn composite_over_white(rgb: &HdrImage, alpha: &AlphaMask) -> ProbeResult<HdrImage> {
    let mut out = Vec::with_capacity(rgb.samples().len());
    for (px, &a) in rgb.samples().chunks_exact(3).zip(alpha.samples()) {
        for &c in px {
            out.push(c * a + (1.0 - a));
        }
    }
    HdrImage::new(rgb.width(), rgb.height(), out)
}

fn encode_rgb8(rgb: &HdrImage) -> ProbeResult<DynamicImage> {
    let data: Vec<u8> = rgb.samples().iter().map(|&v| quantize(v)).collect();
    let buf = image::RgbImage::from_raw(rgb.width(), rgb.height(), data)
        .ok_or_else(|| ProbeError::image("rgb8 buffer shape mismatch"))?;
    Ok(DynamicImage::ImageRgb8(buf))
}

fn encode_rgba8(rgb: &HdrImage, alpha: &AlphaMask) -> ProbeResult<DynamicImage> {
    let mut data = Vec::with_capacity(alpha.samples().len() * 4);
    for (px, &a) in rgb.samples().chunks_exact(3).zip(alpha.samples()) {
        data.extend(px.iter().map(|&v| quantize(v)));
        data.push(quantize(a));
    }
    let buf = image::RgbaImage::from_raw(rgb.width(), rgb.height(), data)
        .ok_or_else(|| ProbeError::image("rgba8 buffer shape mismatch"))?;
    Ok(DynamicImage::ImageRgba8(buf))
}

/// Normalized float to u8, round-to-nearest, no dithering.
fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
