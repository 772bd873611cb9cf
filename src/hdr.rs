//! HDR image model for probe renders.
//!
//! Linear-light samples are kept as interleaved `f32`. Color and alpha are
//! separate types rather than a channel-count convention: an EXR with an
//! alpha channel decodes to a [`ProbeRender`] with `alpha: Some(..)`, a plain
//! RGB EXR to `alpha: None`. Downstream code never inspects a channel count.

use std::path::Path;

use anyhow::Context as _;

use crate::error::{ProbeError, ProbeResult};

/// HDR RGB image, interleaved `f32`, `len == width * height * 3`.
#[derive(Clone, Debug, PartialEq)]
pub struct HdrImage {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl HdrImage {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> ProbeResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| ProbeError::image("image size overflow"))?;
        if data.len() != expected {
            return Err(ProbeError::image(format!(
                "rgb buffer length {} does not match {}x{}x3",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    /// Element-wise map over all samples.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn crop(&self, window: CropWindow) -> ProbeResult<Self> {
        let data = crop_plane(&self.data, self.width, self.height, 3, window)?;
        Ok(Self {
            width: window.width,
            height: window.height,
            data,
        })
    }
}

/// Per-pixel opacity plane, `len == width * height`.
#[derive(Clone, Debug, PartialEq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl AlphaMask {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> ProbeResult<Self> {
        if data.len() != (width as usize) * (height as usize) {
            return Err(ProbeError::image(format!(
                "alpha buffer length {} does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    /// Clamp opacity into [0, 1] in place. Renders can carry slightly
    /// out-of-range coverage values.
    pub fn clamp_unit(&mut self) {
        for a in &mut self.data {
            *a = a.clamp(0.0, 1.0);
        }
    }

    pub fn crop(&self, window: CropWindow) -> ProbeResult<Self> {
        let data = crop_plane(&self.data, self.width, self.height, 1, window)?;
        Ok(Self {
            width: window.width,
            height: window.height,
            data,
        })
    }
}

/// One decoded probe render: HDR color plus optional coverage.
#[derive(Clone, Debug)]
pub struct ProbeRender {
    pub color: HdrImage,
    pub alpha: Option<AlphaMask>,
}

impl ProbeRender {
    pub fn crop(&self, window: CropWindow) -> ProbeResult<Self> {
        Ok(Self {
            color: self.color.crop(window)?,
            alpha: self.alpha.as_ref().map(|a| a.crop(window)).transpose()?,
        })
    }
}

/// Fixed rectangular crop, in pixels from the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropWindow {
    pub top: u32,
    pub left: u32,
    pub height: u32,
    pub width: u32,
}

/// Which fixed window to cut out of the rendered frame. The sphere sits at a
/// known position for each camera setup, so the windows are constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropMode {
    Front,
    Standard,
}

impl CropMode {
    pub fn window(self) -> CropWindow {
        match self {
            CropMode::Front => CropWindow {
                top: 128,
                left: 338,
                height: 284,
                width: 284,
            },
            CropMode::Standard => CropWindow {
                top: 130,
                left: 340,
                height: 280,
                width: 280,
            },
        }
    }
}

fn crop_plane(
    data: &[f32],
    width: u32,
    height: u32,
    channels: usize,
    window: CropWindow,
) -> ProbeResult<Vec<f32>> {
    let right = window
        .left
        .checked_add(window.width)
        .filter(|&r| r <= width);
    let bottom = window
        .top
        .checked_add(window.height)
        .filter(|&b| b <= height);
    if right.is_none() || bottom.is_none() {
        return Err(ProbeError::image(format!(
            "crop window {}x{}+{}+{} exceeds image bounds {}x{}",
            window.width, window.height, window.left, window.top, width, height
        )));
    }

    let row_stride = width as usize * channels;
    let mut out = Vec::with_capacity(window.width as usize * window.height as usize * channels);
    for row in window.top..window.top + window.height {
        let start = row as usize * row_stride + window.left as usize * channels;
        let end = start + window.width as usize * channels;
        out.extend_from_slice(&data[start..end]);
    }
    Ok(out)
}

/// Decode one HDR render from disk.
///
/// Whether the result carries an alpha mask is decided here, once, from the
/// decoded color type.
pub fn load_exr(path: &Path) -> ProbeResult<ProbeRender> {
    let dyn_img =
        image::open(path).with_context(|| format!("open hdr render '{}'", path.display()))?;

    if dyn_img.color().has_alpha() {
        let rgba = dyn_img.to_rgba32f();
        let (width, height) = rgba.dimensions();
        let raw = rgba.into_raw();

        let pixels = width as usize * height as usize;
        let mut color = Vec::with_capacity(pixels * 3);
        let mut alpha = Vec::with_capacity(pixels);
        for px in raw.chunks_exact(4) {
            color.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }

        Ok(ProbeRender {
            color: HdrImage::new(width, height, color)?,
            alpha: Some(AlphaMask::new(width, height, alpha)?),
        })
    } else {
        let rgb = dyn_img.to_rgb32f();
        let (width, height) = rgb.dimensions();
        Ok(ProbeRender {
            color: HdrImage::new(width, height, rgb.into_raw())?,
            alpha: None,
        })
    }
}

/// Write a finished 8-bit image as PNG, creating parent directories.
pub fn save_png(path: &Path, img: &image::DynamicImage) -> ProbeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}
