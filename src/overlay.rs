use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, DynamicImage, RgbImage, RgbaImage};
use mugrs_vision::FaceLandmarks;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accessory {
    Sunglasses,
    Hat,
    Mustache,
}

impl Accessory {
    pub const ALL: [Accessory; 3] = [Accessory::Sunglasses, Accessory::Hat, Accessory::Mustache];

    /// Asset file name inside the assets directory.
    pub fn asset_name(self) -> &'static str {
        match self {
            Accessory::Sunglasses => "sunglasses.png",
            Accessory::Hat => "hat.png",
            Accessory::Mustache => "mustache.png",
        }
    }
}

/// Which accessories are switched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoryToggles {
    pub sunglasses: bool,
    pub hat: bool,
    pub mustache: bool,
}

impl Default for AccessoryToggles {
    fn default() -> Self {
        Self {
            sunglasses: true,
            hat: true,
            mustache: true,
        }
    }
}

impl AccessoryToggles {
    pub fn is_on(&self, accessory: Accessory) -> bool {
        match accessory {
            Accessory::Sunglasses => self.sunglasses,
            Accessory::Hat => self.hat,
            Accessory::Mustache => self.mustache,
        }
    }

    pub fn set(&mut self, accessory: Accessory, on: bool) {
        match accessory {
            Accessory::Sunglasses => self.sunglasses = on,
            Accessory::Hat => self.hat = on,
            Accessory::Mustache => self.mustache = on,
        }
    }

    /// Flip one toggle and return its new value.
    pub fn toggle(&mut self, accessory: Accessory) -> bool {
        let on = !self.is_on(accessory);
        self.set(accessory, on);
        on
    }
}

/// Axis-aligned rectangle in image pixels. Not clamped to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub accessory: Accessory,
    pub rect: Rect,
}

/// Where each enabled accessory goes for this face.
///
/// Nothing is placed unless both eyes and the nose are present. Placements
/// come out in drawing order: sunglasses, hat, mustache.
pub fn compose(landmarks: &FaceLandmarks, toggles: &AccessoryToggles) -> Vec<Placement> {
    let Some((left_eye, right_eye, nose)) = landmarks.complete() else {
        return Vec::new();
    };

    let center_x = (left_eye.x + right_eye.x) / 2.0;
    let d = (right_eye.x - left_eye.x).abs();

    Accessory::ALL
        .into_iter()
        .filter(|a| toggles.is_on(*a))
        .map(|accessory| {
            let rect = match accessory {
                Accessory::Sunglasses => Rect {
                    left: center_x - d,
                    top: left_eye.y - 20.0,
                    width: d * 2.0,
                    height: d * 0.7,
                },
                Accessory::Hat => Rect {
                    left: center_x - d,
                    top: left_eye.y - d * 1.5,
                    width: d * 2.5,
                    height: d * 1.2,
                },
                Accessory::Mustache => Rect {
                    left: center_x - d * 0.7,
                    top: nose.y + 5.0,
                    width: d * 1.4,
                    height: d * 0.4,
                },
            };
            Placement { accessory, rect }
        })
        .collect()
}

/// Accessory artwork, drawn over camera frames.
pub struct OverlayRenderer {
    sunglasses: RgbaImage,
    hat: RgbaImage,
    mustache: RgbaImage,
}

impl OverlayRenderer {
    pub fn new(sunglasses: RgbaImage, hat: RgbaImage, mustache: RgbaImage) -> Self {
        Self {
            sunglasses,
            hat,
            mustache,
        }
    }

    pub fn load(assets_dir: &Path) -> Result<Self> {
        let load = |a: Accessory| -> Result<RgbaImage> {
            let path = assets_dir.join(a.asset_name());
            Ok(image::open(&path)
                .with_context(|| format!("loading accessory {}", path.display()))?
                .to_rgba8())
        };
        Ok(Self::new(
            load(Accessory::Sunglasses)?,
            load(Accessory::Hat)?,
            load(Accessory::Mustache)?,
        ))
    }

    fn asset(&self, accessory: Accessory) -> &RgbaImage {
        match accessory {
            Accessory::Sunglasses => &self.sunglasses,
            Accessory::Hat => &self.hat,
            Accessory::Mustache => &self.mustache,
        }
    }

    /// Draw every placement onto a copy of `frame`.
    pub fn render(&self, frame: &RgbImage, placements: &[Placement]) -> RgbImage {
        let mut canvas = DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
        for p in placements {
            let asset = self.asset(p.accessory);
            let Some((w, h, x, y)) = contain(asset.width(), asset.height(), &p.rect) else {
                log::debug!("skipping {:?}: placement too small", p.accessory);
                continue;
            };
            let scaled = imageops::resize(asset, w, h, imageops::FilterType::Triangle);
            imageops::overlay(&mut canvas, &scaled, x, y);
        }
        DynamicImage::ImageRgba8(canvas).to_rgb8()
    }
}

/// Fit an asset inside `rect` keeping its aspect ratio, centred.
/// Returns the scaled size and top-left corner, or `None` below one pixel.
fn contain(asset_w: u32, asset_h: u32, rect: &Rect) -> Option<(u32, u32, i64, i64)> {
    if asset_w == 0 || asset_h == 0 {
        return None;
    }
    let scale = (rect.width / asset_w as f32).min(rect.height / asset_h as f32);
    let w = (asset_w as f32 * scale).round();
    let h = (asset_h as f32 * scale).round();
    if !(w >= 1.0 && h >= 1.0) {
        return None;
    }
    let x = rect.left + (rect.width - w) / 2.0;
    let y = rect.top + (rect.height - h) / 2.0;
    Some((w as u32, h as u32, x.round() as i64, y.round() as i64))
}
