//! Equirectangular radiance images, shared by environment reflections and the
//! sky backdrop.

use super::{fetch_bytes, AssetError, AssetLocator};
use image::imageops::FilterType;
use image::DynamicImage;
use rayon::prelude::*;

/// Wider sources are downscaled before upload.
pub const MAX_ENVIRONMENT_WIDTH: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct RadianceLevel {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

/// Linear RGBA radiance with a box-filtered mip chain. Higher levels stand in
/// for rougher reflections.
#[derive(Debug, Clone, PartialEq)]
pub struct RadianceMap {
    pub name: String,
    pub levels: Vec<RadianceLevel>,
}

impl RadianceMap {
    pub fn from_texels(name: impl Into<String>, width: u32, height: u32, texels: Vec<[f32; 4]>) -> Self {
        let mut levels = vec![RadianceLevel {
            width: width.max(1),
            height: height.max(1),
            texels,
        }];
        while let Some(last) = levels.last() {
            if last.width == 1 && last.height == 1 {
                break;
            }
            // Halve until 1x1; the last level stands in for diffuse irradiance.
            let next = downsample(last);
            levels.push(next);
        }
        Self {
            name: name.into(),
            levels,
        }
    }

    pub fn width(&self) -> u32 {
        self.levels.first().map(|level| level.width).unwrap_or(1)
    }

    pub fn height(&self) -> u32 {
        self.levels.first().map(|level| level.height).unwrap_or(1)
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Texels of `level` packed as half floats for an `Rgba16Float` upload.
    pub fn level_as_f16(&self, level: usize) -> Vec<half::f16> {
        self.levels
            .get(level)
            .map(|level| {
                level
                    .texels
                    .iter()
                    .flat_map(|texel| texel.iter().map(|&c| half::f16::from_f32(c.min(65_000.0))))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub fn load_radiance(locator: &AssetLocator) -> Result<RadianceMap, AssetError> {
    let bytes = fetch_bytes(locator)?;
    decode_radiance(&bytes, &locator.display_name())
}

/// Small RGBA preview fitting inside `width` x `height`, aspect kept.
pub fn load_thumbnail(locator: &AssetLocator, width: u32, height: u32) -> Result<image::RgbaImage, AssetError> {
    let bytes = fetch_bytes(locator)?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| AssetError::DecodeImage {
        locator: locator.display_name(),
        source,
    })?;
    Ok(decoded.thumbnail(width, height).to_rgba8())
}

/// Decode HDR or LDR image bytes. LDR sources are treated as sRGB and
/// linearized.
pub fn decode_radiance(bytes: &[u8], name: &str) -> Result<RadianceMap, AssetError> {
    let decoded = image::load_from_memory(bytes).map_err(|source| AssetError::DecodeImage {
        locator: name.to_string(),
        source,
    })?;
    let is_float = matches!(
        decoded,
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)
    );
    let mut rgba = decoded.into_rgba32f();
    if rgba.width() > MAX_ENVIRONMENT_WIDTH {
        let height = ((rgba.height() as u64 * MAX_ENVIRONMENT_WIDTH as u64) / rgba.width() as u64)
            .max(1) as u32;
        log::debug!(
            "downscaling {name} from {}x{} to {}x{}",
            rgba.width(),
            rgba.height(),
            MAX_ENVIRONMENT_WIDTH,
            height
        );
        rgba = image::imageops::resize(&rgba, MAX_ENVIRONMENT_WIDTH, height, FilterType::Triangle);
    }

    let (width, height) = rgba.dimensions();
    let texels: Vec<[f32; 4]> = rgba
        .pixels()
        .map(|pixel| {
            let [r, g, b, a] = pixel.0;
            if is_float {
                [r, g, b, a]
            } else {
                [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), a]
            }
        })
        .collect();
    Ok(RadianceMap::from_texels(name, width, height, texels))
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn downsample(level: &RadianceLevel) -> RadianceLevel {
    let width = (level.width / 2).max(1);
    let height = (level.height / 2).max(1);
    let src_w = level.width as usize;
    let src_h = level.height as usize;
    let mut texels = vec![[0.0_f32; 4]; (width * height) as usize];
    texels
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            // 2x2 box filter. Odd edges clamp, so the last texel counts twice.
            let y0 = (y * 2).min(src_h - 1);
            let y1 = (y * 2 + 1).min(src_h - 1);
            for (x, out) in row.iter_mut().enumerate() {
                let x0 = (x * 2).min(src_w - 1);
                let x1 = (x * 2 + 1).min(src_w - 1);
                let mut sum = [0.0_f32; 4];
                for (sx, sy) in [(x0, y0), (x1, y0), (x0, y1), (x1, y1)] {
                    let texel = level.texels[sy * src_w + sx];
                    for c in 0..4 {
                        sum[c] += texel[c];
                    }
                }
                *out = sum.map(|c| c * 0.25);
            }
        });
    RadianceLevel {
        width,
        height,
        texels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn mip_chain_reaches_single_texel_and_preserves_mean() {
        let texels = (0..8).map(|i| [i as f32, 0.0, 0.0, 1.0]).collect();
        let map = RadianceMap::from_texels("ramp", 4, 2, texels);
        let sizes: Vec<(u32, u32)> = map.levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(4, 2), (2, 1), (1, 1)]);
        assert!((map.levels[2].texels[0][0] - 3.5).abs() < 1e-5);
    }

    #[test]
    fn wide_images_are_downscaled() {
        let source = image::RgbImage::from_pixel(2048, 4, image::Rgb([255, 128, 0]));
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(source)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");

        let map = decode_radiance(&png, "wide.png").expect("decode");
        assert_eq!(map.width(), MAX_ENVIRONMENT_WIDTH);
        assert_eq!(map.height(), 2);
        let texel = map.levels[0].texels[0];
        assert!((texel[0] - 1.0).abs() < 1e-3);
        assert!(texel[2].abs() < 1e-3);
    }

    #[test]
    fn thumbnail_keeps_aspect_inside_bounds() {
        let path = std::env::temp_dir().join(format!("vitrine-thumb-{}.png", std::process::id()));
        image::RgbImage::from_pixel(400, 100, image::Rgb([10, 20, 30]))
            .save(&path)
            .expect("write png");
        let thumb = load_thumbnail(&AssetLocator::File(path.clone()), 160, 80).expect("thumbnail");
        assert_eq!(thumb.dimensions(), (160, 40));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn invalid_bytes_are_reported() {
        let result = decode_radiance(b"not an image", "broken.hdr");
        assert!(matches!(result, Err(AssetError::DecodeImage { .. })));
    }

    #[test]
    fn half_float_packing_covers_every_channel() {
        let map = RadianceMap::from_texels("one", 1, 1, vec![[1.0, 2.0, 3.0, 1.0]]);
        let packed = map.level_as_f16(0);
        assert_eq!(packed.len(), 4);
        assert_eq!(packed[2].to_f32(), 3.0);
    }
}
