//! Raster to model input conversion.

use super::raster::{Raster, read_raster};
use crate::constants::tensor::{CHANNELS, HALF_RANGE, SHAPE, SIZE};
use crate::error::{Error, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::path::Path;
use tracing::debug;

/// Model input: `[1, 224, 224, 3]` in NHWC order, values in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
}

impl InputTensor {
    /// Tensor shape.
    pub const fn shape(&self) -> [usize; 4] {
        SHAPE
    }

    /// Flattened values in NHWC order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Convert back to an 8-bit image for previews.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_rgb_image(&self) -> RgbImage {
        let bytes = self
            .data
            .iter()
            .map(|&v| ((v + 1.0) * HALF_RANGE).round().clamp(0.0, 255.0) as u8)
            .collect();
        RgbImage::from_raw(SIZE, SIZE, bytes).unwrap_or_else(|| RgbImage::new(SIZE, SIZE))
    }
}

/// Convert the raster at `path` into a model input tensor.
///
/// The first three bands become the red, green and blue channels. Samples
/// are divided by the largest sample across those bands, so brightness is
/// relative to the image itself rather than to the sensor range.
pub fn preprocess(path: &Path) -> Result<InputTensor> {
    let raster = read_raster(path)?;
    if raster.bands < CHANNELS {
        return Err(Error::RasterFormat {
            path: path.to_path_buf(),
            reason: format!("expected {CHANNELS} bands, found {}", raster.bands),
        });
    }

    let rgb = to_rgb(&raster);
    let square = center_square(&rgb);
    let resized = imageops::resize(&square, SIZE, SIZE, FilterType::Lanczos3);

    let data = resized
        .as_raw()
        .iter()
        .map(|&v| f32::from(v) / HALF_RANGE - 1.0)
        .collect();

    debug!(
        "Preprocessed {}x{} raster from {}",
        raster.width,
        raster.height,
        path.display()
    );
    Ok(InputTensor { data })
}

fn usable(sample: f64) -> f64 {
    if sample.is_nan() || sample < 0.0 {
        0.0
    } else {
        sample
    }
}

/// Scale the first three bands by their common maximum into 8-bit RGB.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_rgb(raster: &Raster) -> RgbImage {
    let mut max = 0.0_f64;
    for y in 0..raster.height {
        for x in 0..raster.width {
            for band in 0..CHANNELS {
                max = max.max(usable(raster.sample(band, x, y)));
            }
        }
    }

    if max <= 0.0 || !max.is_finite() {
        return RgbImage::new(raster.width, raster.height);
    }

    RgbImage::from_fn(raster.width, raster.height, |x, y| {
        let channel = |band| {
            let scaled = (usable(raster.sample(band, x, y)) / max).clamp(0.0, 1.0);
            (scaled * 255.0) as u8
        };
        Rgb([channel(0), channel(1), channel(2)])
    })
}

fn center_square(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    imageops::crop_imm(image, (width - side) / 2, (height - side) / 2, side, side).to_image()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::preprocess::raster::{write_planar_test_raster, write_test_raster};
    use tempfile::TempDir;
    use tiff::encoder::{TiffEncoder, colortype};

    fn gradient(x: u32, y: u32, band: usize) -> u16 {
        u16::try_from((x * 37 + y * 11 + u32::try_from(band).unwrap() * 500) % 4000).unwrap()
    }

    #[test]
    fn test_output_shape_and_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene.tif");
        write_test_raster(&path, 64, 48, gradient);

        let tensor = preprocess(&path).unwrap();

        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert_eq!(tensor.data().len(), 224 * 224 * 3);
        assert!(tensor.data().iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scene.tif");
        write_test_raster(&path, 50, 70, gradient);

        let first = preprocess(&path).unwrap();
        let second = preprocess(&path).unwrap();

        let bits = |t: &InputTensor| t.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn test_brightest_sample_maps_to_one() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flat.tif");
        // Uniform red at the maximum, green and blue black
        write_test_raster(&path, 16, 16, |_, _, band| if band == 0 { 900 } else { 0 });

        let tensor = preprocess(&path).unwrap();

        let first_pixel = &tensor.data()[..3];
        assert_eq!(first_pixel, &[1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_all_zero_raster_is_black() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dark.tif");
        write_test_raster(&path, 8, 8, |_, _, _| 0);

        let tensor = preprocess(&path).unwrap();
        assert!(tensor.data().iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_fewer_than_three_bands_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gray.tif");
        let file = std::fs::File::create(&path).unwrap();
        TiffEncoder::new(file)
            .unwrap()
            .write_image::<colortype::Gray16>(4, 4, &[100u16; 16])
            .unwrap();

        let err = preprocess(&path).unwrap_err();
        assert!(matches!(err, Error::RasterFormat { .. }));
    }

    #[test]
    fn test_band_separated_raster_matches_interleaved() {
        let dir = TempDir::new().unwrap();
        let planar = dir.path().join("planar.tif");
        let chunky = dir.path().join("chunky.tif");
        write_planar_test_raster(&planar, 40, 30, 8, gradient);
        write_test_raster(&chunky, 40, 30, gradient);

        let planar = preprocess(&planar).unwrap();
        let chunky = preprocess(&chunky).unwrap();

        assert_eq!(planar.shape(), [1, 224, 224, 3]);
        let bits = |t: &InputTensor| t.data().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&planar), bits(&chunky));
    }

    #[test]
    fn test_preview_round_trips_pixels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flat.tif");
        write_test_raster(&path, 10, 10, |_, _, band| if band == 1 { 500 } else { 0 });

        let image = preprocess(&path).unwrap().to_rgb_image();
        assert_eq!(image.dimensions(), (224, 224));
        assert_eq!(image.get_pixel(100, 100), &Rgb([0, 255, 0]));
    }

    #[test]
    fn test_center_square_crops_long_side() {
        let image = RgbImage::from_fn(10, 4, |x, _| Rgb([u8::try_from(x).unwrap(), 0, 0]));
        let square = center_square(&image);
        assert_eq!(square.dimensions(), (4, 4));
        assert_eq!(square.get_pixel(0, 0)[0], 3);
    }
}
