//! Multi-band GeoTIFF reading.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::{ChunkType, Decoder, DecodingResult};
use tiff::tags::Tag;

/// Decoded raster with samples widened to `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of bands.
    pub bands: usize,
    planar: bool,
    samples: Vec<f64>,
}

impl Raster {
    /// Sample of `band` at pixel (`x`, `y`).
    pub fn sample(&self, band: usize, x: u32, y: u32) -> f64 {
        let pixel = y as usize * self.width as usize + x as usize;
        let index = if self.planar {
            band * self.pixel_count() + pixel
        } else {
            pixel * self.bands + band
        };
        self.samples[index]
    }

    /// Number of pixels per band.
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

fn widen<T: Copy + Into<f64>>(values: &[T]) -> Vec<f64> {
    values.iter().map(|&v| v.into()).collect()
}

fn widen_lossy<T: Copy>(values: &[T], convert: impl Fn(T) -> f64) -> Vec<f64> {
    values.iter().map(|&v| convert(v)).collect()
}

fn widen_result(result: DecodingResult, path: &Path) -> Result<Vec<f64>> {
    #[allow(clippy::cast_precision_loss)]
    let samples = match result {
        DecodingResult::U8(v) => widen(&v),
        DecodingResult::U16(v) => widen(&v),
        DecodingResult::U32(v) => widen(&v),
        DecodingResult::U64(v) => widen_lossy(&v, |s| s as f64),
        DecodingResult::I8(v) => widen(&v),
        DecodingResult::I16(v) => widen(&v),
        DecodingResult::I32(v) => widen(&v),
        DecodingResult::I64(v) => widen_lossy(&v, |s| s as f64),
        DecodingResult::F32(v) => widen(&v),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(Error::RasterFormat {
                path: path.to_path_buf(),
                reason: "unsupported sample format".to_string(),
            });
        }
    };
    Ok(samples)
}

/// Decode a band-separated image chunk by chunk.
///
/// `read_image` only returns the first band of such files. Chunks are
/// stored band after band, and within a band row-major across the grid.
fn read_planes<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    width: u32,
    height: u32,
    path: &Path,
) -> Result<Vec<f64>> {
    let read_err = |source| Error::RasterRead {
        path: path.to_path_buf(),
        source,
    };

    let chunk_count = match decoder.get_chunk_type() {
        ChunkType::Strip => decoder.strip_count(),
        ChunkType::Tile => decoder.tile_count(),
    }
    .map_err(read_err)?;

    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    if chunk_width == 0 || chunk_height == 0 {
        return Err(Error::RasterFormat {
            path: path.to_path_buf(),
            reason: "empty chunk size".to_string(),
        });
    }
    let across = width.div_ceil(chunk_width);
    let chunks_per_band = across * height.div_ceil(chunk_height);
    if chunks_per_band == 0 || chunk_count % chunks_per_band != 0 {
        return Err(Error::RasterFormat {
            path: path.to_path_buf(),
            reason: format!("{chunk_count} chunks do not cover whole bands"),
        });
    }

    let pixels = width as usize * height as usize;
    let bands = (chunk_count / chunks_per_band) as usize;
    let mut samples = vec![0.0; pixels * bands];

    for index in 0..chunk_count {
        let (data_width, data_height) = decoder.chunk_data_dimensions(index);
        let chunk = widen_result(decoder.read_chunk(index).map_err(read_err)?, path)?;

        let band = (index / chunks_per_band) as usize;
        let within = index % chunks_per_band;
        let x0 = ((within % across) * chunk_width) as usize;
        let y0 = ((within / across) * chunk_height) as usize;
        let row_len = data_width as usize;
        // Bottom tiles of later bands may still carry their padding rows
        let rows = (data_height as usize).min(height as usize - y0);

        for (row, values) in chunk.chunks_exact(row_len).take(rows).enumerate() {
            let start = band * pixels + (y0 + row) * width as usize + x0;
            samples[start..start + row_len].copy_from_slice(values);
        }
    }

    Ok(samples)
}

/// Read all bands of the TIFF at `path`.
pub fn read_raster(path: &Path) -> Result<Raster> {
    let read_err = |source| Error::RasterRead {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(read_err)?;
    let (width, height) = decoder.dimensions().map_err(read_err)?;

    let planar = match decoder.find_tag(Tag::PlanarConfiguration).map_err(read_err)? {
        Some(value) => value.into_u16().map_err(read_err)? == 2,
        None => false,
    };

    let pixels = width as usize * height as usize;
    if pixels == 0 {
        return Err(Error::RasterFormat {
            path: path.to_path_buf(),
            reason: "image has no pixels".to_string(),
        });
    }

    let samples = if planar {
        read_planes(&mut decoder, width, height, path)?
    } else {
        widen_result(decoder.read_image().map_err(read_err)?, path)?
    };

    if samples.len() % pixels != 0 {
        return Err(Error::RasterFormat {
            path: path.to_path_buf(),
            reason: format!(
                "{} samples do not fill a {width}x{height} grid",
                samples.len()
            ),
        });
    }

    Ok(Raster {
        width,
        height,
        bands: samples.len() / pixels,
        planar,
        samples,
    })
}

/// Write a 3-band 16-bit raster whose samples come from `sample(x, y, band)`.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub fn write_test_raster(path: &Path, width: u32, height: u32, sample: impl Fn(u32, u32, usize) -> u16) {
    use tiff::encoder::{TiffEncoder, colortype};

    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            for band in 0..3 {
                data.push(sample(x, y, band));
            }
        }
    }

    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    encoder
        .write_image::<colortype::RGB16>(width, height, &data)
        .unwrap();
}

/// Write a 3-band 16-bit raster with each band stored separately, split
/// into strips of `rows_per_strip` rows.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub fn write_planar_test_raster(
    path: &Path,
    width: u32,
    height: u32,
    rows_per_strip: u32,
    sample: impl Fn(u32, u32, usize) -> u16,
) {
    const BANDS: u32 = 3;
    let strips_per_band = height.div_ceil(rows_per_strip);
    let strip_count = strips_per_band * BANDS;
    let entries: u16 = 10;
    let ifd_len = 2 + u32::from(entries) * 12 + 4;
    let bits_offset = 8 + ifd_len;
    let offsets_offset = bits_offset + 2 * BANDS;
    let counts_offset = offsets_offset + 4 * strip_count;
    let data_offset = counts_offset + 4 * strip_count;

    // Strips in file order: every strip of band 0, then band 1, then band 2
    let mut strips = Vec::new();
    for band in 0..BANDS as usize {
        for strip in 0..strips_per_band {
            let rows = strip * rows_per_strip..((strip + 1) * rows_per_strip).min(height);
            let mut bytes = Vec::new();
            for y in rows {
                for x in 0..width {
                    bytes.extend_from_slice(&sample(x, y, band).to_le_bytes());
                }
            }
            strips.push(bytes);
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());

    out.extend_from_slice(&entries.to_le_bytes());
    let mut entry = |tag: u16, kind: u16, count: u32, value: u32| {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    };
    const SHORT: u16 = 3;
    const LONG: u16 = 4;
    entry(256, LONG, 1, width);
    entry(257, LONG, 1, height);
    entry(258, SHORT, BANDS, bits_offset);
    entry(259, SHORT, 1, 1); // no compression
    entry(262, SHORT, 1, 2); // RGB
    entry(273, LONG, strip_count, offsets_offset);
    entry(277, SHORT, 1, BANDS);
    entry(278, LONG, 1, rows_per_strip);
    entry(279, LONG, strip_count, counts_offset);
    entry(284, SHORT, 1, 2); // separate planes
    out.extend_from_slice(&0u32.to_le_bytes());

    for _ in 0..BANDS {
        out.extend_from_slice(&16u16.to_le_bytes());
    }
    let mut offset = data_offset;
    for strip in &strips {
        out.extend_from_slice(&offset.to_le_bytes());
        offset += u32::try_from(strip.len()).unwrap();
    }
    for strip in &strips {
        out.extend_from_slice(&u32::try_from(strip.len()).unwrap().to_le_bytes());
    }
    for strip in &strips {
        out.extend_from_slice(strip);
    }

    std::fs::write(path, out).unwrap();
}
