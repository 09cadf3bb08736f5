//! Diagnostic preview of the model input.

use crate::error::{Error, Result};
use crate::preprocess::InputTensor;
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// Save `tensor` as a JPEG image at `path`.
pub fn save_preview(tensor: &InputTensor, path: &Path) -> Result<()> {
    tensor
        .to_rgb_image()
        .save_with_format(path, ImageFormat::Jpeg)
        .map_err(|source| Error::ImageWrite {
            path: path.to_path_buf(),
            source,
        })?;

    debug!("Saved preview to {}", path.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::preprocess::{preprocess, raster::write_test_raster};
    use tempfile::TempDir;

    #[test]
    fn test_writes_decodable_jpeg() {
        let dir = TempDir::new().unwrap();
        let raster = dir.path().join("scene.tif");
        write_test_raster(&raster, 32, 32, |x, y, band| {
            u16::try_from(x * 10 + y + u32::try_from(band).unwrap()).unwrap()
        });
        let tensor = preprocess(&raster).unwrap();
        let preview = dir.path().join("processed_image.jpg");

        save_preview(&tensor, &preview).unwrap();

        let decoded = image::open(&preview).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (224, 224));
    }

    #[test]
    fn test_unwritable_path_is_error() {
        let dir = TempDir::new().unwrap();
        let raster = dir.path().join("scene.tif");
        write_test_raster(&raster, 8, 8, |_, _, _| 1);
        let tensor = preprocess(&raster).unwrap();

        let err = save_preview(&tensor, &dir.path().join("missing").join("p.jpg")).unwrap_err();
        assert!(matches!(err, Error::ImageWrite { .. }));
    }
}
