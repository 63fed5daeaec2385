//! Loading the source image and influence mask.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, RgbaImage};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("image '{0}' was not found")]
    NotFound(String),
    #[error("failed to decode image '{id}': {source}")]
    Decode {
        id: String,
        #[source]
        source: image::ImageError,
    },
}

/// Resolves image identifiers to decoded pixels.
pub trait ImageSource {
    fn load_image(&self, id: &str) -> Result<DynamicImage, LoadError>;
}

/// Reads images from disk. Relative identifiers resolve against `root`.
#[derive(Clone, Debug)]
pub struct FileImageSource {
    root: PathBuf,
}

impl FileImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, id: &str) -> PathBuf {
        let path = Path::new(id);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ImageSource for FileImageSource {
    fn load_image(&self, id: &str) -> Result<DynamicImage, LoadError> {
        let path = self.resolve(id);
        if !path.is_file() {
            return Err(LoadError::NotFound(path.display().to_string()));
        }
        image::open(&path).map_err(|source| LoadError::Decode {
            id: path.display().to_string(),
            source,
        })
    }
}

/// Images held in memory under fixed identifiers.
#[derive(Clone, Debug, Default)]
pub struct MemoryImageSource {
    images: HashMap<String, DynamicImage>,
}

impl MemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, id: impl Into<String>, image: impl Into<DynamicImage>) -> Self {
        self.insert(id, image);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, image: impl Into<DynamicImage>) {
        self.images.insert(id.into(), image.into());
    }
}

impl ImageSource for MemoryImageSource {
    fn load_image(&self, id: &str) -> Result<DynamicImage, LoadError> {
        self.images
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(id.to_string()))
    }
}

/// Loads `id` and stretches it to a `resolution` x `resolution` RGBA image.
pub fn load_square(
    images: &dyn ImageSource,
    id: &str,
    resolution: u32,
) -> Result<RgbaImage, LoadError> {
    let image = images.load_image(id)?;
    if image.width() == resolution && image.height() == resolution {
        return Ok(image.into_rgba8());
    }
    tracing::debug!(
        id,
        width = image.width(),
        height = image.height(),
        resolution,
        "resizing image to render resolution"
    );
    Ok(image
        .resize_exact(resolution, resolution, FilterType::Triangle)
        .into_rgba8())
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn memory_source_reports_missing_ids() {
        let images = MemoryImageSource::new();
        assert!(matches!(
            images.load_image("nope"),
            Err(LoadError::NotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn load_square_stretches_to_resolution() {
        let images = MemoryImageSource::new().with_image(
            "wide",
            RgbaImage::from_pixel(8, 2, Rgba([10, 20, 30, 255])),
        );
        let square = load_square(&images, "wide", 4).unwrap();
        assert_eq!(square.dimensions(), (4, 4));
        assert_eq!(*square.get_pixel(2, 2), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn file_source_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255]))
            .save(dir.path().join("tile.png"))
            .unwrap();

        let images = FileImageSource::new(dir.path());
        let loaded = load_square(&images, "tile.png", 3).unwrap();
        assert_eq!(*loaded.get_pixel(0, 0), Rgba([1, 2, 3, 255]));

        assert!(matches!(
            images.load_image("missing.png"),
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn file_source_surfaces_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let images = FileImageSource::new(dir.path());
        assert!(matches!(
            images.load_image("broken.png"),
            Err(LoadError::Decode { .. })
        ));
    }
}
