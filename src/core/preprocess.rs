use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array4, ArrayView4};

use crate::config::PreprocessConfig;
use crate::error::{AppError, Result};

/// Number of colour channels in the canonical tensor
pub const CHANNELS: usize = 3;

/// A `[1, 3, S, S]` channel-major tensor, normalized per channel.
///
/// Only [`Preprocessor`] builds these, so holding one means the layout
/// matches what the preprocessor was configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTensor(Array4<f32>);

impl CanonicalTensor {
    /// Tensor shape as `[batch, channels, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        let dims = self.0.dim();
        [dims.0, dims.1, dims.2, dims.3]
    }

    /// Borrow the underlying array
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    /// Take ownership of the underlying array
    pub fn into_inner(self) -> Array4<f32> {
        self.0
    }
}

/// Converts decoded images into [`CanonicalTensor`]s
#[derive(Debug, Clone)]
pub struct Preprocessor {
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(&PreprocessConfig::default())
    }
}

impl Preprocessor {
    /// Create a preprocessor for the given geometry and channel statistics
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            size: config.image_size,
            mean: config.mean,
            std: config.std,
        }
    }

    /// Side length of the square output
    pub fn image_size(&self) -> u32 {
        self.size
    }

    /// Shape every tensor from this preprocessor has
    pub fn output_shape(&self) -> [usize; 4] {
        let s = self.size as usize;
        [1, CHANNELS, s, s]
    }

    /// Decode an image file and prepare it
    pub fn prepare_path<P: AsRef<Path>>(&self, path: P) -> Result<CanonicalTensor> {
        let path = path.as_ref();
        let identity = path.display().to_string();
        let img = image::open(path).map_err(|e| AppError::ImageDecode {
            identity: identity.clone(),
            reason: e.to_string(),
        })?;
        self.prepare_identified(&img, &identity)
    }

    /// Decode an in-memory encoded image and prepare it
    pub fn prepare_bytes(&self, data: &[u8]) -> Result<CanonicalTensor> {
        let identity = "<memory>";
        let img = image::load_from_memory(data).map_err(|e| AppError::ImageDecode {
            identity: identity.to_string(),
            reason: e.to_string(),
        })?;
        self.prepare_identified(&img, identity)
    }

    /// Prepare an already decoded image
    pub fn prepare(&self, img: &DynamicImage) -> Result<CanonicalTensor> {
        self.prepare_identified(img, "<image>")
    }

    fn prepare_identified(&self, img: &DynamicImage, identity: &str) -> Result<CanonicalTensor> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(AppError::ImageDecode {
                identity: identity.to_string(),
                reason: format!("image has no pixels ({}x{})", width, height),
            });
        }

        let cropped = self.resize_and_crop(img);
        let rgb = cropped.to_rgb8();

        let s = self.size as usize;
        let mut tensor = Array4::<f32>::zeros((1, CHANNELS, s, s));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..CHANNELS {
                let value = pixel[c] as f32 / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }

        Ok(CanonicalTensor(tensor))
    }

    /// Cut the centred square of side `min(w, h)`, then scale it to `S x S`.
    ///
    /// Cropping first keeps the intermediate buffer no larger than the source.
    fn resize_and_crop(&self, img: &DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        let side = width.min(height);
        let x = (width - side) / 2;
        let y = (height - side) / 2;
        let square = img.crop_imm(x, y, side, side);

        if side == self.size {
            square
        } else {
            square.resize_exact(self.size, self.size, FilterType::CatmullRom)
        }
    }
}
