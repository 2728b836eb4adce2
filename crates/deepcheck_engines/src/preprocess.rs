#![forbid(unsafe_code)]

use std::path::Path;

use deepcheck_kernel_contracts::classify::PreprocessProfile;
use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::DynamicImage;

use crate::classifier::ClassifierError;

/// Normalized image in NCHW layout with N = 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub fn zeros(profile: &PreprocessProfile) -> Self {
        Self {
            width: profile.width,
            height: profile.height,
            data: vec![0.0; profile.tensor_len()],
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Value at channel `c`, row `y`, column `x`.
    pub fn at(&self, c: usize, y: u32, x: u32) -> f32 {
        let plane = self.width as usize * self.height as usize;
        self.data[c * plane + y as usize * self.width as usize + x as usize]
    }
}

/// Decodes by content, not by extension: a JPEG saved as `.png` still loads.
pub fn preprocess_path(
    path: &Path,
    profile: &PreprocessProfile,
) -> Result<ImageTensor, ClassifierError> {
    let decode_err = |reason: String| ClassifierError::ImageDecode {
        path: path.display().to_string(),
        reason,
    };
    let img = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))?;
    Ok(preprocess_image(&img, profile))
}

pub fn preprocess_image(img: &DynamicImage, profile: &PreprocessProfile) -> ImageTensor {
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, profile.width, profile.height, FilterType::Triangle);
    let plane = profile.width as usize * profile.height as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, px) in resized.enumerate_pixels() {
        let idx = y as usize * profile.width as usize + x as usize;
        for c in 0..3 {
            let scaled = f32::from(px.0[c]) / 255.0;
            data[c * plane + idx] = (scaled - profile.mean[c]) / profile.std[c];
        }
    }
    ImageTensor {
        width: profile.width,
        height: profile.height,
        data,
    }
}
