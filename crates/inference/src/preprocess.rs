//! Evaluation transform: resize the shorter side, center crop, scale to [0, 1] and normalise
//! each channel with the ImageNet statistics.

use std::path::Path;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, EvalResult};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTransform {
    /// Target length of the shorter side before cropping.
    pub resize: u32,
    pub crop: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            resize: 256,
            crop: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl ImageTransform {
    pub fn validate(&self) -> EvalResult<()> {
        if self.crop == 0 || self.crop > self.resize {
            return Err(EvalError::Preprocess(format!(
                "crop {} must be in 1..={}",
                self.crop, self.resize
            )));
        }
        if self.std.iter().any(|s| *s <= 0.0 || s.is_nan()) {
            return Err(EvalError::Preprocess(format!(
                "std must be positive, got {:?}",
                self.std
            )));
        }
        Ok(())
    }

    /// Scales so the shorter side equals `resize`, keeping the aspect ratio.
    pub fn resized_dims(&self, width: u32, height: u32) -> (u32, u32) {
        let resize = self.resize as u64;
        if width <= height {
            let h = (resize * height as u64 / width.max(1) as u64) as u32;
            (self.resize, h)
        } else {
            let w = (resize * width as u64 / height.max(1) as u64) as u32;
            (w, self.resize)
        }
    }

    /// Shorter side to `resize`, then the centered `crop` square.
    pub fn resize_and_crop(&self, img: &DynamicImage) -> EvalResult<RgbImage> {
        self.validate()?;
        let rgb = img.to_rgb8();
        let (w, h) = self.resized_dims(rgb.width(), rgb.height());
        let resized = imageops::resize(&rgb, w, h, FilterType::Triangle);
        let left = ((w - self.crop) as f32 / 2.0).round() as u32;
        let top = ((h - self.crop) as f32 / 2.0).round() as u32;
        Ok(imageops::crop_imm(&resized, left, top, self.crop, self.crop).to_image())
    }

    /// Planar `[3, crop, crop]` values, channel-major.
    pub fn to_chw(&self, img: &DynamicImage) -> EvalResult<Vec<f32>> {
        let cropped = self.resize_and_crop(img)?;
        let plane = (self.crop * self.crop) as usize;
        let mut out = vec![0.0f32; 3 * plane];
        for (i, pixel) in cropped.pixels().enumerate() {
            for c in 0..3 {
                let v = pixel.0[c] as f32 / 255.0;
                out[c * plane + i] = (v - self.mean[c]) / self.std[c];
            }
        }
        Ok(out)
    }

    /// `[1, 3, crop, crop]` tensor ready for `VwwModel::forward`.
    pub fn to_tensor<B: Backend>(
        &self,
        img: &DynamicImage,
        device: &B::Device,
    ) -> EvalResult<Tensor<B, 4>> {
        let crop = self.crop as usize;
        let data = TensorData::new(self.to_chw(img)?, [1, 3, crop, crop]);
        Ok(Tensor::from_data(data, device))
    }
}

pub fn open_image(path: &Path) -> EvalResult<DynamicImage> {
    image::open(path).map_err(|source| EvalError::Image {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn shorter_side_goes_to_resize() {
        let t = ImageTransform::default();
        assert_eq!(t.resized_dims(640, 480), (341, 256));
        assert_eq!(t.resized_dims(300, 600), (256, 512));
        assert_eq!(t.resized_dims(256, 256), (256, 256));
    }

    #[test]
    fn solid_image_normalises_per_channel() {
        let t = ImageTransform::default();
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 400, Rgb([255, 0, 128])));
        let chw = t.to_chw(&img).unwrap();
        let plane = 224 * 224;
        assert_eq!(chw.len(), 3 * plane);
        let expect = [
            (1.0 - 0.485) / 0.229,
            (0.0 - 0.456) / 0.224,
            (128.0 / 255.0 - 0.406) / 0.225,
        ];
        for c in 0..3 {
            for v in [chw[c * plane], chw[c * plane + plane / 2], chw[(c + 1) * plane - 1]] {
                assert!((v - expect[c]).abs() < 1e-4, "channel {c}: {v}");
            }
        }
    }

    #[test]
    fn crop_is_centered() {
        // Left half black, right half white: the crop keeps the boundary in the middle.
        let img = RgbImage::from_fn(512, 256, |x, _| {
            if x < 256 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let t = ImageTransform::default();
        let cropped = t.resize_and_crop(&DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(cropped.dimensions(), (224, 224));
        assert_eq!(cropped.get_pixel(10, 100).0, [0, 0, 0]);
        assert_eq!(cropped.get_pixel(214, 100).0, [255, 255, 255]);
    }

    #[test]
    fn rejects_crop_larger_than_resize() {
        let t = ImageTransform {
            crop: 300,
            ..Default::default()
        };
        assert!(t.validate().is_err());
        let img = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
        assert!(matches!(t.resize_and_crop(&img), Err(EvalError::Preprocess(_))));
        assert!(t.to_chw(&img).is_err());
    }
}
