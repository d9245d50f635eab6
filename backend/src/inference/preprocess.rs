use crate::error::DecodeError;
use crate::inference::config::{Normalization, PreprocessConfig};
use image::{DynamicImage, GenericImageView, ImageReader};
use ndarray::{Array4, ArrayView4};
use std::io::{BufRead, Cursor, Seek};

/// Per-channel means of the ImageNet training set, BGR order, 0..255 range.
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

impl Normalization {
    /// Maps one RGB pixel to the network's channel order and value range.
    pub fn apply(self, rgb: [u8; 3]) -> [f32; 3] {
        let [r, g, b] = rgb.map(f32::from);
        match self {
            Normalization::Caffe => [
                b - CAFFE_MEAN_BGR[0],
                g - CAFFE_MEAN_BGR[1],
                r - CAFFE_MEAN_BGR[2],
            ],
            Normalization::Torch => {
                let px = [r, g, b];
                std::array::from_fn(|c| (px[c] / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c])
            }
            Normalization::Tf => [r, g, b].map(|v| v / 127.5 - 1.0),
        }
    }
}

/// A normalized NHWC batch of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
    pub fn new(array: Array4<f32>) -> Self {
        Self(array)
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Decodes an encoded JPEG/PNG and turns it into a model-ready tensor.
    pub fn preprocess(&self, image_bytes: &[u8]) -> Result<ImageTensor, DecodeError> {
        self.preprocess_reader(Cursor::new(image_bytes))
    }

    pub fn preprocess_reader<R: BufRead + Seek>(&self, reader: R) -> Result<ImageTensor, DecodeError> {
        let image = ImageReader::new(reader).with_guessed_format()?.decode()?;
        self.to_tensor(&image)
    }

    /// Resizes to the configured size, ignoring aspect ratio, and normalizes.
    pub fn to_tensor(&self, image: &DynamicImage) -> Result<ImageTensor, DecodeError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::Empty);
        }

        let (target_w, target_h) = (self.config.width, self.config.height);
        let resized = if (width, height) == (target_w, target_h) {
            image.to_rgb8()
        } else {
            image
                .resize_exact(target_w, target_h, self.config.filter.into())
                .to_rgb8()
        };

        let mut array = Array4::<f32>::zeros((1, target_h as usize, target_w as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let values = self.config.normalization.apply(pixel.0);
            for (c, value) in values.into_iter().enumerate() {
                array[[0, y as usize, x as usize, c]] = value;
            }
        }

        Ok(ImageTensor(array))
    }
}
