use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::DynamicImage;
use ndarray::{s, Array3, Array4};
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::DetectError;

/// How an image is brought to the model's input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeMode {
    /// Short side to `shortest_edge`, long side capped at `longest_edge`,
    /// aspect ratio kept, no padding.
    #[default]
    ShortestEdge,
    /// Resize to exactly `width` x `height`.
    Stretch,
    /// Aspect-preserving resize centred on a `width` x `height` canvas padded
    /// with the mean colour.
    Letterbox,
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub resize: ResizeMode,
    pub height: u32,
    pub width: u32,
    pub shortest_edge: u32,
    pub longest_edge: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            resize: ResizeMode::ShortestEdge,
            height: 800,
            width: 800,
            shortest_edge: 800,
            longest_edge: 1333,
        }
    }
}

/// Geometry of one preprocessed image.
///
/// Normalised model boxes are relative to the `input_width` x `input_height`
/// frame; the resized image sits in that frame at (`pad_x`, `pad_y`) scaled by
/// (`scale_x`, `scale_y`) from the original.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub orig_width: u32,
    pub orig_height: u32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Transform {
    /// Maps a normalised `(cx, cy, w, h)` box to `[xmin, ymin, xmax, ymax]` in
    /// original pixels.
    pub fn to_original(&self, cxcywh: [f32; 4]) -> [f32; 4] {
        let [cx, cy, w, h] = cxcywh;
        let in_w = self.input_width as f32;
        let in_h = self.input_height as f32;

        let cx = cx * in_w - self.pad_x as f32;
        let cy = cy * in_h - self.pad_y as f32;
        let half_w = w * in_w / 2.0;
        let half_h = h * in_h / 2.0;

        [
            (cx - half_w) / self.scale_x,
            (cy - half_h) / self.scale_y,
            (cx + half_w) / self.scale_x,
            (cy + half_h) / self.scale_y,
        ]
    }
}

#[derive(Debug)]
pub struct Processor {
    pub config: PreprocessConfig,
}

impl Processor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Works out the resize geometry for an image of the given size.
    pub fn plan(&self, orig_width: u32, orig_height: u32) -> Transform {
        let c = &self.config;
        let (w, h) = (orig_width as f32, orig_height as f32);
        let (resized_width, resized_height, input_width, input_height) = match c.resize {
            ResizeMode::ShortestEdge => {
                let (rw, rh) =
                    shortest_edge_size(orig_width, orig_height, c.shortest_edge, c.longest_edge);
                (rw, rh, rw, rh)
            }
            ResizeMode::Stretch => (c.width, c.height, c.width, c.height),
            ResizeMode::Letterbox => {
                let scale = (c.width as f32 / w).min(c.height as f32 / h);
                let rw = ((w * scale) as u32).clamp(1, c.width);
                let rh = ((h * scale) as u32).clamp(1, c.height);
                (rw, rh, c.width, c.height)
            }
        };

        Transform {
            orig_width,
            orig_height,
            resized_width,
            resized_height,
            input_width,
            input_height,
            scale_x: resized_width as f32 / w,
            scale_y: resized_height as f32 / h,
            pad_x: (input_width - resized_width) / 2,
            pad_y: (input_height - resized_height) / 2,
        }
    }

    /// Resizes and normalises a batch into an NCHW tensor.
    ///
    /// Images whose input frames differ in size are zero-padded at the
    /// bottom-right up to the largest frame in the batch.
    pub fn preprocess(
        &self,
        xs: &[DynamicImage],
    ) -> Result<(Array4<f32>, Vec<Transform>), DetectError> {
        let ys = xs
            .par_iter()
            .map(|x| self.preprocess_one(x))
            .collect::<Result<Vec<_>, _>>()?;

        let max_h = ys.iter().map(|(arr, _)| arr.dim().1).max().unwrap_or(0);
        let max_w = ys.iter().map(|(arr, _)| arr.dim().2).max().unwrap_or(0);

        let mut batch = Array4::<f32>::zeros((ys.len(), 3, max_h, max_w));
        let mut transforms = Vec::with_capacity(ys.len());
        for (i, (arr, transform)) in ys.into_iter().enumerate() {
            let (_, h, w) = arr.dim();
            batch.slice_mut(s![i, .., ..h, ..w]).assign(&arr);
            transforms.push(transform);
        }
        Ok((batch, transforms))
    }

    fn preprocess_one(&self, x: &DynamicImage) -> Result<(Array3<f32>, Transform), DetectError> {
        if x.width() == 0 || x.height() == 0 {
            return Err(DetectError::EmptyImage);
        }
        let c = &self.config;
        let transform = self.plan(x.width(), x.height());

        let src = DynamicImage::ImageRgb8(x.to_rgb8());
        let mut dst = Image::new(
            transform.resized_width,
            transform.resized_height,
            PixelType::U8x3,
        );
        let options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        Resizer::new().resize(&src, &mut dst, &options)?;

        let (in_h, in_w) = (
            transform.input_height as usize,
            transform.input_width as usize,
        );
        let mut arr = Array3::<f32>::zeros((3, in_h, in_w));
        if c.resize == ResizeMode::Letterbox {
            for ch in 0..3 {
                let pad = (c.mean[ch] * 255.0) as u8;
                arr.slice_mut(s![ch, .., ..]).fill(self.normalize(pad, ch));
            }
        }

        let (pad_x, pad_y) = (transform.pad_x as usize, transform.pad_y as usize);
        let row_width = transform.resized_width as usize;
        for (i, rgb) in dst.buffer().chunks_exact(3).enumerate() {
            let y = i / row_width + pad_y;
            let x = i % row_width + pad_x;
            for ch in 0..3 {
                arr[[ch, y, x]] = self.normalize(rgb[ch], ch);
            }
        }
        Ok((arr, transform))
    }

    fn normalize(&self, value: u8, channel: usize) -> f32 {
        (value as f32 / 255.0 - self.config.mean[channel]) / self.config.std[channel]
    }
}

/// Output size of the DETR "shortest edge" resize, as `(width, height)`.
pub fn shortest_edge_size(width: u32, height: u32, shortest: u32, longest: u32) -> (u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let (min_side, max_side) = (w.min(h), w.max(h));

    let mut size = shortest as f64;
    if max_side / min_side * size > longest as f64 {
        size = (longest as f64 * min_side / max_side).round();
    }

    if (h <= w && h == size) || (w <= h && w == size) {
        return (width, height);
    }
    let (ow, oh) = if w < h {
        (size, (size * h / w).trunc())
    } else {
        ((size * w / h).trunc(), size)
    };
    ((ow as u32).max(1), (oh as u32).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    fn processor(resize: ResizeMode) -> Processor {
        Processor::new(PreprocessConfig {
            resize,
            width: 64,
            height: 64,
            shortest_edge: 32,
            longest_edge: 48,
            ..PreprocessConfig::default()
        })
    }

    #[test]
    fn shortest_edge_keeps_aspect_ratio() {
        assert_eq!(shortest_edge_size(640, 480, 800, 1333), (1066, 800));
        assert_eq!(shortest_edge_size(480, 640, 800, 1333), (800, 1066));
        // long side would exceed the cap
        assert_eq!(shortest_edge_size(2000, 500, 800, 1333), (1332, 333));
        assert_eq!(shortest_edge_size(800, 600, 600, 1333), (800, 600));
    }

    #[test]
    fn stretch_tensor_has_fixed_shape() {
        let p = processor(ResizeMode::Stretch);
        let (xs, transforms) = p.preprocess(&[solid(100, 50, [0, 0, 0])]).unwrap();
        assert_eq!(xs.dim(), (1, 3, 64, 64));
        assert_eq!(transforms[0].pad_x, 0);
        assert!((transforms[0].scale_x - 0.64).abs() < 1e-6);
        assert!((transforms[0].scale_y - 1.28).abs() < 1e-6);
    }

    #[test]
    fn letterbox_centres_and_pads() {
        let p = processor(ResizeMode::Letterbox);
        let (xs, transforms) = p.preprocess(&[solid(128, 64, [255, 255, 255])]).unwrap();
        let t = transforms[0];
        assert_eq!((t.resized_width, t.resized_height), (64, 32));
        assert_eq!((t.pad_x, t.pad_y), (0, 16));

        // padding rows hold the (normalised) mean colour, close to zero
        assert!(xs[[0, 0, 0, 10]].abs() < 0.05);
        // content rows hold normalised white
        let white_r = (1.0 - 0.485) / 0.229;
        assert!((xs[[0, 0, 32, 10]] - white_r).abs() < 1e-4);
    }

    #[test]
    fn batch_pads_to_largest_frame() {
        let p = processor(ResizeMode::ShortestEdge);
        let (xs, transforms) = p
            .preprocess(&[solid(64, 32, [10, 10, 10]), solid(32, 32, [10, 10, 10])])
            .unwrap();
        assert_eq!(transforms[0].input_width, 48);
        assert_eq!(transforms[1].input_width, 32);
        assert_eq!(xs.dim(), (2, 3, 32, 48));
        assert_eq!(xs[[1, 0, 0, 40]], 0.0);
    }

    #[test]
    fn transform_maps_boxes_back_to_original() {
        let p = processor(ResizeMode::Letterbox);
        let t = p.plan(128, 64);
        // a box covering the whole content area of the canvas
        let bbox = t.to_original([0.5, 0.5, 1.0, 0.5]);
        for (got, want) in bbox.iter().zip([0.0, 0.0, 128.0, 64.0]) {
            assert!((got - want).abs() < 1e-3, "{bbox:?}");
        }

        let p = processor(ResizeMode::Stretch);
        let t = p.plan(640, 480);
        let bbox = t.to_original([0.25, 0.5, 0.5, 0.5]);
        for (got, want) in bbox.iter().zip([0.0, 120.0, 320.0, 360.0]) {
            assert!((got - want).abs() < 1e-3, "{bbox:?}");
        }
    }

    #[test]
    fn rejects_empty_image() {
        let p = processor(ResizeMode::Stretch);
        let err = p.preprocess(&[solid(0, 0, [0, 0, 0])]).unwrap_err();
        assert!(matches!(err, DetectError::EmptyImage));
    }
}
