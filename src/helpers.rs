use std::path::Path;

use ab_glyph::FontVec;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::dto::Detection;

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const CHIP_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const PLOT_TEXT_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

const CHIP_FONT_SIZE: f32 = 16.0;
const CHIP_LINE_WIDTH: i32 = 3;
const PLOT_FONT_SIZE: f32 = 14.0;
const PLOT_LINE_WIDTH: i32 = 2;
const PLOT_TEXT_OFFSET: i32 = 5;
const PLOT_TEXT_PADDING: i32 = 3;
const PLOT_BACKGROUND_ALPHA: f32 = 0.7;
// average glyph width relative to the font size, used when no font is loaded
const FALLBACK_CHAR_WIDTH: f32 = 0.6;

const FONT_CANDIDATES: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Loads `path` if given, otherwise the first system font found.
pub fn load_font(path: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = path {
        match read_font(path) {
            Some(font) => return Some(font),
            None => warn!("cannot use font {}, trying system fonts", path.display()),
        }
    }
    let font = FONT_CANDIDATES
        .iter()
        .map(Path::new)
        .filter(|p| p.exists())
        .find_map(read_font);
    if font.is_none() {
        warn!("no usable font found, labels are drawn without text");
    }
    font
}

fn read_font(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    let font = FontVec::try_from_vec(data).ok()?;
    debug!("loaded font {}", path.display());
    Some(font)
}

/// Draws detections onto images, in the two styles the clients use.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    pub fn from_font_path(path: Option<&Path>) -> Self {
        Self::new(load_font(path))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn text_size(&self, text: &str, size: f32) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(size, font, text),
            None => {
                let width = text.chars().count() as f32 * size * FALLBACK_CHAR_WIDTH;
                (width.ceil() as u32, size.ceil() as u32)
            }
        }
    }

    fn draw_text(
        &self,
        image: &mut RgbImage,
        color: Rgb<u8>,
        x: i32,
        y: i32,
        size: f32,
        text: &str,
    ) {
        if let Some(font) = &self.font {
            draw_text_mut(image, color, x, y, size, font, text);
        }
    }

    /// Web viewer style: 3 px outline and a filled chip `label (0.87)` resting
    /// on the box's top edge.
    pub fn draw_chips(&self, image: &mut RgbImage, detections: &[Detection]) {
        for det in detections {
            let [x0, y0, x1, y1] = pixel_box(det);
            draw_thick_rect(image, [x0, y0, x1, y1], CHIP_LINE_WIDTH, BOX_COLOR);

            let text = format!("{} ({:.2})", det.label, det.score);
            let (tw, th) = self.text_size(&text, CHIP_FONT_SIZE);
            let chip = Rect::at(x0, y0 - th as i32 - 4).of_size(tw + 5, th + 5);
            draw_filled_rect_mut(image, chip, BOX_COLOR);
            self.draw_text(
                image,
                CHIP_TEXT_COLOR,
                x0 + 2,
                y0 - th as i32 - 2,
                CHIP_FONT_SIZE,
                &text,
            );
        }
    }

    /// Script style: 2 px outline, red `label (score)` just above the top-left
    /// corner on a translucent white background.
    pub fn draw_plot(&self, image: &mut RgbImage, detections: &[Detection]) {
        for det in detections {
            let [x0, y0, x1, y1] = pixel_box(det);
            draw_thick_rect(image, [x0, y0, x1, y1], PLOT_LINE_WIDTH, BOX_COLOR);

            let text = format!("{} ({})", det.label, det.score);
            let (tw, th) = self.text_size(&text, PLOT_FONT_SIZE);
            let ty = y0 - PLOT_TEXT_OFFSET - th as i32;
            blend_rect(
                image,
                x0 - PLOT_TEXT_PADDING,
                ty - PLOT_TEXT_PADDING,
                tw + 2 * PLOT_TEXT_PADDING as u32,
                th + 2 * PLOT_TEXT_PADDING as u32,
                PLOT_TEXT_BACKGROUND,
                PLOT_BACKGROUND_ALPHA,
            );
            self.draw_text(image, BOX_COLOR, x0, ty, PLOT_FONT_SIZE, &text);
        }
    }
}

fn pixel_box(det: &Detection) -> [i32; 4] {
    det.bbox.map(|v| v.round() as i32)
}

/// Outline `thickness` pixels wide, growing inwards from the given corners
/// (both inclusive).
pub fn draw_thick_rect(image: &mut RgbImage, corners: [i32; 4], thickness: i32, color: Rgb<u8>) {
    let [x0, y0, x1, y1] = corners;
    for i in 0..thickness {
        let (left, top, right, bottom) = (x0 + i, y0 + i, x1 - i, y1 - i);
        if right < left || bottom < top {
            break;
        }
        let rect =
            Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Alpha-blends `color` over a rectangle, clipped to the image.
pub fn blend_rect(
    image: &mut RgbImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
    alpha: f32,
) {
    let x_end = (x + width as i32).min(image.width() as i32);
    let y_end = (y + height as i32).min(image.height() as i32);
    for py in y.max(0)..y_end {
        for px in x.max(0)..x_end {
            let pixel = image.get_pixel_mut(px as u32, py as u32);
            for c in 0..3 {
                let blended = alpha * color[c] as f32 + (1.0 - alpha) * pixel[c] as f32;
                pixel[c] = blended.round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn jacket() -> Detection {
        Detection {
            label: "jacket".into(),
            score: 0.87,
            bbox: [20.0, 40.0, 80.0, 90.0],
        }
    }

    #[test]
    fn chip_style_draws_three_pixel_outline() {
        let mut image = RgbImage::from_pixel(100, 100, BLACK);
        Annotator::new(None).draw_chips(&mut image, &[jacket()]);

        assert_eq!(*image.get_pixel(20, 60), BOX_COLOR);
        assert_eq!(*image.get_pixel(22, 60), BOX_COLOR);
        assert_eq!(*image.get_pixel(23, 60), BLACK);
        assert_eq!(*image.get_pixel(80, 90), BOX_COLOR);
        assert_eq!(*image.get_pixel(50, 70), BLACK);
    }

    #[test]
    fn chip_sits_on_top_edge() {
        let mut image = RgbImage::from_pixel(100, 100, BLACK);
        Annotator::new(None).draw_chips(&mut image, &[jacket()]);

        // chip spans rows 20..=40 without a font (16 px text + 4 px padding)
        assert_eq!(*image.get_pixel(25, 21), BOX_COLOR);
        assert_eq!(*image.get_pixel(25, 39), BOX_COLOR);
        assert_eq!(*image.get_pixel(25, 19), BLACK);
        assert_eq!(*image.get_pixel(19, 30), BLACK);
    }

    #[test]
    fn chip_is_clipped_at_image_top() {
        let mut image = RgbImage::from_pixel(100, 100, BLACK);
        let det = Detection {
            bbox: [10.0, 2.0, 50.0, 50.0],
            ..jacket()
        };
        Annotator::new(None).draw_chips(&mut image, &[det]);
        assert_eq!(*image.get_pixel(15, 0), BOX_COLOR);
    }

    #[test]
    fn plot_style_blends_label_background() {
        let mut image = RgbImage::from_pixel(100, 100, BLACK);
        Annotator::new(None).draw_plot(&mut image, &[jacket()]);

        assert_eq!(*image.get_pixel(21, 60), BOX_COLOR);
        assert_eq!(*image.get_pixel(22, 60), BLACK);
        // 0.7 white over black
        let bg = image.get_pixel(25, 30);
        assert!((178..=179).contains(&bg[0]) && bg[0] == bg[1] && bg[1] == bg[2]);
        // gap between label and box stays untouched
        assert_eq!(*image.get_pixel(25, 39), BLACK);
    }

    #[test]
    fn thick_rect_handles_degenerate_boxes() {
        let mut image = RgbImage::from_pixel(10, 10, BLACK);
        draw_thick_rect(&mut image, [5, 5, 5, 5], 3, BOX_COLOR);
        assert_eq!(*image.get_pixel(5, 5), BOX_COLOR);
        assert_eq!(*image.get_pixel(6, 5), BLACK);
    }

    #[test]
    fn missing_font_path_falls_back() {
        let annotator = Annotator::from_font_path(Some(Path::new("no/such/font.ttf")));
        // either a system font or none; drawing must work in both cases
        let mut image = RgbImage::from_pixel(100, 100, BLACK);
        annotator.draw_chips(&mut image, &[jacket()]);
        assert_eq!(*image.get_pixel(20, 60), BOX_COLOR);
    }
}
