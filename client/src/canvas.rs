use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use snapcam_common::dataurl::DataUrl;

use crate::filter::FilterState;

pub const SNAPSHOT_QUALITY: u8 = 92;
pub const ANALYSIS_QUALITY: u8 = 90;

const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;
const OVERLAY_ALPHA: f32 = 0.6;

/// 3x5 bitmap glyphs, enough for `HH:MM:SS`. Each row uses the low 3 bits,
/// most significant bit on the left.
const GLYPHS: [(char, [u8; 5]); 11] = [
    ('0', [0b111, 0b101, 0b101, 0b101, 0b111]),
    ('1', [0b010, 0b110, 0b010, 0b010, 0b111]),
    ('2', [0b111, 0b001, 0b111, 0b100, 0b111]),
    ('3', [0b111, 0b001, 0b111, 0b001, 0b111]),
    ('4', [0b101, 0b101, 0b111, 0b001, 0b001]),
    ('5', [0b111, 0b100, 0b111, 0b001, 0b111]),
    ('6', [0b111, 0b100, 0b111, 0b101, 0b111]),
    ('7', [0b111, 0b001, 0b010, 0b010, 0b010]),
    ('8', [0b111, 0b101, 0b111, 0b101, 0b111]),
    ('9', [0b111, 0b101, 0b111, 0b001, 0b111]),
    (':', [0b000, 0b010, 0b000, 0b010, 0b000]),
];

/// Composited output surface: what gets previewed, snapshotted, recorded
/// and analyzed.
#[derive(Debug, Default)]
pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Redraw from a camera frame. The canvas takes the frame's size.
    /// `software_zoom` > 1 crops the centre and scales it back up.
    pub fn draw(&mut self, frame: &RgbImage, filter: FilterState, software_zoom: f64, timestamp: &str) {
        let zoomed = zoom_center(frame.clone(), software_zoom);
        let mut composed = filter.apply(zoomed);
        draw_timestamp(&mut composed, timestamp);
        self.image = composed;
    }

    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, CanvasError> {
        if self.is_empty() {
            return Err(CanvasError::Empty);
        }
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality)
            .encode_image(&self.image)
            .map_err(|e| CanvasError::Encode(e.to_string()))?;
        Ok(buf)
    }

    pub fn to_data_url(&self, quality: u8) -> Result<DataUrl, CanvasError> {
        Ok(DataUrl::encode("image/jpeg", &self.to_jpeg(quality)?))
    }
}

fn zoom_center(frame: RgbImage, zoom: f64) -> RgbImage {
    if zoom <= 1.0 {
        return frame;
    }
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return frame;
    }
    let cw = ((w as f64 / zoom).round() as u32).clamp(1, w);
    let ch = ((h as f64 / zoom).round() as u32).clamp(1, h);
    let cropped = imageops::crop_imm(&frame, (w - cw) / 2, (h - ch) / 2, cw, ch).to_image();
    imageops::resize(&cropped, w, h, FilterType::Triangle)
}

/// Dark band with white time text in the bottom-left corner.
fn draw_timestamp(img: &mut RgbImage, text: &str) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let font_px = ((w as f64 * 0.03).floor() as u32).max(14);
    let scale = (font_px / GLYPH_HEIGHT).max(1);
    let text_w = text.chars().count() as u32 * (GLYPH_WIDTH + 1) * scale;

    let band_h = font_px + 12;
    let band_w = (text_w + 16).max(200);
    let band_y = h.saturating_sub(font_px + 18);
    darken_rect(img, 10, band_y, band_w, band_h);

    let text_y = band_y + band_h.saturating_sub(GLYPH_HEIGHT * scale) / 2;
    draw_text(img, 18, text_y, text, scale);
}

fn darken_rect(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32) {
    let x1 = (x0 + w).min(img.width());
    let y1 = (y0 + h).min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            let px = img.get_pixel_mut(x, y);
            px.0 = px.0.map(|c| (c as f32 * (1.0 - OVERLAY_ALPHA)).round() as u8);
        }
    }
}

fn draw_text(img: &mut RgbImage, x0: u32, y0: u32, text: &str, scale: u32) {
    let white = Rgb([255, 255, 255]);
    for (i, ch) in text.chars().enumerate() {
        let Some((_, rows)) = GLYPHS.iter().find(|(c, _)| *c == ch) else {
            continue;
        };
        let gx = x0 + i as u32 * (GLYPH_WIDTH + 1) * scale;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0b100 >> col) == 0 {
                    continue;
                }
                let px0 = gx + col * scale;
                let py0 = y0 + row as u32 * scale;
                for y in py0..(py0 + scale).min(img.height()) {
                    for x in px0..(px0 + scale).min(img.width()) {
                        img.put_pixel(x, y, white);
                    }
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("canvas has no frame yet")]
    Empty,
    #[error("failed to encode canvas: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapcam_common::dataurl::strip_data_url_prefix;

    fn gray(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([128, 128, 128]))
    }

    #[test]
    fn empty_canvas_cannot_encode() {
        assert!(matches!(Canvas::new().to_jpeg(90), Err(CanvasError::Empty)));
    }

    #[test]
    fn draw_adopts_frame_size() {
        let mut canvas = Canvas::new();
        canvas.draw(&gray(320, 240), FilterState::None, 1.0, "12:34:56");
        assert_eq!(canvas.dimensions(), (320, 240));
        canvas.draw(&gray(640, 360), FilterState::None, 1.0, "12:34:56");
        assert_eq!(canvas.dimensions(), (640, 360));
    }

    #[test]
    fn overlay_darkens_bottom_left_and_writes_white() {
        let mut canvas = Canvas::new();
        canvas.draw(&gray(640, 480), FilterState::None, 1.0, "88:88:88");
        let img = canvas.image();
        // top-right corner untouched
        assert_eq!(img.get_pixel(630, 5), &Rgb([128, 128, 128]));
        // band edge, left of the text start
        assert_eq!(img.get_pixel(12, 470), &Rgb([51, 51, 51]));
        assert!(img.pixels().any(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn software_zoom_keeps_size() {
        let mut frame = gray(100, 50);
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));
        let out = zoom_center(frame, 2.0);
        assert_eq!(out.dimensions(), (100, 50));
        // the red corner is cropped away
        assert_ne!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn software_zoom_carries_into_captures() {
        let mut frame = gray(100, 50);
        for x in 0..10 {
            for y in 0..10 {
                frame.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }
        let mut canvas = Canvas::new();
        canvas.draw(&frame, FilterState::None, 1.0, "00:00:00");
        let unzoomed = image::load_from_memory(&canvas.to_jpeg(SNAPSHOT_QUALITY).unwrap())
            .unwrap()
            .to_rgb8();
        assert!(unzoomed.get_pixel(2, 2)[0] > 200);

        canvas.draw(&frame, FilterState::None, 2.0, "00:00:00");
        let zoomed = image::load_from_memory(&canvas.to_jpeg(SNAPSHOT_QUALITY).unwrap())
            .unwrap()
            .to_rgb8();
        assert_eq!(zoomed.dimensions(), (100, 50));
        assert!(zoomed.get_pixel(2, 2)[0] < 160);
    }

    #[test]
    fn encodes_jpeg_and_data_url() {
        let mut canvas = Canvas::new();
        canvas.draw(&gray(64, 48), FilterState::Sepia, 1.0, "00:00:00");
        let jpeg = canvas.to_jpeg(SNAPSHOT_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let url = canvas.to_data_url(ANALYSIS_QUALITY).unwrap().to_string();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert!(!strip_data_url_prefix(&url).contains(','));
    }
}
