use image::{imageops, DynamicImage, RgbImage};

/// Colour filter applied to the live canvas and to recorded frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterState {
    #[default]
    None,
    Grayscale,
    Sepia,
    Invert,
    Blur,
}

/// Gaussian sigma for `blur(4px)`.
const BLUR_SIGMA: f32 = 4.0;

impl FilterState {
    /// Unknown names select no filter.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "grayscale" => Self::Grayscale,
            "sepia" => Self::Sepia,
            "invert" => Self::Invert,
            "blur" => Self::Blur,
            _ => Self::None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
            Self::Invert => "invert",
            Self::Blur => "blur",
        }
    }

    /// The filter expression this state stands for, in CSS filter syntax.
    pub fn expression(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale(100%)",
            Self::Sepia => "sepia(100%)",
            Self::Invert => "invert(100%)",
            Self::Blur => "blur(4px)",
        }
    }

    pub fn apply(self, frame: RgbImage) -> RgbImage {
        match self {
            Self::None => frame,
            Self::Grayscale => DynamicImage::ImageLuma8(imageops::grayscale(&frame)).to_rgb8(),
            Self::Sepia => sepia(frame),
            Self::Invert => {
                let mut frame = frame;
                imageops::invert(&mut frame);
                frame
            }
            Self::Blur => imageops::blur(&frame, BLUR_SIGMA),
        }
    }
}

/// Full-strength sepia, same matrix browsers use for `sepia(100%)`.
fn sepia(mut frame: RgbImage) -> RgbImage {
    for px in frame.pixels_mut() {
        let [r, g, b] = px.0.map(f32::from);
        let tone = |cr: f32, cg: f32, cb: f32| (r * cr + g * cg + b * cb).round().min(255.0) as u8;
        px.0 = [
            tone(0.393, 0.769, 0.189),
            tone(0.349, 0.686, 0.168),
            tone(0.272, 0.534, 0.131),
        ];
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn default_is_none() {
        assert_eq!(FilterState::default(), FilterState::None);
        assert_eq!(FilterState::default().expression(), "none");
    }

    #[test]
    fn each_filter_has_fixed_expression() {
        let expected = [
            (FilterState::Grayscale, "grayscale(100%)"),
            (FilterState::Sepia, "sepia(100%)"),
            (FilterState::Invert, "invert(100%)"),
            (FilterState::Blur, "blur(4px)"),
            (FilterState::None, "none"),
        ];
        for (filter, expr) in expected {
            assert_eq!(FilterState::from_name(filter.name()), filter);
            assert_eq!(filter.expression(), expr);
        }
    }

    #[test]
    fn unknown_name_falls_back_to_none() {
        assert_eq!(FilterState::from_name("vintage"), FilterState::None);
        assert_eq!(FilterState::from_name(""), FilterState::None);
        assert_eq!(FilterState::from_name(" Sepia "), FilterState::Sepia);
    }

    #[test]
    fn invert_flips_channels() {
        let frame = RgbImage::from_pixel(2, 2, Rgb([10, 200, 255]));
        let out = FilterState::Invert.apply(frame);
        assert_eq!(out.get_pixel(0, 0), &Rgb([245, 55, 0]));
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let frame = RgbImage::from_pixel(2, 2, Rgb([200, 40, 90]));
        let out = FilterState::Grayscale.apply(frame);
        let Rgb([r, g, b]) = *out.get_pixel(1, 1);
        assert!(r == g && g == b);
    }

    #[test]
    fn sepia_saturates_white() {
        let frame = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        let out = FilterState::Sepia.apply(frame);
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 255, 239]));
    }

    #[test]
    fn blur_keeps_dimensions() {
        let frame = RgbImage::from_pixel(16, 9, Rgb([0, 0, 0]));
        let out = FilterState::Blur.apply(frame);
        assert_eq!(out.dimensions(), (16, 9));
    }
}
