use palette::{FromColor, Hsl, Srgb};
use serde::Serialize;

use crate::catalog::CropStatistic;

/// Base color used when the user has not picked one.
pub const DEFAULT_BASE_COLOR: &str = "#4CAF50";

/// Lightness (percent) of the lowest value on the ramp.
const LIGHTNESS_LIGHT: f64 = 85.0;
/// Total lightness drop from the lowest to the highest value.
const LIGHTNESS_SPAN: f64 = 70.0;
const SATURATION_FLOOR: f64 = 20.0;
const SATURATION_DROP: f64 = 10.0;

type SrgbHsl = Hsl<palette::encoding::Srgb, f64>;

/// Harvested-area range of the currently loaded crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1000.0 }
    }
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range over the strictly positive harvested areas, or the default
    /// `0..1000` when no municipality produced the crop.
    pub fn from_statistics<'a, I>(stats: I) -> Self
    where
        I: IntoIterator<Item = &'a CropStatistic>,
    {
        let mut range: Option<(f64, f64)> = None;
        for area in stats.into_iter().map(|s| s.harvested_area).filter(|a| *a > 0.0) {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(area), hi.max(area)),
                None => (area, area),
            });
        }

        match range {
            Some((min, max)) => Self { min, max },
            None => Self::default(),
        }
    }

    /// Clamped bounds used by the logarithmic scale. The lower bound is at
    /// least 1 and the upper bound spans at least one decade above it, so the
    /// log range is never zero.
    pub fn adjusted(&self) -> (f64, f64) {
        let adjusted_min = self.min.max(1.0);
        let adjusted_max = self.max.max(adjusted_min * 10.0);
        (adjusted_min, adjusted_max)
    }

    /// Position of `value` on the log scale, in `[0, 1]`.
    ///
    /// Values at or below zero are treated as one hectare. Values above the
    /// adjusted maximum saturate at 1.
    pub fn normalize(&self, value: f64) -> f64 {
        let value = if value > 0.0 { value } else { 1.0 };
        let (adjusted_min, adjusted_max) = self.adjusted();

        let log_min = adjusted_min.ln();
        let log_max = adjusted_max.ln();
        let log_value = value.max(adjusted_min).ln();

        ((log_value - log_min) / (log_max - log_min)).clamp(0.0, 1.0)
    }
}

/// Sequential light-to-dark ramp around a single base hue.
#[derive(Debug, Clone)]
pub struct ColorScale {
    range: ValueRange,
    base_color: String,
    base_hsl: Option<(f64, f64, f64)>,
}

impl ColorScale {
    pub fn new(range: ValueRange, base_color: &str) -> Self {
        let base_hsl = parse_hex(base_color).map(|(r, g, b)| rgb_to_hsl(r, g, b));
        Self {
            range,
            base_color: base_color.to_string(),
            base_hsl,
        }
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    pub fn base_color(&self) -> &str {
        &self.base_color
    }

    pub fn color_for(&self, value: f64) -> String {
        let Some((hue, base_saturation, _)) = self.base_hsl else {
            return self.base_color.clone();
        };

        let t = self.range.normalize(value);
        let lightness = LIGHTNESS_LIGHT - t * LIGHTNESS_SPAN;
        let saturation = (base_saturation - t * SATURATION_DROP).max(SATURATION_FLOOR);

        let (r, g, b) = hsl_to_rgb(hue, saturation, lightness);
        to_hex(r, g, b)
    }
}

/// Color for `value` on the log scale spanned by `min..max`.
///
/// A `base_color` that is not a six-digit hex string is returned unchanged.
pub fn color_for(value: f64, min: f64, max: f64, base_color: &str) -> String {
    ColorScale::new(ValueRange::new(min, max), base_color).color_for(value)
}

/// Parse `#rrggbb` (the `#` is optional, case-insensitive).
pub fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
    let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
    Some((r, g, b))
}

pub fn to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// RGB to HSL with hue in degrees `[0, 360)` and saturation/lightness in percent.
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let rgb: Srgb<f64> = Srgb::new(r, g, b).into_format();
    let hsl = SrgbHsl::from_color(rgb);
    (
        hsl.hue.into_positive_degrees(),
        hsl.saturation * 100.0,
        hsl.lightness * 100.0,
    )
}

/// HSL (degrees, percent, percent) to 8-bit RGB, rounding each channel.
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let hsl = SrgbHsl::new(h, (s / 100.0).clamp(0.0, 1.0), (l / 100.0).clamp(0.0, 1.0));
    let rgb: Srgb<u8> = Srgb::<f64>::from_color(hsl).into_format();
    (rgb.red, rgb.green, rgb.blue)
}
