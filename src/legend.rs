use serde::Serialize;

use crate::color::{ColorScale, ValueRange};

/// Swatch shown for municipalities without data.
pub const NO_DATA_SWATCH: &str = "#F5F5F5";
pub const NO_DATA_LABEL: &str = "Sem dados";
pub const UNIT_LABEL: &str = "Hectares colhidos";
pub const DEFAULT_STEPS: usize = 6;

/// One swatch of the legend. `value` is `None` only for the no-data entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub value: Option<f64>,
    pub color: String,
    pub label: String,
}

/// Shown under the title while a radius filter is active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadiusNote {
    pub radius_km: f64,
    pub municipality_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: String,
    pub radius_note: Option<RadiusNote>,
    pub unit_label: String,
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    pub fn new(title: &str, range: ValueRange, base_color: &str, steps: usize) -> Self {
        Self {
            title: title.to_string(),
            radius_note: None,
            unit_label: UNIT_LABEL.to_string(),
            entries: build_legend(range, base_color, steps),
        }
    }

    pub fn with_radius_note(mut self, note: RadiusNote) -> Self {
        self.radius_note = Some(note);
        self
    }

    /// Entries on the numeric scale, without the no-data swatch.
    pub fn scale_entries(&self) -> impl Iterator<Item = &LegendEntry> {
        self.entries.iter().filter(|e| e.value.is_some())
    }
}

/// Log-spaced legend swatches from the adjusted minimum to the adjusted
/// maximum, followed by the fixed no-data swatch.
pub fn build_legend(range: ValueRange, base_color: &str, steps: usize) -> Vec<LegendEntry> {
    let steps = steps.max(2);
    let (adjusted_min, adjusted_max) = range.adjusted();
    let scale = ColorScale::new(ValueRange::new(adjusted_min, adjusted_max), base_color);

    let log_min = adjusted_min.ln();
    let log_max = adjusted_max.ln();

    let mut entries: Vec<LegendEntry> = (0..steps)
        .map(|i| {
            let value = if i == 0 {
                adjusted_min
            } else if i == steps - 1 {
                adjusted_max
            } else {
                (log_min + (log_max - log_min) * (i as f64 / (steps - 1) as f64)).exp()
            };

            LegendEntry {
                value: Some(value),
                color: scale.color_for(value),
                label: hectare_label(value),
            }
        })
        .collect();

    entries.push(LegendEntry {
        value: None,
        color: NO_DATA_SWATCH.to_string(),
        label: NO_DATA_LABEL.to_string(),
    });

    entries
}

/// `"251 ha"` below a thousand, `"63,1k ha"` above.
pub fn hectare_label(value: f64) -> String {
    if value < 1000.0 {
        format!("{} ha", format_pt_br(value, 0))
    } else {
        format!("{}k ha", format_pt_br(value / 1000.0, 1))
    }
}

/// Brazilian Portuguese number formatting: `.` groups thousands, `,` marks
/// decimals, trailing fractional zeros are dropped.
pub fn format_pt_br(value: f64, max_fraction_digits: usize) -> String {
    // Ties round away from zero; `format!` alone would round them to even.
    let scale = 10f64.powi(max_fraction_digits as i32);
    let rounded = (value.abs() * scale).round() / scale;
    let text = format!("{:.*}", max_fraction_digits, rounded);
    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part.trim_end_matches('0')),
        None => (text.as_str(), ""),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let negative = value < 0.0 && (int_part.bytes().any(|b| b != b'0') || !frac_part.is_empty());
    let sign = if negative { "-" } else { "" };

    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{},{}", sign, grouped, frac_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::DEFAULT_BASE_COLOR;

    #[test]
    fn six_steps_plus_no_data() {
        let entries = build_legend(ValueRange::new(1.0, 1_000_000.0), DEFAULT_BASE_COLOR, 6);
        assert_eq!(entries.len(), 7);

        let values: Vec<f64> = entries.iter().filter_map(|e| e.value).collect();
        assert_eq!(values.len(), 6);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(values[0], 1.0);
        assert_eq!(values[5], 1_000_000.0);

        let last = entries.last().unwrap();
        assert_eq!(last.value, None);
        assert_eq!(last.color, NO_DATA_SWATCH);
    }

    #[test]
    fn labels_follow_log_spacing() {
        let entries = build_legend(ValueRange::new(1.0, 1_000_000.0), DEFAULT_BASE_COLOR, 6);
        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["1 ha", "16 ha", "251 ha", "4k ha", "63,1k ha", "1.000k ha", NO_DATA_LABEL]
        );
    }

    #[test]
    fn colors_darken_along_the_scale() {
        let entries = build_legend(ValueRange::new(10.0, 100_000.0), "#FF9800", 4);
        let colors: Vec<&str> = entries.iter().map(|e| e.color.as_str()).collect();
        assert_eq!(colors.len(), 5);
        // Each step differs from its neighbour.
        assert!(colors[..4].windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn degenerate_range_is_widened() {
        let entries = build_legend(ValueRange::new(0.0, 0.0), DEFAULT_BASE_COLOR, 6);
        let values: Vec<f64> = entries.iter().filter_map(|e| e.value).collect();
        assert_eq!(values.first(), Some(&1.0));
        assert_eq!(values.last(), Some(&10.0));
    }

    #[test]
    fn too_few_steps_still_covers_range() {
        let entries = build_legend(ValueRange::new(5.0, 500.0), DEFAULT_BASE_COLOR, 1);
        let values: Vec<f64> = entries.iter().filter_map(|e| e.value).collect();
        assert_eq!(values, vec![5.0, 500.0]);
    }

    #[test]
    fn building_twice_is_identical() {
        let range = ValueRange::new(12.0, 48_000.0);
        assert_eq!(
            build_legend(range, DEFAULT_BASE_COLOR, 6),
            build_legend(range, DEFAULT_BASE_COLOR, 6)
        );
    }

    #[test]
    fn pt_br_number_format() {
        assert_eq!(format_pt_br(0.0, 0), "0");
        assert_eq!(format_pt_br(999.4, 0), "999");
        assert_eq!(format_pt_br(1234567.0, 0), "1.234.567");
        assert_eq!(format_pt_br(15.849, 1), "15,8");
        assert_eq!(format_pt_br(4.0, 1), "4");
        assert_eq!(format_pt_br(1000.0, 1), "1.000");
        assert_eq!(format_pt_br(-2500.5, 1), "-2.500,5");
    }

    #[test]
    fn half_way_labels_round_up() {
        assert_eq!(hectare_label(2.5), "3 ha");
        assert_eq!(hectare_label(12250.0), "12,3k ha");
        assert_eq!(hectare_label(4250.0), "4,3k ha");
        assert_eq!(format_pt_br(-0.5, 0), "-1");
    }

    #[test]
    fn radius_note_is_attached() {
        let legend = Legend::new("Soja", ValueRange::default(), DEFAULT_BASE_COLOR, 6).with_radius_note(
            RadiusNote {
                radius_km: 50.0,
                municipality_count: 12,
            },
        );
        assert_eq!(legend.radius_note.map(|n| n.municipality_count), Some(12));
        assert_eq!(legend.scale_entries().count(), 6);
    }
}
