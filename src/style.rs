use geojson::Feature;
use serde::Serialize;

use crate::catalog::{CropStatistic, StatisticsByCode};
use crate::color::ColorScale;
use crate::properties::PropertyAliases;

pub const NO_DATA_FILL: &str = "#E8E8E8";
pub const NO_DATA_BORDER: &str = "#CCCCCC";
pub const DATA_BORDER: &str = "#666666";
pub const UNKNOWN_NAME: &str = "Nome não disponível";

/// Fill and stroke of one municipality polygon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderStyle {
    pub fill_color: String,
    pub border_color: String,
    pub fill_opacity: f64,
    pub border_weight: f64,
    pub border_opacity: f64,
}

impl RenderStyle {
    /// Flat light gray for municipalities without harvested area.
    pub fn no_data() -> Self {
        Self {
            fill_color: NO_DATA_FILL.to_string(),
            border_color: NO_DATA_BORDER.to_string(),
            fill_opacity: 0.6,
            border_weight: 0.3,
            border_opacity: 0.8,
        }
    }

    pub fn colored(fill_color: String) -> Self {
        Self {
            fill_color,
            border_color: DATA_BORDER.to_string(),
            fill_opacity: 0.7,
            border_weight: 0.3,
            border_opacity: 0.8,
        }
    }

    pub fn is_no_data(&self) -> bool {
        *self == Self::no_data()
    }
}

/// What the popup of a municipality shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub municipality_name: String,
    pub state_code: Option<String>,
    pub municipality_code: Option<String>,
    pub crop: String,
    /// `None` renders as "data not available".
    pub harvested_area: Option<f64>,
}

/// Joins boundary features with the statistics of the selected crop.
pub struct LayerJoiner<'a> {
    statistics: &'a StatisticsByCode,
    scale: &'a ColorScale,
    aliases: &'a PropertyAliases,
}

impl<'a> LayerJoiner<'a> {
    pub fn new(statistics: &'a StatisticsByCode, scale: &'a ColorScale, aliases: &'a PropertyAliases) -> Self {
        Self {
            statistics,
            scale,
            aliases,
        }
    }

    /// Statistic with a positive harvested area for the feature, if any.
    fn statistic_for(&self, feature: &Feature) -> Option<&'a CropStatistic> {
        let code = self.aliases.code(feature)?;
        self.statistics
            .get(&code)
            .filter(|stat| stat.harvested_area > 0.0)
    }

    pub fn style_for(&self, feature: &Feature) -> RenderStyle {
        match self.statistic_for(feature) {
            Some(stat) => RenderStyle::colored(self.scale.color_for(stat.harvested_area)),
            None => RenderStyle::no_data(),
        }
    }

    pub fn popup_for(&self, feature: &Feature, crop: &str) -> Popup {
        Popup {
            municipality_name: self
                .aliases
                .name(feature)
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            state_code: self.aliases.state(feature),
            municipality_code: self.aliases.code(feature),
            crop: crop.to_string(),
            harvested_area: self.statistic_for(feature).map(|s| s.harvested_area),
        }
    }
}
