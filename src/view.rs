//! Explicit map view state.
//!
//! Everything a render pass depends on lives in [`MapViewState`]: the loaded
//! crop and its value range, the base color, the active filters and the full
//! boundary collection. A render pass is a pure function of that state.

use geo::Rect;
use geojson::{Feature, FeatureCollection};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::StatisticsByCode;
use crate::color::{ColorScale, DEFAULT_BASE_COLOR, ValueRange};
use crate::legend::{DEFAULT_STEPS, Legend, RadiusNote};
use crate::properties::PropertyAliases;
use crate::spatial::{RadiusFilter, brazil_bounds, filter_by_radius, filter_by_state, layer_bounds};
use crate::style::{LayerJoiner, Popup, RenderStyle};

/// User-selected filters. Both may be set; see [`MapViewState::render`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterState {
    pub state_filter: Option<String>,
    pub radius_filter: Option<RadiusFilter>,
}

/// Statistics of the crop currently on the map.
#[derive(Debug, Clone)]
pub struct LoadedCrop {
    pub name: String,
    pub statistics: StatisticsByCode,
    pub range: ValueRange,
}

#[derive(Debug, Clone)]
pub struct MapViewState {
    crop: Option<LoadedCrop>,
    base_color: String,
    legend_steps: usize,
    filter: FilterState,
    /// `None` until a collection is set; a set collection may be empty.
    boundaries: Option<Vec<Feature>>,
    aliases: PropertyAliases,
}

impl Default for MapViewState {
    fn default() -> Self {
        Self::new(PropertyAliases::default())
    }
}

impl MapViewState {
    pub fn new(aliases: PropertyAliases) -> Self {
        Self {
            crop: None,
            base_color: DEFAULT_BASE_COLOR.to_string(),
            legend_steps: DEFAULT_STEPS,
            filter: FilterState::default(),
            boundaries: None,
            aliases,
        }
    }

    /// Replace the current crop and recompute the value range.
    pub fn load_crop(&mut self, name: &str, statistics: StatisticsByCode) {
        let range = ValueRange::from_statistics(statistics.values());
        info!(crop = name, municipalities = statistics.len(), min = range.min, max = range.max, "crop loaded");
        self.crop = Some(LoadedCrop {
            name: name.to_string(),
            statistics,
            range,
        });
    }

    /// Override the range computed from the statistics, e.g. for the
    /// demonstration dataset.
    pub fn set_range(&mut self, range: ValueRange) {
        if let Some(crop) = self.crop.as_mut() {
            crop.range = range;
        }
    }

    pub fn set_boundaries(&mut self, collection: FeatureCollection) {
        debug!(features = collection.features.len(), "boundaries set");
        self.boundaries = Some(collection.features);
    }

    pub fn set_base_color(&mut self, color: &str) {
        self.base_color = color.to_string();
    }

    pub fn set_legend_steps(&mut self, steps: usize) {
        self.legend_steps = steps;
    }

    pub fn set_state_filter(&mut self, state_code: Option<String>) {
        self.filter.state_filter = state_code;
    }

    pub fn set_radius_filter(&mut self, filter: RadiusFilter) {
        self.filter.radius_filter = Some(filter);
    }

    pub fn clear_radius(&mut self) {
        self.filter.radius_filter = None;
    }

    pub fn crop(&self) -> Option<&LoadedCrop> {
        self.crop.as_ref()
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn boundaries(&self) -> &[Feature] {
        self.boundaries.as_deref().unwrap_or(&[])
    }

    pub fn aliases(&self) -> &PropertyAliases {
        &self.aliases
    }

    /// Style every selected municipality and build the legend.
    ///
    /// With a radius filter set, the radius is applied to the full boundary
    /// set and the state filter is ignored. Otherwise the state filter
    /// narrows the boundaries. Returns `None` until both a crop and
    /// boundaries are loaded. An empty collection renders an empty layer
    /// framed on Brazil.
    pub fn render(&self) -> Option<RenderPass<'_>> {
        let crop = self.crop.as_ref()?;
        let boundaries = self.boundaries.as_deref()?;

        let selected = match &self.filter.radius_filter {
            Some(radius) => filter_by_radius(boundaries, radius),
            None => filter_by_state(boundaries, self.filter.state_filter.as_deref(), &self.aliases),
        };

        let scale = ColorScale::new(crop.range, &self.base_color);
        let joiner = LayerJoiner::new(&crop.statistics, &scale, &self.aliases);
        let features: Vec<StyledFeature<'_>> = selected
            .par_iter()
            .map(|&feature| StyledFeature {
                feature,
                style: joiner.style_for(feature),
                popup: joiner.popup_for(feature, &crop.name),
            })
            .collect();

        let mut legend = Legend::new(&crop.name, crop.range, &self.base_color, self.legend_steps);
        if let Some(radius) = &self.filter.radius_filter {
            legend = legend.with_radius_note(RadiusNote {
                radius_km: radius.radius_km,
                municipality_count: features.len(),
            });
            info!(count = features.len(), radius_km = radius.radius_km, "radius filter applied");
        }

        let bounds = layer_bounds(&selected).unwrap_or_else(brazil_bounds);

        Some(RenderPass {
            crop: crop.name.clone(),
            features,
            legend,
            bounds,
        })
    }
}

/// A municipality as drawn: its geometry, style and popup data.
#[derive(Debug, Clone)]
pub struct StyledFeature<'a> {
    pub feature: &'a Feature,
    pub style: RenderStyle,
    pub popup: Popup,
}

/// One complete drawing of the map. Each call to [`MapViewState::render`]
/// yields a fresh pass that replaces the previous one.
#[derive(Debug, Clone)]
pub struct RenderPass<'a> {
    pub crop: String,
    pub features: Vec<StyledFeature<'a>>,
    pub legend: Legend,
    /// Area the viewport should fit.
    pub bounds: Rect<f64>,
}

impl RenderPass<'_> {
    pub fn colored_count(&self) -> usize {
        self.features.iter().filter(|f| !f.style.is_no_data()).count()
    }
}
