use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde::Serialize;
use serde_json::json;
use std::path::Path;

use crate::analysis::ExportRow;
use crate::view::{RenderPass, StyledFeature};

/// Convert a render pass to a styled GeoJSON FeatureCollection.
///
/// Styles use the simplestyle property names understood by most GeoJSON
/// viewers; the legend travels as a foreign member.
pub fn to_geojson(pass: &RenderPass) -> GeoJson {
    let features: Vec<Feature> = pass.features.iter().map(styled_to_feature).collect();

    let mut foreign_members = JsonObject::new();
    foreign_members.insert("crop".to_string(), json!(pass.crop));
    foreign_members.insert("legend".to_string(), json!(pass.legend));

    let (min, max) = (pass.bounds.min(), pass.bounds.max());
    GeoJson::FeatureCollection(FeatureCollection {
        bbox: Some(vec![min.x, min.y, max.x, max.y]),
        features,
        foreign_members: Some(foreign_members),
    })
}

fn styled_to_feature(styled: &StyledFeature) -> Feature {
    let mut properties = styled.feature.properties.clone().unwrap_or_default();
    let style = &styled.style;

    properties.insert("fill".to_string(), json!(style.fill_color));
    properties.insert("fill-opacity".to_string(), json!(style.fill_opacity));
    properties.insert("stroke".to_string(), json!(style.border_color));
    properties.insert("stroke-width".to_string(), json!(style.border_weight));
    properties.insert("stroke-opacity".to_string(), json!(style.border_opacity));
    properties.insert("popup".to_string(), json!(styled.popup));

    Feature {
        bbox: styled.feature.bbox.clone(),
        geometry: styled.feature.geometry.clone(),
        id: styled.feature.id.clone(),
        properties: Some(properties),
        foreign_members: styled.feature.foreign_members.clone(),
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_csv(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
