use anyhow::{Context, Result, anyhow};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::catalog::{CropLookup, CropStatistic, StatisticRecord, StatisticsByCode, statistics_from_records};
use crate::color::ValueRange;

const USER_AGENT: &str = "crop-map/0.1 (harvested area choropleth)";

/// Boundary files tried in order when none are configured.
pub const DEFAULT_BOUNDARY_SOURCES: &[&str] = &[
    "static/data/brazil_municipalities_all.geojson",
    "static/data/brazil_municipalities_combined.geojson",
    "static/data/br_municipalities_simplified.geojson",
];

/// Where a data feed comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    File(PathBuf),
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow!("empty source"));
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(Source::Url(s.to_string()))
        } else {
            Ok(Source::File(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => f.write_str(url),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

pub enum FetchProgress<'a> {
    Trying(&'a Source),
    Failed(&'a Source, &'a anyhow::Error),
    Loaded(&'a Source, usize),
}

pub fn http_client() -> Result<reqwest::blocking::Client> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Fetch a URL, using a cached file if it exists.
fn fetch_cached(
    client: &reqwest::blocking::Client,
    url: &str,
    cache_path: &Path,
) -> Result<String> {
    if cache_path.exists() {
        return std::fs::read_to_string(cache_path).context("Failed to read cache file");
    }

    let response = client.get(url).send()?.error_for_status()?;
    let body = response.text()?;

    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(cache_path, &body).context("Failed to write cache file")?;
    Ok(body)
}

/// Cache file name for a URL: every non-alphanumeric byte becomes `_`.
fn cache_file_name(url: &str) -> String {
    let stem: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    format!("{}.cache", stem)
}

#[derive(Debug, Deserialize)]
struct CropDataResponse {
    success: bool,
    #[serde(default)]
    data: BTreeMap<String, StatisticRecord>,
    #[serde(default)]
    matched_crop: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Fetch statistics for `crop` from `{api_base}/api/crop-data/{crop}`.
///
/// Transport errors and `success: false` payloads are both errors; there is
/// no retry.
pub fn fetch_crop_statistics(
    client: &reqwest::blocking::Client,
    api_base: &str,
    crop: &str,
) -> Result<CropLookup> {
    let mut url = reqwest::Url::parse(api_base).with_context(|| format!("Invalid API base URL: {}", api_base))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("API base URL cannot have a path: {}", api_base))?
        .pop_if_empty()
        .extend(["api", "crop-data", crop]);

    debug!(%url, "fetching crop statistics");
    let body = client
        .get(url.clone())
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .with_context(|| format!("Connection error while loading crop data from {}", url))?;

    parse_crop_response(&body, crop)
}

/// Parse a crop-data API payload.
pub fn parse_crop_response(json: &str, crop: &str) -> Result<CropLookup> {
    let resp: CropDataResponse = serde_json::from_str(json).context("Failed to parse crop data response")?;
    if !resp.success {
        return Err(anyhow!(
            "Error loading crop data: {}",
            resp.error.as_deref().unwrap_or("unknown error")
        ));
    }

    Ok(CropLookup {
        crop: resp.matched_crop.clone().unwrap_or_else(|| crop.to_string()),
        matched_crop: resp.matched_crop,
        statistics: statistics_from_records(resp.data),
    })
}

/// Parse a GeoJSON document that must be a FeatureCollection.
pub fn parse_feature_collection(text: &str) -> Result<FeatureCollection> {
    match GeoJson::from_str(text).context("Failed to parse GeoJSON")? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection")),
    }
}

fn load_source(source: &Source, client: &reqwest::blocking::Client, cache_dir: &Path) -> Result<FeatureCollection> {
    let text = match source {
        Source::Url(url) => fetch_cached(client, url, &cache_dir.join(cache_file_name(url)))?,
        Source::File(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read boundaries: {}", path.display()))?,
    };
    parse_feature_collection(&text)
}

/// Municipality boundaries, or the demonstration dataset when every
/// candidate source failed.
#[derive(Debug, Clone)]
pub enum Boundaries {
    Loaded {
        source: Source,
        collection: FeatureCollection,
    },
    Demonstration(Demonstration),
}

/// Try each source in order; the first one that yields a FeatureCollection
/// wins.
pub fn load_boundaries(
    sources: &[Source],
    client: &reqwest::blocking::Client,
    cache_dir: &Path,
    on_progress: Option<&dyn Fn(FetchProgress)>,
) -> Boundaries {
    for source in sources {
        if let Some(cb) = &on_progress {
            cb(FetchProgress::Trying(source));
        }

        match load_source(source, client, cache_dir) {
            Ok(collection) => {
                if let Some(cb) = &on_progress {
                    cb(FetchProgress::Loaded(source, collection.features.len()));
                }
                return Boundaries::Loaded {
                    source: source.clone(),
                    collection,
                };
            }
            Err(err) => {
                debug!(%source, error = %err, "boundary source failed");
                if let Some(cb) = &on_progress {
                    cb(FetchProgress::Failed(source, &err));
                }
            }
        }
    }

    warn!("no boundary source could be loaded, using demonstration data");
    Boundaries::Demonstration(demonstration_dataset())
}

/// Illustrative stand-in used when no boundary file is reachable. The areas
/// are made up.
#[derive(Debug, Clone)]
pub struct Demonstration {
    pub collection: FeatureCollection,
    pub statistics: StatisticsByCode,
    pub range: ValueRange,
}

const DEMO_CITIES: &[(&str, f64, f64, &str)] = &[
    ("São Paulo", -23.5505, -46.6333, "SP"),
    ("Rio de Janeiro", -22.9068, -43.1729, "RJ"),
    ("Brasília", -15.7942, -47.8822, "DF"),
    ("Salvador", -12.9714, -38.5014, "BA"),
    ("Fortaleza", -3.7172, -38.5433, "CE"),
    ("Belo Horizonte", -19.9167, -43.9345, "MG"),
    ("Curitiba", -25.4244, -49.2654, "PR"),
    ("Porto Alegre", -30.0346, -51.2177, "RS"),
    ("Manaus", -3.1190, -60.0217, "AM"),
    ("Belém", -1.4558, -48.5044, "PA"),
    ("Goiânia", -16.6869, -49.2648, "GO"),
    ("Recife", -8.0476, -34.8770, "PE"),
];

pub fn demonstration_dataset() -> Demonstration {
    let mut features = Vec::with_capacity(DEMO_CITIES.len());
    let mut statistics = StatisticsByCode::new();

    for (i, &(name, lat, lng, uf)) in DEMO_CITIES.iter().enumerate() {
        let code = format!("DEMO{:02}", i + 1);
        let area = (i + 1) as f64 * 10_000.0 + 15_000.0;
        let marker_radius = (area / 5000.0).sqrt().max(8.0);

        let properties = json!({
            "GEOCODIGO": code,
            "NOME": name,
            "UF": uf,
            "marker_radius": marker_radius,
            "demonstration": true,
        });
        features.push(Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::Point(vec![lng, lat]))),
            id: None,
            properties: properties.as_object().cloned(),
            foreign_members: None,
        });
        statistics.insert(code.clone(), CropStatistic::new(&code, area, name, uf));
    }

    Demonstration {
        collection: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        statistics,
        range: ValueRange::new(10_000.0, 150_000.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"GEOCODIGO": "3550308", "UF": "SP"},
             "geometry": {"type": "Polygon", "coordinates": [[[-46.8, -23.7], [-46.4, -23.7], [-46.4, -23.4], [-46.8, -23.7]]]}}
        ]
    }"#;

    #[test]
    fn parse_successful_response() {
        let json = r#"{
            "success": true,
            "data": {
                "3550308": {"harvested_area": 5000, "municipality_name": "São Paulo", "state_code": "SP"},
                "3304557": {"municipality_name": "Rio de Janeiro", "state_code": "RJ"}
            }
        }"#;
        let lookup = parse_crop_response(json, "Cana").unwrap();
        assert_eq!(lookup.crop, "Cana");
        assert_eq!(lookup.matched_crop, None);
        assert_eq!(lookup.statistics["3550308"].harvested_area, 5000.0);
        assert_eq!(lookup.statistics["3304557"].harvested_area, 0.0);
    }

    #[test]
    fn parse_matched_crop() {
        let json = r#"{"success": true, "data": {}, "matched_crop": "Cana-de-açúcar"}"#;
        let lookup = parse_crop_response(json, "cana").unwrap();
        assert_eq!(lookup.crop, "Cana-de-açúcar");
        assert!(lookup.statistics.is_empty());
    }

    #[test]
    fn parse_failure_payload() {
        let json = r#"{"success": false, "error": "Cultura não encontrada"}"#;
        let err = parse_crop_response(json, "Trigo").unwrap_err();
        assert!(err.to_string().contains("Cultura não encontrada"));
    }

    #[test]
    fn source_kinds() {
        assert_eq!(
            "https://example.org/br.geojson".parse::<Source>().unwrap(),
            Source::Url("https://example.org/br.geojson".to_string())
        );
        assert_eq!(
            "static/data/br.geojson".parse::<Source>().unwrap(),
            Source::File(PathBuf::from("static/data/br.geojson"))
        );
        assert!("  ".parse::<Source>().is_err());
    }

    #[test]
    fn cache_names_are_flat() {
        assert_eq!(
            cache_file_name("https://example.org/data/br.geojson?v=2"),
            "example.org_data_br.geojson_v_2.cache"
        );
    }

    #[test]
    fn only_feature_collections_are_accepted() {
        assert!(parse_feature_collection(COLLECTION).is_ok());
        assert!(parse_feature_collection(r#"{"type": "Point", "coordinates": [0, 0]}"#).is_err());
        assert!(parse_feature_collection("not json").is_err());
    }

    #[test]
    fn first_working_source_wins() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.geojson");
        let good = dir.path().join("good.geojson");
        let later = dir.path().join("later.geojson");
        std::fs::write(&broken, "{").unwrap();
        std::fs::write(&good, COLLECTION).unwrap();
        std::fs::write(&later, COLLECTION).unwrap();

        let sources = vec![
            Source::File(dir.path().join("missing.geojson")),
            Source::File(broken),
            Source::File(good.clone()),
            Source::File(later),
        ];

        let tried = RefCell::new(Vec::new());
        let on_progress: &dyn Fn(FetchProgress) = &|p| {
            if let FetchProgress::Trying(source) = p {
                tried.borrow_mut().push(source.to_string());
            }
        };

        let client = http_client().unwrap();
        match load_boundaries(&sources, &client, dir.path(), Some(on_progress)) {
            Boundaries::Loaded { source, collection } => {
                assert_eq!(source, Source::File(good));
                assert_eq!(collection.features.len(), 1);
            }
            Boundaries::Demonstration(_) => panic!("expected a loaded source"),
        }
        assert_eq!(tried.borrow().len(), 3);
    }

    #[test]
    fn falls_back_to_demonstration() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![Source::File(dir.path().join("missing.geojson"))];
        let client = http_client().unwrap();

        match load_boundaries(&sources, &client, dir.path(), None) {
            Boundaries::Demonstration(demo) => {
                assert_eq!(demo.collection.features.len(), 12);
                assert_eq!(demo.statistics.len(), 12);
                assert_eq!(demo.range, ValueRange::new(10_000.0, 150_000.0));
            }
            Boundaries::Loaded { .. } => panic!("nothing should load"),
        }
    }

    #[test]
    fn demonstration_areas_are_deterministic() {
        let demo = demonstration_dataset();
        assert_eq!(demo.statistics["DEMO01"].harvested_area, 25_000.0);
        assert_eq!(demo.statistics["DEMO12"].harvested_area, 135_000.0);
        assert_eq!(demo.statistics["DEMO01"].state_code, "SP");
    }
}
