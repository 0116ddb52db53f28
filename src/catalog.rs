use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Harvested area of one crop in one municipality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropStatistic {
    pub municipality_code: String,
    /// Hectares, never negative.
    pub harvested_area: f64,
    pub municipality_name: String,
    pub state_code: String,
}

impl CropStatistic {
    pub fn new(code: &str, harvested_area: f64, name: &str, state_code: &str) -> Self {
        Self {
            municipality_code: code.to_string(),
            harvested_area,
            municipality_name: name.to_string(),
            state_code: state_code.to_string(),
        }
    }
}

/// Statistics of the selected crop, keyed by IBGE municipality code.
pub type StatisticsByCode = BTreeMap<String, CropStatistic>;

/// One municipality entry as it appears in the data files and API payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatisticRecord {
    #[serde(default)]
    pub harvested_area: Option<f64>,
    #[serde(default)]
    pub municipality_name: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
}

impl StatisticRecord {
    pub fn into_statistic(self, code: &str) -> CropStatistic {
        CropStatistic {
            municipality_code: code.to_string(),
            harvested_area: self.harvested_area.unwrap_or(0.0).max(0.0),
            municipality_name: self.municipality_name.unwrap_or_default(),
            state_code: self.state_code.unwrap_or_default(),
        }
    }
}

/// Convert a `{code: record}` payload into statistics.
pub fn statistics_from_records(records: BTreeMap<String, StatisticRecord>) -> StatisticsByCode {
    records
        .into_iter()
        .map(|(code, record)| {
            let stat = record.into_statistic(&code);
            (code, stat)
        })
        .collect()
}

/// The 27 federative units as (code, name).
pub const BRAZILIAN_STATES: &[(&str, &str)] = &[
    ("AC", "Acre"),
    ("AL", "Alagoas"),
    ("AP", "Amapá"),
    ("AM", "Amazonas"),
    ("BA", "Bahia"),
    ("CE", "Ceará"),
    ("DF", "Distrito Federal"),
    ("ES", "Espírito Santo"),
    ("GO", "Goiás"),
    ("MA", "Maranhão"),
    ("MT", "Mato Grosso"),
    ("MS", "Mato Grosso do Sul"),
    ("MG", "Minas Gerais"),
    ("PA", "Pará"),
    ("PB", "Paraíba"),
    ("PR", "Paraná"),
    ("PE", "Pernambuco"),
    ("PI", "Piauí"),
    ("RJ", "Rio de Janeiro"),
    ("RN", "Rio Grande do Norte"),
    ("RS", "Rio Grande do Sul"),
    ("RO", "Rondônia"),
    ("RR", "Roraima"),
    ("SC", "Santa Catarina"),
    ("SP", "São Paulo"),
    ("SE", "Sergipe"),
    ("TO", "Tocantins"),
];

/// Fragments that mark a regional aggregate rather than a municipality.
const REGION_KEYWORDS: &[&str] = &[
    "região",
    "mesorregião",
    "microrregião",
    "nordeste",
    "norte",
    "sul",
    "centro",
    "oeste",
    "leste",
    "sudeste",
    "noroeste",
    "sudoeste",
    "alto ",
    "baixo ",
    "médio ",
    "-grossense",
    "parecis",
    "araguaia",
    "pantanal",
    "cerrado",
    "amazônia",
    "caatinga",
    "mata atlântica",
];

const AGGREGATE_NAMES: &[&str] = &[
    "alto teles pires",
    "sudeste mato-grossense",
    "parecis",
    "barreiras",
    "dourados",
    "norte mato-grossense",
    "portal da amazônia",
];

/// Whether a record describes a real municipality: a 7-digit IBGE code
/// starting with 1-5 and a name that is not a regional aggregate.
pub fn is_municipality(code: &str, name: &str) -> bool {
    if code.len() != 7 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if !matches!(code.as_bytes()[0], b'1'..=b'5') {
        return false;
    }
    if name.is_empty() {
        return false;
    }

    let name = name.to_lowercase();
    !REGION_KEYWORDS.iter().any(|kw| name.contains(kw)) && !AGGREGATE_NAMES.contains(&name.as_str())
}

/// Result of resolving a crop name against the catalog.
#[derive(Debug, Clone)]
pub struct CropLookup {
    pub crop: String,
    /// Set when the requested name only matched approximately.
    pub matched_crop: Option<String>,
    pub statistics: StatisticsByCode,
}

/// Number of crops and distinct municipality codes in a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogTotals {
    pub total_crops: usize,
    pub total_municipalities: usize,
}

/// Precomputed harvested-area data for every crop.
#[derive(Debug, Clone, Default)]
pub struct CropCatalog {
    crops: BTreeMap<String, BTreeMap<String, StatisticRecord>>,
    /// Crop names in document order, which approximate lookups follow.
    load_order: Vec<String>,
}

impl CropCatalog {
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read crop data: {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Failed to parse crop data: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).context("Crop data must be an object of crops")?;

        let mut crops = BTreeMap::new();
        let mut load_order = Vec::with_capacity(document.len());
        for (name, records) in document {
            let records: BTreeMap<String, StatisticRecord> = serde_json::from_value(records)
                .with_context(|| format!("Invalid records for crop: {}", name))?;
            load_order.push(name.clone());
            crops.insert(name, records);
        }
        Ok(Self { crops, load_order })
    }

    /// Crop names in sorted order.
    pub fn crops(&self) -> Vec<&str> {
        self.crops.keys().map(String::as_str).collect()
    }

    pub fn totals(&self) -> CatalogTotals {
        let municipalities: BTreeSet<&str> = self
            .crops
            .values()
            .flat_map(|records| records.keys().map(String::as_str))
            .collect();

        CatalogTotals {
            total_crops: self.crops.len(),
            total_municipalities: municipalities.len(),
        }
    }

    /// Every record of a crop, aggregates included.
    pub fn raw_statistics(&self, crop: &str) -> Result<StatisticsByCode> {
        let records = self
            .crops
            .get(crop)
            .ok_or_else(|| anyhow!("crop not found: {}", crop))?;
        Ok(statistics_from_records(records.clone()))
    }

    /// Municipality-level records of a crop, looked up by exact name.
    pub fn municipality_statistics(&self, crop: &str) -> Result<StatisticsByCode> {
        let mut stats = self.raw_statistics(crop)?;
        stats.retain(|code, stat| is_municipality(code, &stat.municipality_name));
        Ok(stats)
    }

    /// Resolve `name` exactly, or else to the first crop in document order
    /// whose lowercase name contains it or is contained in it.
    pub fn lookup(&self, name: &str) -> Result<CropLookup> {
        if self.crops.contains_key(name) {
            let statistics = self.municipality_statistics(name)?;
            log_top_producers(name, &statistics);
            return Ok(CropLookup {
                crop: name.to_string(),
                matched_crop: None,
                statistics,
            });
        }

        let wanted = name.to_lowercase();
        let similar = self
            .load_order
            .iter()
            .find(|crop| {
                let crop = crop.to_lowercase();
                crop.contains(&wanted) || wanted.contains(&crop)
            })
            .ok_or_else(|| anyhow!("crop not found: {}", name))?;

        let statistics = self.municipality_statistics(similar)?;
        log_top_producers(similar, &statistics);
        Ok(CropLookup {
            crop: similar.clone(),
            matched_crop: Some(similar.clone()),
            statistics,
        })
    }
}

fn log_top_producers(crop: &str, statistics: &StatisticsByCode) {
    if statistics.is_empty() {
        debug!(crop, "no valid municipalities");
        return;
    }

    let mut ranked: Vec<&CropStatistic> = statistics.values().collect();
    ranked.sort_by(|a, b| b.harvested_area.total_cmp(&a.harvested_area));
    for (rank, stat) in ranked.iter().take(5).enumerate() {
        debug!(
            crop,
            rank = rank + 1,
            municipality = %stat.municipality_name,
            state = %stat.state_code,
            hectares = stat.harvested_area,
            code = %stat.municipality_code,
            "top producer"
        );
    }
}
