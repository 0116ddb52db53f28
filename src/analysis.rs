use anyhow::{Result, anyhow};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::{CropCatalog, StatisticsByCode};

/// Reference year of the harvested-area survey.
pub const SURVEY_YEAR: u16 = 2023;

/// Descriptive statistics of harvested area across municipalities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub mean: f64,
    pub median: f64,
    /// Only reported when at least one value repeats.
    pub mode: Option<f64>,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Quartiles need at least four values.
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub total: f64,
    pub count: usize,
}

pub fn summary(statistics: &StatisticsByCode) -> Result<Summary> {
    let values: Vec<f64> = statistics.values().map(|s| s.harvested_area).collect();
    if values.is_empty() {
        return Err(anyhow!("no valid municipality found for this crop"));
    }

    let count = values.len();
    let total: f64 = values.iter().sum();
    let mean = total / count as f64;

    let mut sorted = values.clone();
    sorted.sort_by(f64::total_cmp);

    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };

    let std_dev = if count > 1 {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    } else {
        0.0
    };

    let (q1, q3) = match quartiles(&sorted) {
        Some([q1, _, q3]) => (Some(q1), Some(q3)),
        None => (None, None),
    };

    Ok(Summary {
        mean,
        median,
        mode: mode(&values),
        std_dev,
        min: sorted[0],
        max: sorted[count - 1],
        q1,
        q3,
        total,
        count,
    })
}

/// Most common value, first-seen on ties. `None` when every value is unique.
fn mode(values: &[f64]) -> Option<f64> {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &v in values {
        match counts.iter_mut().find(|(seen, _)| *seen == v) {
            Some((_, n)) => *n += 1,
            None => counts.push((v, 1)),
        }
    }

    if counts.len() == values.len() {
        return None;
    }
    // max_by_key keeps the last maximum, so scan in reverse for first-seen.
    counts.iter().rev().max_by_key(|(_, n)| *n).map(|(v, _)| *v)
}

/// Exclusive-method quartile cut points of sorted data (at least 4 values).
fn quartiles(sorted: &[f64]) -> Option<[f64; 3]> {
    let ld = sorted.len();
    if ld < 4 {
        return None;
    }

    let n = 4;
    let m = ld + 1;
    let mut cuts = [0.0; 3];
    for (i, cut) in (1..n).zip(cuts.iter_mut()) {
        let j = (i * m / n).clamp(1, ld - 1);
        let delta = (i * m - j * n) as f64;
        *cut = (sorted[j - 1] * (n as f64 - delta) + sorted[j] * delta) / n as f64;
    }
    Some(cuts)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMunicipality {
    pub name: String,
    pub area: f64,
}

/// Aggregate of one state's municipalities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateAggregate {
    pub total_area: f64,
    pub municipalities_count: usize,
    pub max_area: f64,
    pub average_area: f64,
    pub municipalities: Vec<StateMunicipality>,
}

pub fn by_state(statistics: &StatisticsByCode) -> BTreeMap<String, StateAggregate> {
    let mut states: BTreeMap<String, StateAggregate> = BTreeMap::new();

    for stat in statistics.values() {
        let state = if stat.state_code.is_empty() { "XX" } else { stat.state_code.as_str() };
        let entry = states.entry(state.to_string()).or_insert_with(|| StateAggregate {
            total_area: 0.0,
            municipalities_count: 0,
            max_area: 0.0,
            average_area: 0.0,
            municipalities: Vec::new(),
        });

        entry.total_area += stat.harvested_area;
        entry.municipalities_count += 1;
        entry.max_area = entry.max_area.max(stat.harvested_area);
        entry.municipalities.push(StateMunicipality {
            name: stat.municipality_name.clone(),
            area: stat.harvested_area,
        });
    }

    for aggregate in states.values_mut() {
        aggregate.average_area = aggregate.total_area / aggregate.municipalities_count as f64;
    }

    states
}

/// Ranked bar-chart series of the largest producers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopProducers {
    pub labels: Vec<String>,
    pub data: Vec<f64>,
}

pub fn top_producers(statistics: &StatisticsByCode, limit: usize) -> TopProducers {
    let mut ranked: Vec<_> = statistics.values().collect();
    ranked.sort_by(|a, b| b.harvested_area.total_cmp(&a.harvested_area));
    ranked.truncate(limit);

    TopProducers {
        labels: ranked
            .iter()
            .map(|s| format!("{} ({})", s.municipality_name, s.state_code))
            .collect(),
        data: ranked.iter().map(|s| s.harvested_area).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub municipality_code: String,
    pub municipality_name: String,
    pub state_code: String,
    pub crop1_area: f64,
    pub crop2_area: f64,
    /// `crop1_area / max(crop2_area, 1)`.
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub crop1: String,
    pub crop2: String,
    pub comparison_data: Vec<ComparisonRow>,
    pub common_municipalities: usize,
}

/// Side-by-side areas of two crops in the municipalities that report both.
pub fn compare(catalog: &CropCatalog, crop1: &str, crop2: &str) -> Result<Comparison> {
    let (Ok(first), Ok(second)) = (catalog.raw_statistics(crop1), catalog.raw_statistics(crop2)) else {
        return Err(anyhow!("one or both crops not found: {}, {}", crop1, crop2));
    };

    let comparison_data: Vec<ComparisonRow> = first
        .iter()
        .filter_map(|(code, a)| {
            let b = second.get(code)?;
            Some(ComparisonRow {
                municipality_code: code.clone(),
                municipality_name: a.municipality_name.clone(),
                state_code: a.state_code.clone(),
                crop1_area: a.harvested_area,
                crop2_area: b.harvested_area,
                ratio: a.harvested_area / b.harvested_area.max(1.0),
            })
        })
        .collect();

    Ok(Comparison {
        crop1: crop1.to_string(),
        crop2: crop2.to_string(),
        common_municipalities: comparison_data.len(),
        comparison_data,
    })
}

/// One line of the per-crop export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub codigo_ibge: String,
    pub municipio: String,
    pub uf: String,
    pub cultura: String,
    pub area_colhida_ha: f64,
    pub ano: u16,
}

/// Export rows for a crop, optionally restricted to one state, largest
/// producers first.
pub fn export_rows(statistics: &StatisticsByCode, crop: &str, state: Option<&str>) -> Vec<ExportRow> {
    let mut rows: Vec<ExportRow> = statistics
        .values()
        .filter(|s| state.is_none_or(|uf| s.state_code == uf))
        .map(|s| ExportRow {
            codigo_ibge: s.municipality_code.clone(),
            municipio: s.municipality_name.clone(),
            uf: s.state_code.clone(),
            cultura: crop.to_string(),
            area_colhida_ha: s.harvested_area,
            ano: SURVEY_YEAR,
        })
        .collect();

    rows.sort_by(|a, b| b.area_colhida_ha.total_cmp(&a.area_colhida_ha));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CropStatistic;

    fn stats(entries: &[(&str, f64, &str, &str)]) -> StatisticsByCode {
        entries
            .iter()
            .map(|&(code, area, name, uf)| (code.to_string(), CropStatistic::new(code, area, name, uf)))
            .collect()
    }

    fn soy() -> StatisticsByCode {
        stats(&[
            ("5107925", 600.0, "Sorriso", "MT"),
            ("5105259", 400.0, "Lucas do Rio Verde", "MT"),
            ("4113700", 100.0, "Londrina", "PR"),
            ("4104808", 400.0, "Cascavel", "PR"),
            ("5208707", 200.0, "Goiânia", "GO"),
        ])
    }

    #[test]
    fn summary_of_five_values() {
        let s = summary(&soy()).unwrap();
        assert_eq!(s.count, 5);
        assert_eq!(s.total, 1700.0);
        assert_eq!(s.mean, 340.0);
        assert_eq!(s.median, 400.0);
        assert_eq!(s.mode, Some(400.0));
        assert_eq!(s.min, 100.0);
        assert_eq!(s.max, 600.0);
        // Exclusive quartiles of [100, 200, 400, 400, 600].
        assert_eq!(s.q1, Some(150.0));
        assert_eq!(s.q3, Some(500.0));
        assert!((s.std_dev - 194.935886).abs() < 1e-5);
    }

    #[test]
    fn summary_small_inputs() {
        let one = summary(&stats(&[("1100015", 42.0, "Alta Floresta D'Oeste", "RO")])).unwrap();
        assert_eq!(one.std_dev, 0.0);
        assert_eq!(one.mode, None);
        assert_eq!(one.q1, None);
        assert_eq!(one.median, 42.0);

        let two = summary(&stats(&[
            ("1100015", 10.0, "A", "RO"),
            ("1100023", 20.0, "B", "RO"),
        ]))
        .unwrap();
        assert_eq!(two.median, 15.0);

        assert!(summary(&StatisticsByCode::new()).is_err());
    }

    #[test]
    fn mode_prefers_first_seen() {
        assert_eq!(mode(&[3.0, 1.0, 1.0, 3.0, 2.0]), Some(3.0));
        assert_eq!(mode(&[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn states_are_aggregated() {
        let states = by_state(&soy());
        assert_eq!(states.len(), 3);

        let mt = &states["MT"];
        assert_eq!(mt.total_area, 1000.0);
        assert_eq!(mt.municipalities_count, 2);
        assert_eq!(mt.max_area, 600.0);
        assert_eq!(mt.average_area, 500.0);
        assert_eq!(mt.municipalities.len(), 2);
    }

    #[test]
    fn top_producers_are_ranked() {
        let top = top_producers(&soy(), 2);
        assert_eq!(top.labels[0], "Sorriso (MT)");
        assert_eq!(top.data, vec![600.0, 400.0]);
    }

    #[test]
    fn export_respects_state_filter() {
        let rows = export_rows(&soy(), "Soja", Some("PR"));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].municipio, "Cascavel");
        assert_eq!(rows[0].ano, SURVEY_YEAR);

        assert_eq!(export_rows(&soy(), "Soja", None).len(), 5);
    }

    #[test]
    fn comparison_uses_common_municipalities() {
        let catalog = CropCatalog::from_json(
            r#"{
                "Soja": {
                    "5107925": {"harvested_area": 600, "municipality_name": "Sorriso", "state_code": "MT"},
                    "4113700": {"harvested_area": 100, "municipality_name": "Londrina", "state_code": "PR"}
                },
                "Milho": {
                    "5107925": {"harvested_area": 300, "municipality_name": "Sorriso", "state_code": "MT"},
                    "3106200": {"harvested_area": 10, "municipality_name": "Belo Horizonte", "state_code": "MG"}
                },
                "Feijão": {
                    "5107925": {"harvested_area": 0, "municipality_name": "Sorriso", "state_code": "MT"}
                }
            }"#,
        )
        .unwrap();

        let cmp = compare(&catalog, "Soja", "Milho").unwrap();
        assert_eq!(cmp.common_municipalities, 1);
        assert_eq!(cmp.comparison_data[0].ratio, 2.0);

        let cmp = compare(&catalog, "Soja", "Feijão").unwrap();
        assert_eq!(cmp.comparison_data[0].ratio, 600.0);

        assert!(compare(&catalog, "Soja", "Trigo").is_err());
    }
}
