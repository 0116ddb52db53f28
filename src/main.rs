use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crop_map::analysis::{by_state, compare, export_rows, summary, top_producers};
use crop_map::catalog::{BRAZILIAN_STATES, CropCatalog, CropLookup};
use crop_map::color::parse_hex;
use crop_map::config::AppConfig;
use crop_map::fetch::{Boundaries, FetchProgress, Source, fetch_crop_statistics, http_client, load_boundaries};
use crop_map::output::{to_geojson, write_csv, write_json};
use crop_map::spatial::{RadiusFilter, parse_lat_lng};
use crop_map::view::MapViewState;

#[derive(Parser)]
#[command(about = "Harvested-area choropleth of Brazilian municipalities")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Local crop data file ({crop: {code: record}})
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Base URL of the crop-data API (takes precedence over --data)
    #[arg(long, global = true)]
    api: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a styled GeoJSON map of one crop
    Render {
        /// Crop name (approximate names are matched)
        #[arg(long)]
        crop: String,

        /// Only draw municipalities of this state (UF code, e.g. SP)
        #[arg(long)]
        state: Option<String>,

        /// Radius filter center as LAT,LNG
        #[arg(long, allow_hyphen_values = true)]
        center: Option<String>,

        /// Radius filter size (kilometers)
        #[arg(long, default_value_t = 50.0)]
        radius_km: f64,

        /// Base color of the ramp (#rrggbb)
        #[arg(long)]
        color: Option<String>,

        /// Boundary sources, tried in order (files or URLs)
        #[arg(long = "boundaries")]
        boundaries: Vec<String>,

        /// Output GeoJSON path
        #[arg(long, default_value = "map.geojson")]
        output: PathBuf,

        /// Also write the legend as JSON
        #[arg(long)]
        legend: Option<PathBuf>,
    },
    /// List available crops
    Crops,
    /// List Brazilian states
    States,
    /// Count crops and municipalities
    Totals,
    /// Statistical summary of a crop
    Summary {
        #[arg(long)]
        crop: String,
    },
    /// Per-state aggregates of a crop
    ByState {
        #[arg(long)]
        crop: String,
    },
    /// Largest producers of a crop
    Top {
        #[arg(long)]
        crop: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Compare two crops in their common municipalities
    Compare { crop1: String, crop2: String },
    /// Export a crop's municipalities as CSV
    Export {
        #[arg(long)]
        crop: String,

        #[arg(long)]
        state: Option<String>,

        #[arg(long, default_value = "analise.csv")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::default(),
    };
    if cli.api.is_some() {
        config.sources.api = cli.api.clone();
    }
    if cli.data.is_some() {
        config.sources.crop_data = cli.data.clone();
    }

    match cli.command {
        Commands::Render {
            crop,
            state,
            center,
            radius_km,
            color,
            boundaries,
            output,
            legend,
        } => {
            if !boundaries.is_empty() {
                config.sources.boundaries = boundaries;
            }
            if let Some(color) = color {
                config.style.base_color = color;
            }
            let radius = center
                .map(|c| parse_lat_lng(&c).map(|(lat, lng)| RadiusFilter::new(lat, lng, radius_km)))
                .transpose()?;
            render(&config, &crop, state, radius, &output, legend.as_deref())?;
        }
        Commands::Crops => {
            for crop in open_catalog(&config)?.crops() {
                println!("{}", crop);
            }
        }
        Commands::States => {
            for (code, name) in BRAZILIAN_STATES {
                println!("{}\t{}", code, name);
            }
        }
        Commands::Totals => {
            let totals = open_catalog(&config)?.totals();
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
        Commands::Summary { crop } => {
            let stats = open_catalog(&config)?.municipality_statistics(&crop)?;
            println!("{}", serde_json::to_string_pretty(&summary(&stats)?)?);
        }
        Commands::ByState { crop } => {
            let stats = open_catalog(&config)?.municipality_statistics(&crop)?;
            println!("{}", serde_json::to_string_pretty(&by_state(&stats))?);
        }
        Commands::Top { crop, limit } => {
            let stats = open_catalog(&config)?.municipality_statistics(&crop)?;
            println!("{}", serde_json::to_string_pretty(&top_producers(&stats, limit))?);
        }
        Commands::Compare { crop1, crop2 } => {
            let comparison = compare(&open_catalog(&config)?, &crop1, &crop2)?;
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
        Commands::Export { crop, state, output } => {
            let stats = open_catalog(&config)?.municipality_statistics(&crop)?;
            let rows = export_rows(&stats, &crop, state.as_deref());
            write_csv(&output, &rows)?;
            eprintln!("Wrote {} rows to {}", rows.len(), output.display());
        }
    }

    Ok(())
}

fn open_catalog(config: &AppConfig) -> Result<CropCatalog> {
    let path = config
        .sources
        .crop_data
        .as_ref()
        .ok_or_else(|| anyhow!("no crop data file configured (use --data)"))?;
    CropCatalog::from_path(path)
}

fn load_statistics(config: &AppConfig, client: &reqwest::blocking::Client, crop: &str) -> Result<CropLookup> {
    match &config.sources.api {
        Some(api) => fetch_crop_statistics(client, api, crop),
        None => open_catalog(config)?.lookup(crop),
    }
}

fn render(
    config: &AppConfig,
    crop: &str,
    state: Option<String>,
    radius: Option<RadiusFilter>,
    output: &Path,
    legend_path: Option<&Path>,
) -> Result<()> {
    if parse_hex(&config.style.base_color).is_none() {
        warn!(color = %config.style.base_color, "base color is not #rrggbb, municipalities will use it unchanged");
    }

    let client = http_client()?;

    eprintln!("Loading statistics for {}...", crop);
    let lookup = load_statistics(config, &client, crop).context("Failed to load crop data")?;
    if let Some(matched) = &lookup.matched_crop {
        eprintln!("Using closest crop: {}", matched);
    }

    let sources: Vec<Source> = config.boundary_sources()?;
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(100));
    let on_progress: &dyn Fn(FetchProgress) = &|p| match p {
        FetchProgress::Trying(source) => pb.set_message(format!("Loading boundaries from {}...", source)),
        FetchProgress::Failed(source, err) => pb.println(format!("  {} failed: {:#}", source, err)),
        FetchProgress::Loaded(source, n) => pb.println(format!("  {} municipalities from {}", n, source)),
    };
    let boundaries = load_boundaries(&sources, &client, &config.sources.cache_dir, Some(on_progress));
    pb.finish_and_clear();

    let mut view = MapViewState::new(config.properties.clone());
    view.set_base_color(&config.style.base_color);
    view.set_legend_steps(config.style.legend_steps);

    match boundaries {
        Boundaries::Loaded { collection, .. } => {
            view.load_crop(&lookup.crop, lookup.statistics);
            view.set_boundaries(collection);
        }
        Boundaries::Demonstration(demo) => {
            eprintln!("No boundary file could be loaded; drawing demonstration data");
            view.load_crop(&lookup.crop, demo.statistics);
            view.set_range(demo.range);
            view.set_boundaries(demo.collection);
        }
    }

    view.set_state_filter(state);
    if let Some(radius) = radius {
        view.set_radius_filter(radius);
    }

    let pass = view.render().ok_or_else(|| anyhow!("crop or boundaries missing"))?;
    if pass.features.is_empty() {
        warn!("no municipalities selected, the map is framed on Brazil");
    }

    eprintln!(
        "Drawing {} municipalities ({} with data)",
        pass.features.len(),
        pass.colored_count()
    );
    for entry in &pass.legend.entries {
        eprintln!("  {}  {}", entry.color, entry.label);
    }

    write_json(output, &to_geojson(&pass))?;
    eprintln!("Wrote {}", output.display());

    if let Some(path) = legend_path {
        write_json(path, &pass.legend)?;
        eprintln!("Wrote {}", path.display());
    }

    Ok(())
}
