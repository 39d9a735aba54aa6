use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use geoloc::config::Settings;
use geoloc::distance::Units;
use geoloc::geocoding::{Geocoder, Provider};
use geoloc::location::{Location, LocationStore};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

/// geoloc: geocoded places with cached coordinates
///
/// Stores place queries, resolves them to coordinates through a geocoding
/// web service and answers bounding-box and proximity questions.
///
/// Examples:
///   geoloc add "London, UK" --name London
///   geoloc near 1 --radius 200
///   geoloc within 52.48 -1.90 50.85 4.35
///   geoloc geocode "Paris" --provider google
#[derive(Parser)]
#[command(name = "geoloc", version, about, long_about = None)]
struct Cli {
    /// Config file. Defaults to ~/.geoloc/config.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overriding the configured path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging on stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Geocode and store a place.
    Add {
        query: String,
        /// Friendly display name.
        #[arg(long)]
        name: Option<String>,
        /// Geocoder to use (yahoo, google, geonames).
        #[arg(long)]
        provider: Option<Provider>,
        /// Hide from public listings.
        #[arg(long)]
        private: bool,
    },
    /// Show one stored place.
    Show { id: i64 },
    /// List stored places.
    List {
        /// Only public places.
        #[arg(long)]
        public: bool,
    },
    /// Re-geocode one place, or every expired place when no id is given.
    Refresh { id: Option<i64> },
    /// Delete a stored place.
    Delete { id: i64 },
    /// Places nearest to a stored place.
    Near {
        id: i64,
        /// Search radius in miles.
        #[arg(long)]
        radius: Option<f64>,
        /// Units for reported distances (km, mi, ft, nm).
        #[arg(long, default_value = "mi")]
        units: Units,
    },
    /// Places inside a bounding box given by its NW and SE corners.
    #[command(allow_negative_numbers = true)]
    Within {
        north: f64,
        west: f64,
        south: f64,
        east: f64,
    },
    /// Distance between two stored places.
    Distance {
        from: i64,
        to: i64,
        #[arg(long, default_value = "mi")]
        units: Units,
    },
    /// Geocode a query without storing it.
    Geocode {
        query: String,
        #[arg(long)]
        provider: Option<Provider>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    let geocoder = Geocoder::from_settings(&settings.geocoding);

    let db_path = cli.db.clone().unwrap_or_else(|| settings.db.path.clone());
    let store = LocationStore::open(&db_path, geocoder, settings.cache.max_age)
        .with_context(|| format!("opening {}", db_path.display()))?;

    match cli.command {
        Command::Add {
            query,
            name,
            provider,
            private,
        } => {
            let mut location = Location::new(query);
            location.provider = provider;
            if let Some(name) = name {
                location.set_friendly_name(name);
            }
            location.is_public = !private;
            store.save(&mut location)?;
            print_json(&location)
        }
        Command::Show { id } => print_json(&store.get(id)?),
        Command::List { public } => {
            let locations = if public { store.public()? } else { store.all()? };
            print_json(&locations)
        }
        Command::Refresh { id: Some(id) } => {
            let mut location = store.get(id)?;
            store.refresh(&mut location)?;
            print_json(&location)
        }
        Command::Refresh { id: None } => {
            let refreshed = store.refresh_expired(Utc::now())?;
            print_json(&json!({ "refreshed": refreshed }))
        }
        Command::Delete { id } => {
            store.delete(id)?;
            print_json(&json!({ "deleted": id }))
        }
        Command::Near { id, radius, units } => {
            let origin = store.get(id)?;
            let nearby: Vec<_> = store
                .by_proximity_to_location(&origin, radius)?
                .into_iter()
                .map(|location| {
                    let distance = origin.distance_between(&location, units);
                    json!({ "location": location, "distance": distance, "units": units })
                })
                .collect();
            print_json(&nearby)
        }
        Command::Within {
            north,
            west,
            south,
            east,
        } => print_json(&store.within_bounds(&(north, west), &(south, east))?),
        Command::Distance { from, to, units } => {
            let a = store.get(from)?;
            let b = store.get(to)?;
            print_json(&json!({
                "from": a.name(),
                "to": b.name(),
                "distance": a.distance_between(&b, units),
                "units": units,
            }))
        }
        Command::Geocode { query, provider } => {
            let geocoder = store.geocoder();
            let provider = provider.unwrap_or_else(|| geocoder.default_provider());
            let result = geocoder.geocode_with(provider, &query)?;
            print_json(&json!({
                "query": result.query,
                "provider": result.provider,
                "coordinates": result.coords,
                "response": result.response.to_dictionary(),
            }))
        }
    }
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("geoloc={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
