//! Replay command: feed a recorded position stream through the engine.

use std::io::{Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use ridewise_core::LatLng;
use ridewise_service::{Engine, EngineConfig};
use ridewise_tracking::{NdjsonTransport, NearbyPosition, PositionMessage, PumpReport};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_FEED, ARG_LAT, ARG_LNG, ARG_RADIUS_KM, ARG_STALE_AFTER_MS, ARG_UTC_OFFSET_MINUTES, CliError,
    ENV_FEED, ENV_LAT, ENV_LNG,
};

const DEFAULT_RADIUS_KM: f64 = 1.0;

/// CLI arguments for the `replay` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Replay a newline-delimited JSON feed of position messages \
                 into an in-memory engine, then list the vehicles within a \
                 radius of the query point. Late and malformed reports are \
                 counted and skipped.",
    about = "Replay a position feed and list nearby vehicles"
)]
#[ortho_config(prefix = "RIDEWISE")]
pub(crate) struct ReplayArgs {
    /// Path to the NDJSON feed.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) feed: Option<Utf8PathBuf>,
    /// Latitude of the query point.
    #[arg(long = ARG_LAT, value_name = "degrees", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) lat: Option<f64>,
    /// Longitude of the query point.
    #[arg(long = ARG_LNG, value_name = "degrees", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) lng: Option<f64>,
    /// Search radius in kilometres (defaults to 1).
    #[arg(long = ARG_RADIUS_KM, value_name = "km")]
    #[serde(default)]
    pub(crate) radius_km: Option<f64>,
    /// Drop vehicles whose last report is older than this, measured from
    /// the newest report in the feed.
    #[arg(long = ARG_STALE_AFTER_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) stale_after_ms: Option<u64>,
    /// Local time offset from UTC, in minutes, for peak-hour tables.
    #[arg(long = ARG_UTC_OFFSET_MINUTES, value_name = "minutes", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) utc_offset_minutes: Option<i32>,
}

impl ReplayArgs {
    pub(crate) fn into_config(self) -> Result<ReplayConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ReplayConfig::try_from(merged)
    }
}

/// Resolved `replay` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReplayConfig {
    pub(crate) feed: Utf8PathBuf,
    pub(crate) center: LatLng,
    pub(crate) radius_km: f64,
    /// Staleness window applied after the replay, if any.
    pub(crate) stale_after_ms: Option<u64>,
    pub(crate) engine: EngineConfig,
}

impl TryFrom<ReplayArgs> for ReplayConfig {
    type Error = CliError;

    fn try_from(args: ReplayArgs) -> Result<Self, Self::Error> {
        let feed = args.feed.ok_or(CliError::MissingArgument {
            field: ARG_FEED,
            env: ENV_FEED,
        })?;
        let lat = args.lat.ok_or(CliError::MissingArgument {
            field: ARG_LAT,
            env: ENV_LAT,
        })?;
        let lng = args.lng.ok_or(CliError::MissingArgument {
            field: ARG_LNG,
            env: ENV_LNG,
        })?;
        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            stale_after_ms: args.stale_after_ms.unwrap_or(defaults.stale_after_ms),
            utc_offset_minutes: args
                .utc_offset_minutes
                .unwrap_or(defaults.utc_offset_minutes),
            ..defaults
        };
        engine.validate()?;
        Ok(Self {
            feed,
            center: LatLng::new(lat, lng)?,
            radius_km: args.radius_km.unwrap_or(DEFAULT_RADIUS_KM),
            stale_after_ms: args.stale_after_ms,
            engine,
        })
    }
}

/// One line of `replay` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NearbyRecord {
    #[serde(flatten)]
    position: PositionMessage,
    distance_km: f64,
}

impl From<&NearbyPosition> for NearbyRecord {
    fn from(nearby: &NearbyPosition) -> Self {
        Self {
            position: PositionMessage::from(&nearby.position),
            distance_km: nearby.distance_km,
        }
    }
}

pub(crate) fn run_replay(args: ReplayArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    run_replay_with(&config, writer)
}

pub(crate) fn run_replay_with(config: &ReplayConfig, writer: &mut dyn Write) -> Result<(), CliError> {
    let engine = Engine::builder().config(config.engine).build()?;
    let report = replay_feed(&engine, &config.feed)?;
    info!(
        "replayed {}: {} of {} message(s) applied",
        config.feed, report.applied, report.received
    );
    if let Some(stale_after_ms) = config.stale_after_ms {
        evict_behind_newest(&engine, stale_after_ms);
    }
    let nearby = engine.query_nearby(config.center, config.radius_km)?;
    write_nearby(writer, &nearby)
}

fn replay_feed(engine: &Engine, path: &Utf8Path) -> Result<PumpReport, CliError> {
    let bytes = read_feed(path)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let mut transport = NdjsonTransport::new(bytes.as_slice());
    runtime
        .block_on(engine.ingest(&mut transport))
        .map_err(|source| CliError::Transport {
            path: path.to_path_buf(),
            source,
        })
}

/// Evict vehicles that fell silent more than `stale_after_ms` before the
/// newest report. A recorded feed has no meaningful wall clock.
fn evict_behind_newest(engine: &Engine, stale_after_ms: u64) {
    let store = engine.store();
    let newest_ms = store
        .index_entries()
        .iter()
        .filter_map(|entry| store.get(&entry.vehicle_id))
        .map(|position| position.timestamp_ms)
        .max();
    if let Some(newest_ms) = newest_ms {
        let report = store.evict_stale(newest_ms, stale_after_ms);
        info!("evicted {} vehicle(s) silent before {newest_ms}", report.len());
    }
}

/// Read the whole feed into memory.
pub(crate) fn read_feed(path: &Utf8Path) -> Result<Vec<u8>, CliError> {
    let mut file = fs_utf8::File::open_ambient(path, ambient_authority()).map_err(|source| {
        CliError::OpenFeed {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|source| CliError::ReadFeed {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(bytes)
}

fn write_nearby(writer: &mut dyn Write, nearby: &[NearbyPosition]) -> Result<(), CliError> {
    let records: Vec<NearbyRecord> = nearby.iter().map(NearbyRecord::from).collect();
    let payload = serde_json::to_string_pretty(&records).map_err(CliError::SerialiseOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ReplayConfig, CliError> {
    let merged = ReplayArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ReplayConfig::try_from(merged)
}
