#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and rate-band parsing for the hub controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//!   Every section is optional and falls back to documented defaults.
//! - The rate-band CSV loader enforces headers and rejects malformed rows.
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::Deserialize;
use serde::de::Deserializer;

/// Rate-band CSV schema.
///
/// Expected headers:
/// min_raw,max_raw,rate
///
/// Example:
/// min_raw,max_raw,rate
/// 0,299,-10
/// 450,574,0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RateBandRow {
    pub min_raw: i32,
    pub max_raw: i32,
    pub rate: f64,
}

/// Inclusive raw range with its signed rate (speed units per second).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBand {
    pub min: i32,
    pub max: i32,
    pub rate: f64,
}

impl From<RateBandRow> for RateBand {
    fn from(r: RateBandRow) -> Self {
        Self {
            min: r.min_raw,
            max: r.max_raw,
            rate: r.rate,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SensorMode {
    #[default]
    Rgb,
    ColorIndex,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HubCfg {
    pub motor_port: u8,
    /// Ports stopped by an emergency stop.
    pub estop_ports: Vec<u8>,
    /// Speed via WriteDirectModeData (true) or StartSpeed (false).
    pub direct_mode: bool,
    pub max_power: u8,
    pub use_profile: u8,
    pub color_sensor_port: u8,
    pub sensor_mode: SensorMode,
}

impl Default for HubCfg {
    fn default() -> Self {
        Self {
            motor_port: 0,
            estop_ports: vec![0, 1, 2],
            direct_mode: true,
            max_power: 100,
            use_profile: 0,
            color_sensor_port: 0x12,
            sensor_mode: SensorMode::Rgb,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DispatcherCfg {
    /// Bounded wait on the normal queue (ms).
    pub normal_wait_ms: u64,
}

impl Default for DispatcherCfg {
    fn default() -> Self {
        Self { normal_wait_ms: 100 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StabilizerCfg {
    pub enabled: bool,
    /// Occurrences of the modal value required before a reading is stable.
    pub threshold: usize,
    /// History window length.
    pub capacity: usize,
}

impl Default for StabilizerCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 3,
            capacity: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BindingAction {
    #[default]
    StopResume,
    Stop,
}

/// One color classification: each channel must fall in its inclusive `[min, max]`.
#[derive(Debug, Deserialize, Clone)]
pub struct TriggerBinding {
    pub name: String,
    pub red: (u8, u8),
    pub green: (u8, u8),
    pub blue: (u8, u8),
    #[serde(default)]
    pub action: BindingAction,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TriggerCfg {
    pub enabled: bool,
    pub required_ms: u64,
    pub cooldown_ms: u64,
    pub post_resume_block_ms: u64,
    pub dwell_ms: u64,
    pub bindings: Vec<TriggerBinding>,
}

impl Default for TriggerCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            required_ms: 150,
            cooldown_ms: 3000,
            post_resume_block_ms: 2000,
            dwell_ms: 2000,
            bindings: vec![TriggerBinding {
                name: "red".to_string(),
                red: (120, 255),
                green: (0, 70),
                blue: (0, 70),
                action: BindingAction::StopResume,
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MapperCfg {
    pub enabled: bool,
    pub tick_ms: u64,
    pub gain: f64,
    pub min_magnitude: i32,
    pub max_magnitude: i32,
    pub manual_override_ms: u64,
    pub disconnect_after_ms: u64,
    /// Rate table. Accepts either:
    /// - array of tables: [{ min = 0, max = 299, rate = -10.0 }, ...]
    /// - array of tuples: [[0, 299, -10.0], ...]
    #[serde(deserialize_with = "de_rate_bands")]
    pub bands: Vec<RateBand>,
    /// CSV file replacing `bands`; relative paths resolve against the config file.
    pub bands_csv: Option<PathBuf>,
}

impl Default for MapperCfg {
    fn default() -> Self {
        let band = |min, max, rate| RateBand { min, max, rate };
        Self {
            enabled: true,
            tick_ms: 200,
            gain: 1.0,
            min_magnitude: 30,
            max_magnitude: 100,
            manual_override_ms: 1500,
            disconnect_after_ms: 1000,
            bands: vec![
                band(0, 299, -10.0),
                band(300, 449, -5.0),
                band(450, 574, 0.0),
                band(575, 724, 5.0),
                band(725, 1023, 10.0),
            ],
            bands_csv: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DirectionCfg {
    /// Pause between the stop and the reversed restart (ms).
    pub pause_ms: u64,
}

impl Default for DirectionCfg {
    fn default() -> Self {
        Self { pause_ms: 400 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub hub: HubCfg,
    pub dispatcher: DispatcherCfg,
    pub stabilizer: StabilizerCfg,
    pub trigger: TriggerCfg,
    pub mapper: MapperCfg,
    pub direction: DirectionCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BandToml {
    Tuple((i32, i32, f64)),
    Table { min: i32, max: i32, rate: f64 },
}

fn de_rate_bands<'de, D>(deserializer: D) -> Result<Vec<RateBand>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Vec<BandToml>> = Option::deserialize(deserializer)?;
    let mut out = Vec::new();
    if let Some(items) = opt {
        for b in items {
            match b {
                BandToml::Tuple((min, max, rate)) | BandToml::Table { min, max, rate } => {
                    out.push(RateBand { min, max, rate });
                }
            }
        }
    }
    Ok(out)
}

pub fn load_rate_bands_csv(path: &Path) -> eyre::Result<Vec<RateBand>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open rate band CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["min_raw", "max_raw", "rate"];
    let actual: Vec<String> = headers.iter().map(ToString::to_string).collect();
    if actual != expected {
        eyre::bail!(
            "rate band CSV must have headers 'min_raw,max_raw,rate', got: {}",
            actual.join(",")
        );
    }

    let mut bands = Vec::new();
    for (idx, rec) in rdr.deserialize::<RateBandRow>().enumerate() {
        match rec {
            Ok(row) => bands.push(RateBand::from(row)),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    if bands.is_empty() {
        eyre::bail!("rate band CSV {:?} has no rows", path);
    }
    Ok(bands)
}

impl Config {
    /// Read, parse and validate a config file, resolving `mapper.bands_csv`.
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("read config {}", path.display()))?;
        let mut cfg =
            load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
        if let Some(csv_path) = cfg.mapper.bands_csv.clone() {
            let resolved = if csv_path.is_relative() {
                path.parent().unwrap_or_else(|| Path::new(".")).join(csv_path)
            } else {
                csv_path
            };
            cfg.mapper.bands = load_rate_bands_csv(&resolved)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Hub
        if self.hub.max_power > 100 {
            eyre::bail!("hub.max_power must be in [0, 100]");
        }
        if self.hub.estop_ports.is_empty() {
            eyre::bail!("hub.estop_ports must name at least one port");
        }

        // Dispatcher
        if self.dispatcher.normal_wait_ms == 0 {
            eyre::bail!("dispatcher.normal_wait_ms must be >= 1");
        }

        // Stabilizer
        if self.stabilizer.capacity == 0 {
            eyre::bail!("stabilizer.capacity must be >= 1");
        }
        if self.stabilizer.threshold == 0 || self.stabilizer.threshold > self.stabilizer.capacity {
            eyre::bail!("stabilizer.threshold must be in [1, capacity]");
        }

        // Trigger
        for b in &self.trigger.bindings {
            if b.name.trim().is_empty() {
                eyre::bail!("trigger.bindings: name must not be empty");
            }
            for (channel, (lo, hi)) in [("red", b.red), ("green", b.green), ("blue", b.blue)] {
                if lo > hi {
                    eyre::bail!("trigger.bindings '{}': {channel} band min > max", b.name);
                }
            }
        }
        if self.trigger.enabled && self.trigger.bindings.is_empty() {
            eyre::bail!("trigger.enabled requires at least one trigger.bindings entry");
        }

        // Mapper
        let m = &self.mapper;
        if m.tick_ms == 0 {
            eyre::bail!("mapper.tick_ms must be >= 1");
        }
        if !m.gain.is_finite() {
            eyre::bail!("mapper.gain must be finite");
        }
        if m.min_magnitude < 0 || m.max_magnitude > 100 || m.min_magnitude > m.max_magnitude {
            eyre::bail!("mapper magnitudes must satisfy 0 <= min_magnitude <= max_magnitude <= 100");
        }
        if m.disconnect_after_ms == 0 {
            eyre::bail!("mapper.disconnect_after_ms must be >= 1");
        }
        for b in &m.bands {
            if b.min > b.max {
                eyre::bail!("mapper band [{}, {}]: min > max", b.min, b.max);
            }
            if !b.rate.is_finite() {
                eyre::bail!("mapper band [{}, {}]: rate must be finite", b.min, b.max);
            }
        }
        let mut sorted: Vec<&RateBand> = m.bands.iter().collect();
        sorted.sort_by_key(|b| b.min);
        for w in sorted.windows(2) {
            if w[1].min <= w[0].max {
                eyre::bail!(
                    "mapper bands [{}, {}] and [{}, {}] overlap",
                    w[0].min,
                    w[0].max,
                    w[1].min,
                    w[1].max
                );
            }
        }

        // Direction
        if self.direction.pause_ms > 60_000 {
            eyre::bail!("direction.pause_ms is unreasonably large (>60s)");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
