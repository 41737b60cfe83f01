use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cli::Cli;
use crate::show::pulse::PulseParams;
use crate::sink::{SinkKind, ZoneInfo};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub show: ShowSection,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Device index from --list-devices, or a name fragment
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

#[derive(Debug, Deserialize)]
pub struct ShowSection {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_substeps")]
    pub substeps: u32,
    #[serde(default = "default_spawn_interval")]
    pub spawn_interval: f64,
    #[serde(default = "default_pulse_width")]
    pub pulse_width: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
    #[serde(default = "default_hue_cycle_speed")]
    pub hue_cycle_speed: f32,
    #[serde(default = "default_flash_ms")]
    pub flash_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    /// Output file for the jsonl sink; "-" or absent means stdout
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub leds: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            channels: default_channels(),
        }
    }
}

impl Default for ShowSection {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            substeps: default_substeps(),
            spawn_interval: default_spawn_interval(),
            pulse_width: default_pulse_width(),
            speed: default_speed(),
            decay_rate: default_decay_rate(),
            sensitivity: default_sensitivity(),
            hue_cycle_speed: default_hue_cycle_speed(),
            flash_ms: default_flash_ms(),
        }
    }
}

fn default_sample_rate() -> u32 { 48_000 }
fn default_block_size() -> usize { 1024 }
fn default_channels() -> u16 { 2 }
fn default_fps() -> u32 { 180 }
fn default_substeps() -> u32 { 1 }
fn default_spawn_interval() -> f64 { 0.05 }
fn default_pulse_width() -> f32 { 1.0 }
fn default_speed() -> f32 { 360.0 }
fn default_decay_rate() -> f32 { 0.1 }
fn default_sensitivity() -> f32 { 0.5 }
fn default_hue_cycle_speed() -> f32 { 0.25 }
fn default_flash_ms() -> u64 { 500 }

/// Explicit path first, then ./pulselight.toml, then the per-user config.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("pulselight.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("pulselight").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("pulselight").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

impl Config {
    /// Command-line values win over the file
    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.device.is_some() {
            self.audio.device = cli.device.clone();
        }
        if let Some(v) = cli.sample_rate { self.audio.sample_rate = v; }
        if let Some(v) = cli.block_size { self.audio.block_size = v; }
        if let Some(v) = cli.channels { self.audio.channels = v; }
        if let Some(v) = cli.fps { self.show.fps = v; }
        if let Some(v) = cli.substeps { self.show.substeps = v; }
        if let Some(v) = cli.spawn_interval { self.show.spawn_interval = v; }
        if let Some(v) = cli.pulse_width { self.show.pulse_width = v; }
        if let Some(v) = cli.speed { self.show.speed = v; }
        if let Some(v) = cli.decay_rate { self.show.decay_rate = v; }
        if let Some(v) = cli.sensitivity { self.show.sensitivity = v; }
        if let Some(v) = cli.hue_cycle_speed { self.show.hue_cycle_speed = v; }
        if let Some(v) = cli.flash_ms { self.show.flash_ms = v; }
        if let Some(v) = cli.sink { self.sink.kind = v; }
        if cli.out.is_some() {
            self.sink.path = cli.out.clone();
        }
        if !cli.zones.is_empty() {
            self.zones = cli.zones.clone();
        }
    }

    /// Check every tunable once; the result is immutable for the run.
    pub fn validate(self) -> Result<ShowConfig, ConfigError> {
        let a = &self.audio;
        let s = &self.show;

        if a.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if a.block_size < 2 {
            return Err(ConfigError::BlockSize(a.block_size));
        }
        if a.channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if s.fps == 0 {
            return Err(ConfigError::ZeroFps);
        }
        if s.substeps == 0 {
            return Err(ConfigError::ZeroSubsteps);
        }
        if !(s.spawn_interval.is_finite() && s.spawn_interval > 0.0) {
            return Err(ConfigError::SpawnInterval(s.spawn_interval));
        }
        if !(s.pulse_width.is_finite() && s.pulse_width > 0.0) {
            return Err(ConfigError::PulseWidth(s.pulse_width));
        }
        if !(s.speed.is_finite() && s.speed >= 0.0) {
            return Err(ConfigError::Negative { field: "speed", value: s.speed });
        }
        if !(0.0..=1.0).contains(&s.decay_rate) {
            return Err(ConfigError::DecayRate(s.decay_rate));
        }
        if !(s.sensitivity.is_finite() && s.sensitivity >= 0.0) {
            return Err(ConfigError::Negative { field: "sensitivity", value: s.sensitivity });
        }
        if !(s.hue_cycle_speed.is_finite() && s.hue_cycle_speed >= 0.0) {
            return Err(ConfigError::Negative { field: "hue_cycle_speed", value: s.hue_cycle_speed });
        }

        if self.zones.is_empty() {
            return Err(ConfigError::NoZones);
        }
        let mut seen = HashSet::new();
        for zone in &self.zones {
            if zone.leds == 0 {
                return Err(ConfigError::EmptyZone(zone.name.clone()));
            }
            if !seen.insert(zone.name.as_str()) {
                return Err(ConfigError::DuplicateZone(zone.name.clone()));
            }
        }

        Ok(ShowConfig {
            audio: AudioSettings {
                device: self.audio.device.clone(),
                sample_rate: a.sample_rate,
                block_size: a.block_size,
                channels: a.channels,
            },
            show: ShowSettings {
                fps: s.fps,
                substeps: s.substeps,
                spawn_interval: s.spawn_interval,
                pulse: PulseParams {
                    width: s.pulse_width,
                    speed: s.speed,
                    decay: s.decay_rate,
                },
                sensitivity: s.sensitivity,
                hue_cycle_speed: s.hue_cycle_speed,
                flash: Duration::from_millis(s.flash_ms),
            },
            sink: SinkSettings {
                kind: self.sink.kind,
                path: self.sink.path.clone(),
            },
            zones: self
                .zones
                .iter()
                .enumerate()
                .map(|(id, z)| ZoneInfo::new(id, z.name.clone(), z.leds))
                .collect(),
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sample_rate must be greater than zero")]
    ZeroSampleRate,
    #[error("block_size must be at least 2, got {0}")]
    BlockSize(usize),
    #[error("channels must be at least 1")]
    ZeroChannels,
    #[error("fps must be greater than zero")]
    ZeroFps,
    #[error("substeps must be at least 1")]
    ZeroSubsteps,
    #[error("spawn_interval must be a positive number of seconds, got {0}")]
    SpawnInterval(f64),
    #[error("pulse_width must be greater than zero, got {0}")]
    PulseWidth(f32),
    #[error("decay_rate must be within 0.0-1.0, got {0}")]
    DecayRate(f32),
    #[error("{field} must be a non-negative number, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("no zones configured (add [[zones]] to the config or pass --zone NAME:LEDS)")]
    NoZones,
    #[error("zone '{0}' has no elements")]
    EmptyZone(String),
    #[error("zone '{0}' is defined more than once")]
    DuplicateZone(String),
}

/// Validated, immutable run configuration
#[derive(Debug, Clone)]
pub struct ShowConfig {
    pub audio: AudioSettings,
    pub show: ShowSettings,
    pub sink: SinkSettings,
    pub zones: Vec<ZoneInfo>,
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub block_size: usize,
    pub channels: u16,
}

#[derive(Debug, Clone)]
pub struct ShowSettings {
    pub fps: u32,
    pub substeps: u32,
    pub spawn_interval: f64,
    pub pulse: PulseParams,
    pub sensitivity: f32,
    pub hue_cycle_speed: f32,
    pub flash: Duration,
}

impl ShowSettings {
    pub fn frame_dt(&self) -> f32 {
        1.0 / self.fps as f32
    }

    pub fn substep_dt(&self) -> f32 {
        self.frame_dt() / self.substeps as f32
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps as f64)
    }
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub kind: SinkKind,
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn with_zone(mut cfg: Config) -> Config {
        cfg.zones.push(ZoneConfig {
            name: "desk".into(),
            leds: 30,
        });
        cfg
    }

    #[test]
    fn defaults_match_stock_tuning() {
        let show = with_zone(Config::default()).validate().expect("valid");
        assert_eq!(show.audio.sample_rate, 48_000);
        assert_eq!(show.audio.block_size, 1024);
        assert_eq!(show.show.fps, 180);
        assert_eq!(show.show.substeps, 1);
        assert_eq!(show.show.pulse.width, 1.0);
        assert_eq!(show.show.pulse.speed, 360.0);
        assert!((show.show.spawn_interval - 0.05).abs() < 1e-12);
        assert_eq!(show.sink.kind, SinkKind::Log);
    }

    #[test]
    fn zero_pulse_width_is_rejected() {
        let mut cfg = with_zone(Config::default());
        cfg.show.pulse_width = 0.0;
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::PulseWidth(0.0));

        let mut cfg = with_zone(Config::default());
        cfg.show.pulse_width = -2.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::PulseWidth(_))));
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let mut cfg = with_zone(Config::default());
        cfg.audio.sample_rate = 0;
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::ZeroSampleRate);
    }

    #[test]
    fn missing_zones_are_rejected() {
        assert_eq!(Config::default().validate().unwrap_err(), ConfigError::NoZones);
    }

    #[test]
    fn bad_zone_lists_are_rejected() {
        let mut cfg = with_zone(Config::default());
        cfg.zones.push(ZoneConfig { name: "desk".into(), leds: 4 });
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::DuplicateZone("desk".into()));

        let mut cfg = Config::default();
        cfg.zones.push(ZoneConfig { name: "dead".into(), leds: 0 });
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::EmptyZone("dead".into()));
    }

    #[test]
    fn decay_rate_must_be_a_fraction() {
        let mut cfg = with_zone(Config::default());
        cfg.show.decay_rate = 1.5;
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::DecayRate(1.5));
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[audio]
device = "3"

[show]
fps = 60
pulse_width = 2.5

[sink]
kind = "jsonl"
path = "frames.jsonl"

[[zones]]
name = "ram"
leds = 8

[[zones]]
name = "fans"
leds = 24
"#
        )
        .expect("write");

        let cfg = load_config(file.path()).expect("parse");
        assert_eq!(cfg.audio.device.as_deref(), Some("3"));
        assert_eq!(cfg.audio.block_size, 1024);
        assert_eq!(cfg.show.fps, 60);
        assert_eq!(cfg.show.speed, 360.0);

        let show = cfg.validate().expect("valid");
        assert_eq!(show.show.pulse.width, 2.5);
        assert_eq!(show.sink.kind, SinkKind::Jsonl);
        assert_eq!(show.zones.len(), 2);
        assert_eq!(show.zones[1].name, "fans");
        assert_eq!(show.zones[1].element_count, 24);
        assert_eq!(show.zones[1].id, 1);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[show]\nfps = \"fast\"").expect("write");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn cli_overrides_file_values() {
        let mut cfg = with_zone(Config::default());
        cfg.show.fps = 60;
        let cli = Cli::parse_from([
            "pulselight",
            "--fps",
            "120",
            "--pulse-width",
            "3",
            "--zone",
            "strip:12",
        ]);
        cfg.apply_cli(&cli);
        let show = cfg.validate().expect("valid");
        assert_eq!(show.show.fps, 120);
        assert_eq!(show.show.pulse.width, 3.0);
        assert_eq!(show.zones.len(), 1);
        assert_eq!(show.zones[0].name, "strip");
        // untouched by the CLI
        assert_eq!(show.show.substeps, 1);
    }

    #[test]
    fn substep_dt_divides_frame() {
        let mut cfg = with_zone(Config::default());
        cfg.show.fps = 100;
        cfg.show.substeps = 4;
        let show = cfg.validate().expect("valid");
        assert!((show.show.frame_dt() - 0.01).abs() < 1e-7);
        assert!((show.show.substep_dt() - 0.0025).abs() < 1e-7);
    }
}
