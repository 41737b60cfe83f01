use clap::Parser;
use std::path::PathBuf;

use crate::config::ZoneConfig;
use crate::sink::SinkKind;

#[derive(Parser, Debug)]
#[command(name = "pulselight", about = "Audio-reactive pulse light show")]
pub struct Cli {
    /// Config file (default: ./pulselight.toml or ~/.config/pulselight/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List audio input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Input device index (from --list-devices) or name fragment
    #[arg(short, long)]
    pub device: Option<String>,

    /// Play an audio file instead of capturing a device
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Render --input as fast as possible on a virtual clock
    #[arg(long, requires = "input")]
    pub offline: bool,

    /// Output zone as NAME:LEDS (repeatable; replaces zones from the config file)
    #[arg(long = "zone", value_parser = parse_zone)]
    pub zones: Vec<ZoneConfig>,

    /// Render sink
    #[arg(long, value_enum)]
    pub sink: Option<SinkKind>,

    /// Output file for the jsonl sink ("-" for stdout)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Capture sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Frames per analysis block (also the FFT size)
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Capture channel count
    #[arg(long)]
    pub channels: Option<u16>,

    /// Rendered frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Simulation steps per rendered frame
    #[arg(long)]
    pub substeps: Option<u32>,

    /// Seconds between pulses
    #[arg(long)]
    pub spawn_interval: Option<f64>,

    /// Pulse half-width in LEDs
    #[arg(long)]
    pub pulse_width: Option<f32>,

    /// Pulse speed in LEDs per second
    #[arg(long)]
    pub speed: Option<f32>,

    /// Trail fade multiplier per step (0.0-1.0)
    #[arg(long)]
    pub decay_rate: Option<f32>,

    /// Gain applied to peak amplitude
    #[arg(long)]
    pub sensitivity: Option<f32>,

    /// Hue phase turns per second
    #[arg(long)]
    pub hue_cycle_speed: Option<f32>,

    /// Red startup flash length in milliseconds (0 disables)
    #[arg(long)]
    pub flash_ms: Option<u64>,
}

fn parse_zone(s: &str) -> Result<ZoneConfig, String> {
    let (name, leds) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected NAME:LEDS, got '{}'", s))?;
    if name.is_empty() {
        return Err("zone name is empty".into());
    }
    let leds = leds
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid LED count '{}': {}", leds, e))?;
    Ok(ZoneConfig {
        name: name.to_string(),
        leds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_argument_parses() {
        let zone = parse_zone("Motherboard: LED Strip:42").expect("zone");
        assert_eq!(zone.name, "Motherboard: LED Strip");
        assert_eq!(zone.leds, 42);
    }

    #[test]
    fn zone_argument_errors() {
        assert!(parse_zone("strip").is_err());
        assert!(parse_zone(":10").is_err());
        assert!(parse_zone("strip:many").is_err());
    }

    #[test]
    fn offline_requires_input() {
        assert!(Cli::try_parse_from(["pulselight", "--offline"]).is_err());
        let cli = Cli::try_parse_from(["pulselight", "--offline", "--input", "song.flac"])
            .expect("parse");
        assert!(cli.offline);
    }
}
