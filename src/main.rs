mod audio;
mod cli;
mod config;
mod runner;
mod show;
mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use audio::capture::{list_input_devices, CaptureSource};
use audio::file_source::{FilePlayback, OfflineFeeder};
use audio::slot::{block_channel, DEFAULT_DEPTH};
use audio::AudioSource;
use cli::Cli;
use runner::Stage;
use show::color::Rgb;
use show::Show;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let devices = list_input_devices()?;
        if devices.is_empty() {
            println!("No input devices found");
            return Ok(());
        }
        println!("Input devices:");
        for d in &devices {
            let marker = if d.is_default { "*" } else { " " };
            println!(
                "{} [{}] {:<40} {}",
                marker,
                d.index,
                d.name,
                d.default_config.as_deref().unwrap_or("(no default config)")
            );
        }
        return Ok(());
    }

    let mut cfg = match config::find_config_path(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => {
            log::info!("No config file found, using defaults");
            config::Config::default()
        }
    };
    cfg.apply_cli(&cli);
    let cfg = cfg.validate().context("Invalid configuration")?;

    log::info!("pulselight - audio-reactive LED pulses");
    log::info!(
        "Audio: {} Hz, {}-frame blocks, {} channel(s)",
        cfg.audio.sample_rate,
        cfg.audio.block_size,
        cfg.audio.channels
    );
    log::info!(
        "Show: {} fps x {} substep(s), spawn every {:.3}s, width {}, speed {}/s, decay {}",
        cfg.show.fps,
        cfg.show.substeps,
        cfg.show.spawn_interval,
        cfg.show.pulse.width,
        cfg.show.pulse.speed,
        cfg.show.pulse.decay
    );
    for zone in &cfg.zones {
        log::info!("Zone {}: {} ({} LEDs)", zone.id, zone.name, zone.element_count);
    }

    let mut sink = sink::open_sink(cfg.sink.kind, cfg.sink.path.as_deref(), cfg.show.fps)?;
    let mut show = Show::new(&cfg.show, cfg.audio.block_size, &cfg.zones);
    let (sender, mut receiver) = block_channel(cfg.audio.block_size, DEFAULT_DEPTH);
    let stop = runner::install_interrupt_handler()?;

    if cli.offline {
        let input = cli.input.as_ref().context("--offline needs --input")?;
        log::info!("Decoding {}...", input.display());
        let audio = audio::decode::decode_file(input)?;
        let mut feeder = OfflineFeeder::new(&audio, cfg.audio.block_size, sender);

        let stats = runner::run_offline(
            Stage {
                show: &mut show,
                zones: &cfg.zones,
                blocks: &mut receiver,
                sink: sink.as_mut(),
                block_size: cfg.audio.block_size,
            },
            &mut feeder,
            cfg.show.fps,
            &stop,
        )?;
        log::info!(
            "Rendered {} frames, {} pulses spawned",
            stats.frames,
            stats.spawns
        );
        return Ok(());
    }

    sink::flash(sink.as_mut(), &cfg.zones, Rgb::RED, cfg.show.flash)?;

    let mut source: Box<dyn AudioSource> = match cli.input.as_ref() {
        Some(input) => {
            log::info!("Decoding {}...", input.display());
            let audio = audio::decode::decode_file(input)?;
            Box::new(FilePlayback::start(
                input.display().to_string(),
                audio,
                cfg.audio.block_size,
                sender,
            ))
        }
        None => Box::new(CaptureSource::open(&cfg.audio, sender)?),
    };
    log::info!("Listening on {}", source.describe());

    let stats = runner::run_live(
        Stage {
            show: &mut show,
            zones: &cfg.zones,
            blocks: &mut receiver,
            sink: sink.as_mut(),
            block_size: cfg.audio.block_size,
        },
        source.as_mut(),
        cfg.show.frame_duration(),
        &stop,
    )?;

    log::info!(
        "Stopped after {} frames: {} pulses, {} of {} audio blocks used ({} dropped), {} overruns",
        stats.frames,
        stats.spawns,
        stats.fresh_blocks,
        receiver.published(),
        receiver.dropped(),
        stats.overruns
    );
    Ok(())
}
