use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cadence_core::{BufferMode, CursorKind, RenderConfig, WakeStrategy, WaveShape};

pub const USAGE: &str = "\
Usage: cadence [OPTIONS]

Plays a tone on the default (or named) output device. Press Enter to stop early.

Options:
  --config FILE         load settings from a JSON file; flags override it
  --frequency HZ        tone frequency (default 440)
  --shape SHAPE         sine | square | triangle | sawtooth (default sine)
  --volume V            amplitude between 0 and 1 (default 0.5)
  --duration SECS       session length (default 5)
  --latency MS          device buffer length (default 50)
  --mode MODE           bulk | streaming (default streaming)
  --wake WAKE           event | polling (default event)
  --cursor CURSOR       phase | time (default phase)
  --no-drain            skip the trailing silence period
  --device NAME         output device, matched case-insensitively
  --simulate            render against a virtual device instead of hardware
  --list-devices        print hosts and output devices, then exit
  --help                show this message

RUST_LOG controls log verbosity (default: info).";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Render { config: RenderConfig, simulate: bool },
    ListDevices,
    Help,
}

#[derive(Default)]
struct Overrides {
    frequency: Option<u32>,
    shape: Option<WaveShape>,
    volume: Option<f32>,
    duration_secs: Option<f64>,
    latency_ms: Option<u32>,
    buffer_mode: Option<BufferMode>,
    wake: Option<WakeStrategy>,
    cursor: Option<CursorKind>,
    no_drain: bool,
    device: Option<String>,
}

impl Overrides {
    fn apply(self, mut config: RenderConfig) -> RenderConfig {
        if let Some(frequency) = self.frequency {
            config = config.with_frequency(frequency);
        }
        if let Some(shape) = self.shape {
            config = config.with_shape(shape);
        }
        if let Some(volume) = self.volume {
            config = config.with_volume(volume);
        }
        if let Some(seconds) = self.duration_secs {
            config = config.with_duration_secs(seconds);
        }
        if let Some(latency) = self.latency_ms {
            config = config.with_latency_ms(latency);
        }
        if let Some(mode) = self.buffer_mode {
            config = config.with_buffer_mode(mode);
        }
        if let Some(wake) = self.wake {
            config = config.with_wake(wake);
        }
        if let Some(cursor) = self.cursor {
            config = config.with_cursor(cursor);
        }
        if self.no_drain {
            config = config.with_drain_silence(false);
        }
        if let Some(device) = self.device {
            config = config.with_device(device);
        }
        config
    }
}

/// Parse the arguments after the program name.
pub fn parse<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config_path: Option<PathBuf> = None;
    let mut overrides = Overrides::default();
    let mut simulate = false;
    let mut list_devices = false;

    while let Some(flag) = args.next() {
        let mut value = || {
            args.next()
                .with_context(|| format!("{flag} expects a value"))
        };
        match flag.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--config" => config_path = Some(PathBuf::from(value()?)),
            "--frequency" => overrides.frequency = Some(parse_number(&flag, &value()?)?),
            "--shape" => {
                overrides.shape = Some(value()?.parse().map_err(anyhow::Error::msg)?);
            }
            "--volume" => overrides.volume = Some(parse_number(&flag, &value()?)?),
            "--duration" => overrides.duration_secs = Some(parse_number(&flag, &value()?)?),
            "--latency" => overrides.latency_ms = Some(parse_number(&flag, &value()?)?),
            "--mode" => {
                overrides.buffer_mode = Some(match value()?.to_lowercase().as_str() {
                    "bulk" => BufferMode::Bulk,
                    "streaming" => BufferMode::Streaming,
                    other => bail!("unknown buffer mode '{other}' (expected bulk or streaming)"),
                });
            }
            "--wake" => {
                overrides.wake = Some(match value()?.to_lowercase().as_str() {
                    "event" => WakeStrategy::Event,
                    "polling" | "poll" => WakeStrategy::Polling,
                    other => bail!("unknown wake strategy '{other}' (expected event or polling)"),
                });
            }
            "--cursor" => {
                overrides.cursor = Some(match value()?.to_lowercase().as_str() {
                    "phase" => CursorKind::Phase,
                    "time" => CursorKind::Time,
                    other => bail!("unknown cursor '{other}' (expected phase or time)"),
                });
            }
            "--device" => overrides.device = Some(value()?),
            "--no-drain" => overrides.no_drain = true,
            "--simulate" => simulate = true,
            "--list-devices" => list_devices = true,
            other => bail!("unknown argument '{other}'\n\n{USAGE}"),
        }
    }

    if list_devices {
        return Ok(Command::ListDevices);
    }

    let base = match &config_path {
        Some(path) => RenderConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RenderConfig::default(),
    };
    let config = overrides.apply(base);
    config.validate()?;

    Ok(Command::Render { config, simulate })
}

fn parse_number<T>(flag: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("{flag}: '{raw}' is not a valid number"))
}
