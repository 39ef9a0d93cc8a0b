//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use hubctl_config::Config;
use hubctl_core::format::{hex, parse_hex};
use hubctl_core::{
    AnalogRunner, AnalogSampler, DispatchStats, Hub, HubError, LogicalCommand, PortModes,
    RuntimeCfg, SensorMode, TriggerState, decode_command, decode_with, encode,
};
use hubctl_hardware::{
    ColorSegment, LineAnalogSource, SensorFeed, SimulatedColorSensor, SimulatedHub, SimulatedKnob,
};
use hubctl_traits::{AnalogSource, MonotonicClock};
use serde_json::json;

use crate::cli::{DEFAULT_CONFIG, EncodeKind, ModeArg, SimulateArgs};
use crate::error_fmt::CliError;

/// Build the command named on the command line.
pub fn command_for(kind: &EncodeKind) -> eyre::Result<LogicalCommand> {
    let cmd = match *kind {
        EncodeKind::Speed {
            speed,
            port,
            max_power,
            direct,
        } => {
            if direct {
                LogicalCommand::direct_speed(port, speed)?
            } else {
                LogicalCommand::SetSpeed {
                    port,
                    speed,
                    max_power,
                    use_profile: 0,
                }
            }
        }
        EncodeKind::Timed {
            speed,
            time_ms,
            port,
            max_power,
            end_state,
        } => LogicalCommand::SetSpeedForTime {
            port,
            speed,
            max_power,
            use_profile: 0,
            time_ms,
            end_state: end_state.into(),
        },
        EncodeKind::Degrees {
            speed,
            degrees,
            port,
            max_power,
            end_state,
        } => LogicalCommand::SetSpeedForDegrees {
            port,
            speed,
            max_power,
            use_profile: 0,
            degrees,
            end_state: end_state.into(),
        },
        EncodeKind::Led { color } => LogicalCommand::SetHubLed { color },
        EncodeKind::Action { action } => LogicalCommand::HubAction {
            action: action.code(),
        },
        EncodeKind::PortInfo { port, info_type } => {
            LogicalCommand::RequestPortInfo { port, info_type }
        }
        EncodeKind::InputFormat {
            port,
            mode,
            delta,
            no_notify,
        } => LogicalCommand::SetPortInputFormat {
            port,
            mode,
            delta,
            notify: !no_notify,
        },
        EncodeKind::HubName => LogicalCommand::request_hub_name(),
    };
    Ok(cmd)
}

pub fn encode_cmd(kind: &EncodeKind, json: bool) -> eyre::Result<()> {
    let cmd = command_for(kind)?;
    let frame = encode(&cmd)?;
    tracing::debug!(command = %cmd, frame = %hex(frame.as_bytes()), "encoded");
    if json {
        println!(
            "{}",
            json!({ "command": cmd.to_string(), "frame": hex(frame.as_bytes()) })
        );
    } else {
        println!("{}", hex(frame.as_bytes()));
    }
    Ok(())
}

pub fn decode_cmd(text: &str, mode: ModeArg, json: bool) -> eyre::Result<()> {
    let bytes = parse_hex(text).ok_or_else(|| CliError::BadHex(text.to_string()))?;
    let event = decode_with(&bytes, &PortModes::new(SensorMode::from(mode)))?;
    if json {
        println!(
            "{}",
            json!({ "frame": hex(&bytes), "event": format!("{event:?}"), "text": event.to_string() })
        );
    } else {
        println!("{event}");
    }
    Ok(())
}

pub fn decode_outbound_cmd(text: &str, json: bool) -> eyre::Result<()> {
    let bytes = parse_hex(text).ok_or_else(|| CliError::BadHex(text.to_string()))?;
    let cmd = decode_command(&bytes)?.ok_or_else(|| CliError::NotACommand(hex(&bytes)))?;
    if json {
        println!(
            "{}",
            json!({ "frame": hex(&bytes), "command": format!("{cmd:?}"), "text": cmd.to_string() })
        );
    } else {
        println!("{cmd}");
    }
    Ok(())
}

/// Load the config file. A missing file at the default path falls back to
/// built-in defaults; any other missing path is an error.
pub fn load_config(path: &Path) -> eyre::Result<Config> {
    if !path.exists() {
        if path == Path::new(DEFAULT_CONFIG) {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        return Err(CliError::MissingConfig(path.display().to_string()).into());
    }
    Config::load(path).map_err(|e| HubError::Config(format!("{e:#}")).into())
}

/// Top-level sections the config schema knows about.
const KNOWN_SECTIONS: &[&str] = &[
    "hub",
    "dispatcher",
    "stabilizer",
    "trigger",
    "mapper",
    "direction",
    "logging",
];

fn unknown_sections(path: &Path) -> eyre::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&text).map_err(|e| HubError::Config(e.to_string()))?;
    Ok(table
        .keys()
        .filter(|k| !KNOWN_SECTIONS.contains(&k.as_str()))
        .cloned()
        .collect())
}

pub fn self_check(path: &Path, cfg: &Config, json: bool) -> eyre::Result<()> {
    let unknown = if path.exists() {
        unknown_sections(path)?
    } else {
        Vec::new()
    };
    for s in &unknown {
        tracing::warn!(section = %s, "unknown config section ignored");
    }

    let rt = RuntimeCfg::from(cfg);
    let bindings = rt.trigger.bindings.len();
    let bands = rt.mapper.bands.len();
    let hub = Hub::builder()
        .with_transport(SimulatedHub::new("self-check"))
        .with_config(rt)
        .build()?;
    hub.request_hub_name()?;
    let stats = hub.shutdown();

    if json {
        println!(
            "{}",
            json!({
                "status": "ok",
                "config": path.display().to_string(),
                "trigger_bindings": bindings,
                "rate_bands": bands,
                "unknown_sections": unknown,
                "frames_sent": stats.sent,
            })
        );
    } else {
        println!(
            "self-check ok: {} trigger binding(s), {} rate band(s), {} frame(s) sent",
            bindings, bands, stats.sent
        );
    }
    Ok(())
}

/// Track layout for the simulated sensor: a stretch of plain track followed
/// by a marker matching the first trigger binding.
fn track(rt: &RuntimeCfg) -> Vec<ColorSegment> {
    match rt.sensor.mode {
        SensorMode::ColorIndex => vec![ColorSegment::index(1500, 3), ColorSegment::index(400, 9)],
        SensorMode::Rgb => {
            let plain = ColorSegment::rgb(1500, 40, 40, 40);
            match rt.trigger.bindings.first() {
                Some(b) => {
                    let (r, g, bl) = b.band.midpoint();
                    vec![plain, ColorSegment::rgb(400, r, g, bl)]
                }
                None => vec![plain],
            }
        }
    }
}

fn analog_source(args: &SimulateArgs) -> eyre::Result<Box<dyn AnalogSource + Send>> {
    #[cfg(feature = "serial")]
    if let Some(port) = args.serial.as_deref() {
        return Ok(Box::new(hubctl_hardware::open_serial(port, args.baud)?));
    }
    if let Some(path) = args.analog_file.as_deref() {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("open analog file {}", path.display()))?;
        return Ok(Box::new(LineAnalogSource::spawn(std::io::BufReader::new(
            file,
        ))?));
    }
    // Sweep once through every rate band and back to the dead zone.
    Ok(Box::new(SimulatedKnob::new(
        vec![512, 650, 800, 650, 512, 380, 200, 380, 512],
        Duration::from_millis(150),
    )))
}

pub fn simulate(args: &SimulateArgs, cfg: &Config, json: bool) -> eyre::Result<DispatchStats> {
    let rt = RuntimeCfg::from(cfg);
    let sensor = SimulatedColorSensor::new(rt.sensor.port, track(&rt));
    let sim = SimulatedHub::new("Train");
    let sim_handle = sim.handle();
    let motor_port = rt.motor.port;

    let hub = Arc::new(Hub::builder().with_transport(sim).with_config(rt).build()?);

    let fired = Arc::new(AtomicU64::new(0));
    let counter = fired.clone();
    hub.on_trigger_state(Arc::new(move |state: &TriggerState| {
        if matches!(state, TriggerState::Triggered { .. }) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        tracing::info!(state = state.name(), "trigger");
    }));
    hub.on_stable_color(Arc::new(|port: u8, index: u8| {
        tracing::info!(port, index, "stable color");
    }));

    hub.subscribe_sensor()?;
    hub.request_hub_name()?;
    hub.set_speed(args.speed)?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        tracing::warn!(error = %e, "Ctrl-C handler not installed");
    }

    let feed = SensorFeed::spawn(sensor, sim_handle.clone(), Duration::from_millis(50))?;
    let sampler = AnalogSampler::spawn(
        analog_source(args)?,
        Duration::from_millis(100),
        MonotonicClock::new(),
    )?;
    let runner = AnalogRunner::spawn(hub.clone(), sampler, MonotonicClock::new())?;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
    }

    runner.stop();
    drop(feed);
    let speed = hub.current_speed();
    let stats = hub.shutdown();
    let wire_speed = sim_handle.speed(motor_port);
    let triggers = fired.load(Ordering::Relaxed);

    if json {
        println!(
            "{}",
            json!({
                "sent": stats.sent,
                "write_failures": stats.write_failures,
                "superseded": stats.superseded,
                "deduplicated": stats.deduplicated,
                "rejected": stats.rejected,
                "triggers": triggers,
                "desired_speed": speed.desired,
                "motor_speed": wire_speed,
            })
        );
    } else {
        println!(
            "simulation finished: sent={} superseded={} deduplicated={} write_failures={} triggers={} desired_speed={} motor_speed={}",
            stats.sent,
            stats.superseded,
            stats.deduplicated,
            stats.write_failures,
            triggers,
            speed.desired,
            wire_speed.map_or_else(|| "-".to_string(), |s| s.to_string()),
        );
    }
    Ok(stats)
}
