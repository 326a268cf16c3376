use std::error::Error;
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bpaf::{Bpaf, Parser};
use chrono::{Datelike, Timelike};
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use trcc::config::{Color, Config, UsbBackend};
use trcc::discovery::discover;
use trcc::media::{fit_image, solid_image};
use trcc::probe_cache::ProbeCache;
use trcc::session::DeviceSession;
use trcc::{DeviceError, HandshakeResult};
use trcc_core::Geometry;
use trcc_led::segment::Clock;
use trcc_led::{LedEngine, LedMode, Reading};

fn device() -> impl Parser<usize> {
    bpaf::short('d')
        .long("device")
        .help("Device number as listed by `trcc detect`")
        .argument::<usize>("N")
        .fallback(0)
        .display_fallback()
}

#[derive(Clone, Debug, Bpaf)]
enum CacheCommand {
    /// Print cached handshake results
    #[bpaf(command)]
    List,
    /// Forget every cached result. Power cycle LED controllers afterwards.
    #[bpaf(command)]
    Clear,
}

#[derive(Clone, Debug, Bpaf)]
enum Command {
    /// List supported devices
    #[bpaf(command)]
    Detect,
    /// Identify a device and print its resolution or LED layout
    #[bpaf(command)]
    Handshake {
        #[bpaf(external)]
        device: usize,
    },
    /// Send an image, resized to fill the panel
    #[bpaf(command, fallback_to_usage)]
    Send {
        #[bpaf(external)]
        device: usize,
        /// Use nearest neighbor interpolation when resizing, otherwise uses gaussian
        #[bpaf(short('n'), long("nearest"))]
        nearest: bool,
        /// Background color for transparent images (hex: #RRGGBB or #RGB)
        #[bpaf(short, long)]
        bg: Option<Color>,
        /// Path to the image
        #[bpaf(positional("PATH"), guard(|p| p.exists(), "file not found"))]
        path: PathBuf,
    },
    /// Fill the panel or every LED with one color
    #[bpaf(command, fallback_to_usage)]
    Color {
        #[bpaf(external)]
        device: usize,
        /// Hex color: #RRGGBB or #RGB
        #[bpaf(positional("HEX"))]
        color: Color,
    },
    /// Blank the panel or turn the LEDs off
    #[bpaf(command)]
    Clear {
        #[bpaf(external)]
        device: usize,
    },
    /// Run an LED effect until interrupted
    #[bpaf(command)]
    Led {
        #[bpaf(external)]
        device: usize,
        /// static, breathing, colorful, rainbow, temperature or load
        #[bpaf(short, long)]
        mode: Option<LedMode>,
        /// Base color (hex: #RRGGBB or #RGB)
        #[bpaf(short, long)]
        color: Option<Color>,
        /// 0 to 100
        #[bpaf(short, long)]
        brightness: Option<u8>,
        /// Temperature in °C or load in % for the linked modes
        #[bpaf(long, fallback(0.0))]
        metric: f32,
        /// Show readings on the digit display, where the style has one
        #[bpaf(long)]
        digits: bool,
        /// Reading for the digit display, e.g. cpu_temp=45. Repeatable.
        #[bpaf(long("sensor"), argument("SENSOR=VALUE"), many)]
        sensors: Vec<Reading>,
    },
    /// Inspect or wipe the probe cache
    #[bpaf(command, fallback_to_usage)]
    Cache(#[bpaf(external(cache_command))] CacheCommand),
}

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version, descr(env!("CARGO_PKG_DESCRIPTION")))]
struct Cli {
    /// Log protocol stages. RUST_LOG takes precedence.
    #[bpaf(short, long)]
    verbose: bool,
    /// USB stack for HID-class devices, libusb or hidapi. Overrides the config file.
    #[bpaf(long)]
    backend: Option<UsbBackend>,
    #[bpaf(external(command))]
    command: Command,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "trcc=debug" } else { "trcc=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Add operator guidance to errors that need it
fn explain(e: DeviceError) -> Box<dyn Error> {
    match e {
        DeviceError::PermissionDenied { .. } => format!(
            "{e}\nhint: install the udev rules for this device or run as root, then replug it"
        )
        .into(),
        DeviceError::HandshakeFailed { protocol: "hid-led", .. } => format!(
            "{e}\nhint: LED controllers only answer once per power cycle, power cycle the device"
        )
        .into(),
        e => e.into(),
    }
}

fn describe(result: &HandshakeResult) -> String {
    let mut out = format!("pm={} sub={}", result.pm, result.sub);
    match result.geometry {
        Geometry::Panel { width, height } => out.push_str(&format!(" resolution={width}x{height}")),
        Geometry::Leds(t) => out.push_str(&format!(
            " style={} leds={} segments={} zones={}",
            t.style_id, t.led_count, t.segment_count, t.zone_count
        )),
    }
    if let Some(model) = &result.model {
        out.push_str(&format!(" model={model}"));
    }
    if let Some(serial) = &result.serial {
        out.push_str(&format!(" serial={serial}"));
    }
    out
}

/// Discover, pick a device by ordinal and handshake it
fn open(
    config: &Config,
    ordinal: usize,
    cache: &mut ProbeCache,
) -> Result<(DeviceSession, HandshakeResult), Box<dyn Error>> {
    let descriptor = discover(config.general.usb_backend)
        .map_err(explain)?
        .into_iter()
        .find(|d| d.ordinal == ordinal)
        .ok_or_else(|| format!("no device {ordinal}, see `trcc detect`"))?;
    debug!(device = %descriptor.vid_pid(), handle = %descriptor.handle, "opening");
    let session = DeviceSession::open(descriptor)?;
    let mut result = session.handshake(cache).map_err(explain)?;
    if let Some(device) = config.device(ordinal) {
        if let Some(overridden) = session.apply_override(device)? {
            result = overridden;
        }
    }
    Ok((session, result))
}

async fn run_led(
    session: Arc<DeviceSession>,
    mut engine: LedEngine,
    brightness: u8,
    tick: Duration,
) -> Result<(), Box<dyn Error>> {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = interval.tick() => {
                let now = chrono::Local::now();
                engine.set_clock(Clock {
                    hour: now.hour(),
                    minute: now.minute(),
                    month: now.month(),
                    day: now.day(),
                });
                let colors = engine.tick();
                let session = session.clone();
                tokio::task::spawn_blocking(move || session.send_led(&colors, brightness))
                    .await?
                    .map_err(explain)?;
            }
        }
    }
    println!("\nstopped");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = cli().run();
    init_tracing(cli.verbose);
    let mut config = Config::load_or_create()?;
    if let Some(backend) = cli.backend {
        config.general.usb_backend = backend;
    }
    let mut cache = ProbeCache::open(
        config
            .probe_cache_path()
            .ok_or("could not determine config directory")?,
    );

    match cli.command {
        Command::Detect => {
            let devices = discover(config.general.usb_backend).map_err(explain)?;
            if devices.is_empty() {
                println!("no supported devices found");
            }
            for d in devices {
                println!(
                    "[{}] {} {:<9} {} {} (bus {}, {})",
                    d.ordinal,
                    d.vid_pid(),
                    d.kind,
                    d.vendor,
                    d.product,
                    d.bus_path.as_deref().unwrap_or("?"),
                    d.handle
                );
            }
            Ok(())
        },
        Command::Handshake { device } => {
            let (_session, result) = open(&config, device, &mut cache)?;
            println!("{}", describe(&result));
            Ok(())
        },
        Command::Send {
            device,
            nearest,
            bg,
            path,
        } => {
            let (session, _) = open(&config, device, &mut cache)?;
            let resolution = session.resolution().ok_or("device is not a panel")?;
            let image = image::open(path)?;
            print!("resizing and encoding image ... ");
            stdout().flush()?;
            let background = bg.unwrap_or(config.lcd.background);
            let fitted = fit_image(&image, background.0, nearest || config.lcd.nearest, resolution);
            session.send_image(&fitted).map_err(explain)?;
            println!("done");
            Ok(())
        },
        Command::Color { device, color } => {
            let (session, result) = open(&config, device, &mut cache)?;
            match result.geometry {
                Geometry::Panel { width, height } => {
                    session.send_image(&solid_image(color.0, (width, height)))
                },
                Geometry::Leds(t) => {
                    session.send_led(&vec![color.0; t.segment_count], config.led.brightness)
                },
            }
            .map_err(explain)?;
            println!("set {color}");
            Ok(())
        },
        Command::Clear { device } => {
            let (session, _) = open(&config, device, &mut cache)?;
            session.clear().map_err(explain)?;
            println!("cleared");
            Ok(())
        },
        Command::Led {
            device,
            mode,
            color,
            brightness,
            metric,
            digits,
            sensors,
        } => {
            let (session, result) = open(&config, device, &mut cache)?;
            let topology = *result.topology().ok_or("device is not an LED controller")?;
            let mode = match mode {
                Some(mode) => mode,
                None => config.led.mode()?,
            };
            let mut engine = LedEngine::new(topology);
            engine.set_mode(mode);
            engine.set_color(color.unwrap_or(config.led.color).0);
            engine.set_metric(metric);
            engine.set_temp_unit(config.led.temp_unit()?);
            engine.set_clock_24h(config.led.clock_24h);
            for reading in sensors {
                engine.set_sensor(reading.sensor, reading.value);
            }
            if (digits || config.led.digits) && !engine.show_digits(true) {
                println!("style {} has no digit display", topology.style_id);
            }
            let brightness = brightness.unwrap_or(config.led.brightness).min(100);

            println!("running {mode} at {brightness}%, ctrl-c to stop");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_led(
                Arc::new(session),
                engine,
                brightness,
                config.led.tick,
            ))
        },
        Command::Cache(CacheCommand::List) => {
            println!("{}", cache.path().display());
            if cache.is_empty() {
                println!("  (empty)");
            }
            for (key, entry) in cache.entries() {
                println!(
                    "  {key}: pm={} sub={} style={} {}",
                    entry.pm, entry.sub, entry.style_id, entry.model
                );
            }
            Ok(())
        },
        Command::Cache(CacheCommand::Clear) => {
            cache.clear()?;
            println!("cleared probe cache");
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_led_command() {
        let cli = cli()
            .run_inner(&["led", "-d", "1", "--mode", "rainbow", "-b", "40"])
            .unwrap();
        match cli.command {
            Command::Led {
                device,
                mode,
                brightness,
                metric,
                digits,
                sensors,
                ..
            } => {
                assert_eq!(device, 1);
                assert_eq!(mode, Some(LedMode::Rainbow));
                assert_eq!(brightness, Some(40));
                assert_eq!(metric, 0.0);
                assert!(!digits);
                assert!(sensors.is_empty());
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_digit_readings() {
        let cli = cli()
            .run_inner(&[
                "led",
                "--digits",
                "--sensor",
                "cpu_temp=45",
                "--sensor",
                "gpu_load=80.5",
            ])
            .unwrap();
        match cli.command {
            Command::Led {
                digits, sensors, ..
            } => {
                assert!(digits);
                assert_eq!(sensors.len(), 2);
                assert_eq!(sensors[0].sensor, trcc_led::Sensor::CpuTemp);
                assert_eq!(sensors[1].value, 80.5);
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(super::cli().run_inner(&["led", "--sensor", "fan=2"]).is_err());
    }

    #[test]
    fn device_defaults_to_first() {
        let cli = cli().run_inner(&["-v", "clear"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Clear { device: 0 }));
        assert!(super::cli().run_inner(&["color", "#12"]).is_err());
    }

    #[test]
    fn backend_overrides_config() {
        let cli = cli().run_inner(&["--backend", "HIDAPI", "detect"]).unwrap();
        assert_eq!(cli.backend, Some(UsbBackend::Hidapi));
        assert_eq!(super::cli().run_inner(&["detect"]).unwrap().backend, None);
        assert!(super::cli().run_inner(&["--backend", "winusb", "detect"]).is_err());
    }

    #[test]
    fn describes_results() {
        let panel = HandshakeResult::panel(100, 0, (320, 320));
        assert_eq!(describe(&panel), "pm=100 sub=0 resolution=320x320");
    }
}
