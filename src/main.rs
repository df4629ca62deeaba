use std::error::Error;
use std::path::PathBuf;

use bpaf::{Bpaf, Parser};
use chrono::Local;
use hidapi::HidApi;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zoom75::{DeviceConfig, MissingDevice, Zoom75};
use zoom_sync_core::Board;

use crate::config::{Config, GpuSource, SensorConfig};
use crate::daemon::{Daemon, Features, Interval};
use crate::info::SystemTelemetry;
use crate::weather::{resolve_weather, weather_args, Forecast, WeatherArgs, WeatherUpdater};

mod config;
mod daemon;
mod info;
mod lock;
mod weather;

fn fahrenheit() -> impl Parser<bool> {
    bpaf::short('f')
        .long("fahrenheit")
        .help(
            "Use fahrenheit for all fetched temperatures. \
No effect on any manually provided data.",
        )
        .switch()
}

/// Gpu temperature source:
#[derive(Clone, Debug, Bpaf)]
enum GpuArg {
    Nvml(
        /// NVIDIA device index to read the gpu temperature from
        #[bpaf(long("gpu"), argument("ID"))]
        u32,
    ),
    Sensor {
        /// Sensor module providing the gpu temperature
        #[bpaf(long("gpu-module"), argument("MODULE"))]
        gpu_module: String,
        /// Sensor label within the gpu module
        #[bpaf(long("gpu-label"), argument("LABEL"))]
        gpu_label: String,
    },
    /// Don't read or send the gpu temperature
    #[bpaf(long("no-gpu"))]
    Off,
}

impl From<GpuArg> for GpuSource {
    fn from(arg: GpuArg) -> Self {
        match arg {
            GpuArg::Nvml(index) => GpuSource::Nvml { index },
            GpuArg::Sensor {
                gpu_module,
                gpu_label,
            } => GpuSource::Sensor {
                module: gpu_module,
                label: gpu_label,
            },
            GpuArg::Off => GpuSource::Off,
        }
    }
}

/// Missing keyboard policy:
#[derive(Clone, Copy, Debug, PartialEq, Eq, Bpaf)]
enum MissingArg {
    /// Keep running when no keyboard is connected
    #[bpaf(long("allow-missing"))]
    Allow,
    /// Exit when no keyboard is connected
    #[bpaf(long("require-device"))]
    Require,
}

#[derive(Clone, Debug, Bpaf)]
struct RunArgs {
    #[bpaf(external)]
    fahrenheit: bool,
    /// Sensor module providing the cpu temperature, e.g. coretemp or k10temp
    #[bpaf(long, argument("MODULE"))]
    cpu_module: Option<String>,
    /// Sensor label within the cpu module, e.g. "Package id 0" or Tctl
    #[bpaf(long, argument("LABEL"))]
    cpu_label: Option<String>,
    /// Manually set cpu temperature instead of reading a sensor
    #[bpaf(short('c'), long("cpu-temp"), argument("TEMP"))]
    cpu_temp: Option<u8>,
    #[bpaf(external(gpu_arg), optional)]
    gpu: Option<GpuArg>,
    /// Also send the fan speed every cycle
    fan: bool,
    /// Also send the network throughput every cycle
    net: bool,
    #[bpaf(external(missing_arg), optional)]
    missing: Option<MissingArg>,
    /// Delay between updates, e.g. 1s or 500ms
    #[bpaf(long, argument("DURATION"))]
    interval: Option<humantime::Duration>,
    #[bpaf(external)]
    weather_args: WeatherArgs,
}

impl RunArgs {
    /// Sensor selection with command line overrides applied
    fn sensors(&self, config: &SensorConfig) -> SensorConfig {
        SensorConfig {
            cpu_module: self
                .cpu_module
                .clone()
                .unwrap_or_else(|| config.cpu_module.clone()),
            cpu_label: self
                .cpu_label
                .clone()
                .unwrap_or_else(|| config.cpu_label.clone()),
            gpu: self
                .gpu
                .clone()
                .map_or_else(|| config.gpu.clone(), GpuSource::from),
        }
    }

    fn on_missing(&self, config: &Config) -> MissingDevice {
        match self.missing {
            Some(MissingArg::Allow) => MissingDevice::Continue,
            Some(MissingArg::Require) => MissingDevice::Fail,
            None => config.device.keep_alive_policy(),
        }
    }
}

#[derive(Clone, Debug, Bpaf)]
enum SetCommand {
    /// Sync time to system clock
    #[bpaf(command)]
    Time,
    /// Set the displayed cpu temperature
    #[bpaf(command)]
    Cpu(#[bpaf(positional("TEMP"))] u8),
    /// Set the displayed gpu temperature
    #[bpaf(command)]
    Gpu(#[bpaf(positional("TEMP"))] u8),
    /// Set the displayed fan speed
    #[bpaf(command)]
    Fan(#[bpaf(positional("RPM"))] u16),
    /// Set the displayed network throughput
    #[bpaf(command)]
    Net(#[bpaf(positional("BYTES"))] u32),
    /// Set weather data
    #[bpaf(command)]
    Weather {
        #[bpaf(external)]
        fahrenheit: bool,
        #[bpaf(external)]
        weather_args: WeatherArgs,
    },
}

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version, descr(env!("CARGO_PKG_DESCRIPTION")))]
struct Cli {
    /// Config file to use instead of the platform default
    #[bpaf(long, argument("PATH"))]
    config: Option<PathBuf>,
    #[bpaf(external(command))]
    command: Command,
}

#[derive(Clone, Debug)]
enum Command {
    /// Keep the screen updated until interrupted (default).
    Run(RunArgs),
    /// Send one value to the keyboard and exit.
    Set { set_command: SetCommand },
    /// List matching keyboards and temperature sensors.
    List,
}

fn command() -> impl Parser<Command> {
    let run = run_args()
        .map(Command::Run)
        .to_options()
        .descr("Keep the screen updated until interrupted")
        .command("run")
        .help("Keep the screen updated until interrupted (default)");

    let set = set_command()
        .map(|set_command| Command::Set { set_command })
        .to_options()
        .descr("Send one value to the keyboard and exit")
        .command("set")
        .help("Send one value to the keyboard and exit");

    let list = bpaf::pure(Command::List)
        .to_options()
        .descr("List matching keyboards and temperature sensors")
        .command("list")
        .help("List matching keyboards and temperature sensors");

    let default = run_args().map(Command::Run);

    bpaf::construct!([run, set, list, default])
}

fn open_boards(config: &DeviceConfig) -> Result<Vec<Box<dyn Board>>, Box<dyn Error>> {
    Ok(Zoom75::open_all(config)?
        .into_iter()
        .map(|board| Box::new(board) as Box<dyn Board>)
        .collect())
}

/// Apply one setting to every board, failing only when no board took it.
///
/// When `optional` is set, boards without the capability are skipped and the
/// command succeeds as long as no write failed.
fn apply_each(
    boards: &mut [Box<dyn Board>],
    what: &str,
    optional: bool,
    mut apply: impl FnMut(&mut Box<dyn Board>) -> Option<zoom_sync_core::Result<()>>,
) -> Result<(), Box<dyn Error>> {
    let (mut sent, mut failed) = (0, 0);
    for board in boards.iter_mut() {
        let location = board.location().to_string();
        match apply(board) {
            Some(Ok(())) => {
                info!(board = %location, "updated {what}");
                sent += 1;
            },
            Some(Err(e)) => {
                warn!(board = %location, "failed to set {what}: {e}");
                failed += 1;
            },
            None if optional => info!(board = %location, "{what} not shown, skipping"),
            None => warn!(board = %location, "board does not support {what}"),
        }
    }
    if sent == 0 && (failed > 0 || !optional) {
        return Err(format!("failed to set {what} on any keyboard").into());
    }
    Ok(())
}

async fn run(args: RunArgs, config: Config) -> Result<(), Box<dyn Error>> {
    let _lock = lock::Lock::acquire()?;

    let fahrenheit = args.fahrenheit || config.general.fahrenheit;
    let features = Features {
        fan: args.fan || config.features.fan,
        net: args.net || config.features.net,
    };
    let telemetry = SystemTelemetry::new(
        &args.sensors(&config.sensors),
        args.cpu_temp,
        features.net,
        fahrenheit,
    )?;
    let boards = open_boards(
        &config
            .device
            .device_config(args.on_missing(&config)),
    )?;

    let weather = Forecast::new(args.weather_args.or_config(&config.weather), fahrenheit).map(
        |forecast| {
            WeatherUpdater::spawn(
                forecast,
                config.refresh.weather,
                config.refresh.weather_timeout,
            )
        },
    );
    let period = args.interval.map_or(config.refresh.system, Into::into);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupted, stopping after the current cycle");
                let _ = cancel_tx.send(true);
            },
            Err(e) => warn!("failed to listen for ctrl-c: {e}"),
        }
    });

    Daemon::new(
        boards,
        telemetry,
        Interval::new(period, cancel_rx),
        features,
        weather,
    )
    .run()
    .await?;
    Ok(())
}

async fn set(set_command: SetCommand, config: Config) -> Result<(), Box<dyn Error>> {
    let mut boards = open_boards(&config.device.device_config(MissingDevice::Fail))?;
    match set_command {
        SetCommand::Time => {
            let now = Local::now();
            apply_each(&mut boards, "time", false, |b| b.as_time().map(|t| t.set_time(now)))
        },
        SetCommand::Cpu(temp) => apply_each(&mut boards, "cpu temp", false, |b| {
            b.as_cpu_temp().map(|c| c.set_cpu_temp(temp))
        }),
        SetCommand::Gpu(temp) => apply_each(&mut boards, "gpu temp", true, |b| {
            b.as_gpu_temp().map(|g| g.set_gpu_temp(temp))
        }),
        SetCommand::Fan(rpm) => apply_each(&mut boards, "fan speed", false, |b| {
            b.as_fan_speed().map(|f| f.set_fan_speed(rpm))
        }),
        SetCommand::Net(speed) => apply_each(&mut boards, "net speed", false, |b| {
            b.as_net_speed().map(|n| n.set_net_speed(speed))
        }),
        SetCommand::Weather {
            fahrenheit,
            weather_args,
        } => {
            let mut args = weather_args.or_config(&config.weather);
            let data = tokio::time::timeout(
                config.refresh.weather_timeout,
                resolve_weather(&mut args, fahrenheit || config.general.fahrenheit),
            )
            .await
            .map_err(|_| {
                format!(
                    "weather fetch timed out after {}",
                    humantime::format_duration(config.refresh.weather_timeout)
                )
            })?
            .ok_or("no weather data available")?;
            apply_each(&mut boards, "weather", false, |b| {
                b.as_weather().map(|w| {
                    w.set_weather(
                        data.wmo,
                        data.is_day,
                        data.current.round() as i16,
                        data.max.round() as i16,
                    )
                })
            })
        },
    }
}

fn list(config: &Config) -> Result<(), Box<dyn Error>> {
    let device = config.device.device_config(MissingDevice::Continue);
    let found = zoom75::candidates(&mut HidApi::new()?, &device)?;
    println!("keyboards:");
    if found.is_empty() {
        println!("  (none)");
    }
    for d in found {
        println!(
            "  {} [{:04x}:{:04x} interface {}]",
            d.path.to_string_lossy(),
            d.vendor_id,
            d.product_id,
            d.interface_number
        );
    }

    println!("temperature sensors:");
    for label in info::sensor_labels() {
        println!("  {label}");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = cli().run();
    let config = Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    // weather fetches run as local tasks next to the update loop
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, async move {
        match cli.command {
            Command::Run(args) => run(args, config).await,
            Command::Set { set_command } => set(set_command, config).await,
            Command::List => list(&config),
        }
    })
}
