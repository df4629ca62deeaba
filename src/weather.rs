//! Utilities for getting weather info

use std::error::Error;
use std::time::Duration;

use bpaf::Bpaf;
use chrono::Timelike;
use ipinfo::IpInfo;
use open_meteo_api::query::OpenMeteo;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use zoom_sync_core::Board;

use crate::config::WeatherConfig;

#[derive(Clone, Debug, Bpaf)]
#[bpaf(adjacent)]
pub struct Coords {
    /// Optional coordinates to use for fetching weather data, skipping ipinfo geolocation api.
    #[bpaf(long)]
    #[allow(dead_code)]
    pub coords: (),
    /// Latitude
    #[bpaf(positional("LAT"))]
    pub lat: f32,
    /// Longitude
    #[bpaf(positional("LON"))]
    pub long: f32,
}

/// Weather forecast options:
#[derive(Clone, Debug, Bpaf)]
pub enum WeatherArgs {
    /// Disable updating weather info completely
    #[bpaf(long("no-weather"))]
    Disabled,
    // default
    Auto {
        #[bpaf(external, optional)]
        coords: Option<Coords>,
    },
    #[bpaf(adjacent)]
    Manual {
        /// Manually provide weather data, skipping open-meteo weather api. All values are
        /// unitless.
        #[bpaf(short, long)]
        #[allow(dead_code)]
        weather: (),
        /// WMO Index
        #[bpaf(positional("WMO"))]
        wmo: u8,
        /// Current temperature
        #[bpaf(positional("CUR"))]
        current: i16,
        /// Maximum temperature
        #[bpaf(positional("MAX"))]
        max: i16,
    },
}

impl Default for WeatherArgs {
    fn default() -> Self {
        Self::Auto { coords: None }
    }
}

impl WeatherArgs {
    /// Fill in what the command line left open from the config file
    pub fn or_config(self, config: &WeatherConfig) -> Self {
        match self {
            Self::Auto { coords: None } if !config.enabled => Self::Disabled,
            Self::Auto { coords: None } => Self::Auto {
                coords: config
                    .latitude
                    .zip(config.longitude)
                    .map(|(lat, long)| Coords {
                        coords: (),
                        lat: lat as f32,
                        long: long as f32,
                    }),
            },
            other => other,
        }
    }
}

pub async fn get_coords() -> Result<(f32, f32), Box<dyn Error>> {
    info!("fetching geolocation from ipinfo ...");
    let mut ipinfo = IpInfo::new(ipinfo::IpInfoConfig {
        token: None,
        ..Default::default()
    })?;
    let info = ipinfo.lookup_self_v4().await?;
    parse_loc(&info.loc)
}

/// Parse an ipinfo `"lat,long"` location
fn parse_loc(loc: &str) -> Result<(f32, f32), Box<dyn Error>> {
    let (lat, long) = loc
        .split_once(',')
        .ok_or_else(|| format!("malformed location: {loc}"))?;
    Ok((lat.trim().parse()?, long.trim().parse()?))
}

/// Weather data from API
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherData {
    pub wmo: u8,
    pub is_day: bool,
    pub current: f32,
    pub max: f32,
}

fn to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9. / 5. + 32.
}

/// Get the current weather from open-meteo
pub async fn get_weather(
    lat: f32,
    long: f32,
    fahrenheit: bool,
) -> Result<WeatherData, Box<dyn Error>> {
    info!("fetching current weather from open-meteo for [{lat}, {long}] ...");
    let res = OpenMeteo::new()
        .coordinates(lat, long)?
        .current_weather()?
        .time_zone(open_meteo_api::models::TimeZone::Auto)?
        .daily()?
        .query()
        .await?;

    let current = res.current_weather.ok_or("missing current weather")?;
    let wmo = current.weathercode as u8;
    let is_day = current.is_day == 1.0;

    let daily = res.daily.ok_or("missing daily forecast")?;
    let mut max = daily
        .temperature_2m_max
        .first()
        .copied()
        .flatten()
        .ok_or("missing daily maximum")?;
    let mut temp = current.temperature;

    if fahrenheit {
        max = to_fahrenheit(max);
        temp = to_fahrenheit(temp);
    }

    Ok(WeatherData {
        wmo,
        is_day,
        current: temp,
        max,
    })
}

/// Resolve weather data for the given arguments, backfilling coordinates when needed.
/// Returns `None` when weather is disabled or couldn't be fetched.
pub async fn resolve_weather(args: &mut WeatherArgs, fahrenheit: bool) -> Option<WeatherData> {
    match args {
        WeatherArgs::Disabled => None,
        WeatherArgs::Auto { coords } => {
            // attempt to backfill coordinates if not provided
            if coords.is_none() {
                match get_coords().await {
                    Ok((lat, long)) => {
                        *coords = Some(Coords {
                            coords: (),
                            lat,
                            long,
                        })
                    },
                    Err(e) => warn!("failed to fetch geolocation from ipinfo: {e}"),
                }
            }

            let Coords { lat, long, .. } = coords.as_ref()?;
            match get_weather(*lat, *long, fahrenheit).await {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!("failed to fetch weather, skipping: {e}");
                    None
                },
            }
        },
        WeatherArgs::Manual {
            wmo, current, max, ..
        } => {
            let hour = chrono::Local::now().hour();
            Some(WeatherData {
                wmo: *wmo,
                is_day: (6..=18).contains(&hour),
                current: *current as f32,
                max: *max as f32,
            })
        },
    }
}

/// Send weather data to every board that shows it. Returns the number of failed writes.
pub fn apply_weather(boards: &mut [Box<dyn Board>], data: &WeatherData) -> usize {
    let mut failures = 0;
    for board in boards.iter_mut() {
        let location = board.location().to_string();
        let Some(weather) = board.as_weather() else {
            continue;
        };
        if let Err(e) = weather.set_weather(
            data.wmo,
            data.is_day,
            data.current.round() as i16,
            data.max.round() as i16,
        ) {
            warn!(board = %location, "failed to set weather: {e}");
            failures += 1;
        }
    }
    info!(
        "updated weather {{ wmo: {}, is_day: {}, current: {}, max: {} }}",
        data.wmo, data.is_day, data.current, data.max
    );
    failures
}

/// Where the update loop gets its weather from
#[allow(async_fn_in_trait)]
pub trait WeatherSource {
    /// Fetch the current weather, `None` when nothing could be fetched
    async fn fetch(&mut self) -> Option<WeatherData>;
}

/// Live forecast from ipinfo and open-meteo, or manual values
pub struct Forecast {
    args: WeatherArgs,
    fahrenheit: bool,
}

impl Forecast {
    /// `None` when weather is disabled
    pub fn new(args: WeatherArgs, fahrenheit: bool) -> Option<Self> {
        (!matches!(args, WeatherArgs::Disabled)).then_some(Self { args, fahrenheit })
    }
}

impl WeatherSource for Forecast {
    async fn fetch(&mut self) -> Option<WeatherData> {
        resolve_weather(&mut self.args, self.fahrenheit).await
    }
}

/// Fetches weather in a background task and hands the newest result to the update loop.
///
/// The task is aborted when the updater is dropped.
pub struct WeatherUpdater {
    latest: watch::Receiver<Option<WeatherData>>,
    task: JoinHandle<()>,
}

impl WeatherUpdater {
    /// Start refreshing every `every` on the current [`tokio::task::LocalSet`].
    /// A fetch taking longer than `timeout` is abandoned until the next refresh.
    pub fn spawn<S: WeatherSource + 'static>(
        mut source: S,
        every: Duration,
        timeout: Duration,
    ) -> Self {
        let (tx, latest) = watch::channel(None);
        let task = tokio::task::spawn_local(async move {
            loop {
                match tokio::time::timeout(timeout, source.fetch()).await {
                    Ok(Some(data)) => {
                        if tx.send(Some(data)).is_err() {
                            return;
                        }
                    },
                    Ok(None) => {},
                    Err(_) => warn!(
                        "weather fetch timed out after {}, skipping",
                        humantime::format_duration(timeout)
                    ),
                }
                tokio::time::sleep(every).await;
            }
        });
        Self { latest, task }
    }

    /// Send the newest weather to every board if it changed since the last call.
    /// Never waits on the network. Returns whether anything was sent.
    pub fn update(&mut self, boards: &mut [Box<dyn Board>]) -> bool {
        if !self.latest.has_changed().unwrap_or(false) {
            return false;
        }
        let Some(data) = *self.latest.borrow_and_update() else {
            return false;
        };
        apply_weather(boards, &data);
        true
    }
}

impl Drop for WeatherUpdater {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::task::LocalSet;
    use tokio::time::Instant;
    use zoom75::{abi, WeatherIcon, Zoom75};
    use zoom_sync_core::HidHandle;

    use super::*;

    #[test]
    fn parse_ipinfo_loc() {
        assert_eq!(parse_loc("52.52,13.40").unwrap(), (52.52, 13.40));
        assert!(parse_loc("52.52").is_err());
        assert!(parse_loc("north,south").is_err());
    }

    #[test]
    fn config_fills_auto() {
        let config = WeatherConfig {
            enabled: true,
            latitude: Some(10.5),
            longitude: Some(-3.0),
        };
        match WeatherArgs::default().or_config(&config) {
            WeatherArgs::Auto { coords: Some(c) } => assert_eq!((c.lat, c.long), (10.5, -3.0)),
            other => panic!("unexpected {other:?}"),
        }

        let disabled = WeatherConfig {
            enabled: false,
            ..config
        };
        assert!(matches!(
            WeatherArgs::default().or_config(&disabled),
            WeatherArgs::Disabled
        ));
    }

    #[test]
    fn explicit_args_win() {
        let disabled = WeatherConfig {
            enabled: false,
            latitude: None,
            longitude: None,
        };
        let manual = WeatherArgs::Manual {
            weather: (),
            wmo: 3,
            current: 20,
            max: 25,
        };
        assert!(matches!(
            manual.or_config(&disabled),
            WeatherArgs::Manual { wmo: 3, .. }
        ));
    }

    #[test]
    fn disabled_has_no_forecast() {
        assert!(Forecast::new(WeatherArgs::Disabled, false).is_none());
        assert!(Forecast::new(WeatherArgs::default(), false).is_some());
    }

    const DATA: WeatherData = WeatherData {
        wmo: 3,
        is_day: true,
        current: 18.,
        max: 24.,
    };

    /// Answers immediately with fixed data, counting fetches
    struct Fixed(Arc<Mutex<usize>>);

    impl WeatherSource for Fixed {
        async fn fetch(&mut self) -> Option<WeatherData> {
            *self.0.lock().unwrap() += 1;
            Some(DATA)
        }
    }

    struct Stalled;

    impl WeatherSource for Stalled {
        async fn fetch(&mut self) -> Option<WeatherData> {
            std::future::pending().await
        }
    }

    struct Recorder(Arc<Mutex<Vec<Vec<u8>>>>);

    impl HidHandle for Recorder {
        fn write(&mut self, data: &[u8]) -> zoom_sync_core::Result<usize> {
            self.0.lock().unwrap().push(data.to_vec());
            Ok(data.len())
        }

        fn set_nonblocking(&mut self) -> zoom_sync_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn updater_sends_each_fetch_once() {
        LocalSet::new()
            .run_until(async {
                let written = Arc::new(Mutex::new(Vec::new()));
                let mut boards: Vec<Box<dyn Board>> = vec![Box::new(Zoom75::new(
                    Recorder(written.clone()),
                    "fake".into(),
                    true,
                ))];
                let fetches = Arc::new(Mutex::new(0));
                let mut updater = WeatherUpdater::spawn(
                    Fixed(fetches.clone()),
                    Duration::from_secs(60),
                    Duration::from_secs(10),
                );

                // nothing fetched before the task first runs
                assert!(!updater.update(&mut boards));
                tokio::task::yield_now().await;
                assert!(updater.update(&mut boards));
                assert!(!updater.update(&mut boards));
                assert_eq!(
                    written.lock().unwrap()[0],
                    abi::set_weather(WeatherIcon::Cloudy, 18, 24).as_bytes()
                );

                tokio::time::sleep(Duration::from_secs(61)).await;
                assert_eq!(*fetches.lock().unwrap(), 2);
                assert!(updater.update(&mut boards));
                assert_eq!(written.lock().unwrap().len(), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_fetch_times_out() {
        LocalSet::new()
            .run_until(async {
                let mut boards: Vec<Box<dyn Board>> = Vec::new();
                let mut updater =
                    WeatherUpdater::spawn(Stalled, Duration::from_secs(60), Duration::from_secs(5));
                let start = Instant::now();
                tokio::time::sleep(Duration::from_secs(30)).await;
                assert!(!updater.update(&mut boards));
                assert!(Instant::now() - start < Duration::from_secs(31));
                assert!(!updater.task.is_finished());
            })
            .await;
    }

    #[tokio::test]
    async fn manual_weather_resolves() {
        let mut args = WeatherArgs::Manual {
            weather: (),
            wmo: 61,
            current: 12,
            max: 15,
        };
        let data = resolve_weather(&mut args, true).await.unwrap();
        assert_eq!(data.wmo, 61);
        // manual values are never converted
        assert_eq!(data.current, 12.);
        assert_eq!(data.max, 15.);
    }
}
