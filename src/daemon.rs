//! Keep-alive update loop

use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio::time::{Interval as TokioInterval, MissedTickBehavior};
use tracing::{debug, info, warn};
use zoom_sync_core::Board;

use crate::info::{SensorError, TelemetrySnapshot, TelemetrySource};
use crate::weather::WeatherUpdater;

/// Optional reports sent alongside the temperatures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub fan: bool,
    pub net: bool,
}

/// Sync the clock on every board. Returns the number of failed writes.
pub fn apply_time(boards: &mut [Box<dyn Board>], now: DateTime<Local>) -> usize {
    let mut failures = 0;
    for board in boards.iter_mut() {
        let location = board.location().to_string();
        let Some(time) = board.as_time() else {
            continue;
        };
        match time.set_time(now) {
            Ok(()) => info!(board = %location, "updated time to {now}"),
            Err(e) => {
                warn!(board = %location, "failed to set time: {e}");
                failures += 1;
            },
        }
    }
    failures
}

/// Send one snapshot to every board, in order.
///
/// A failed write is logged and the remaining reports and boards are still
/// attempted. Returns the number of failed writes.
pub fn dispatch(
    boards: &mut [Box<dyn Board>],
    snapshot: &TelemetrySnapshot,
    features: &Features,
) -> usize {
    let mut failures = 0;
    let mut check = |location: &str, what: &str, res: zoom_sync_core::Result<()>| {
        if let Err(e) = res {
            warn!(board = %location, "failed to set {what}: {e}");
            failures += 1;
        }
    };

    for board in boards.iter_mut() {
        let location = board.location().to_string();
        if let Some(cpu) = board.as_cpu_temp() {
            check(&location, "cpu temp", cpu.set_cpu_temp(snapshot.cpu_temp));
        }
        if let (Some(temp), Some(gpu)) = (snapshot.gpu_temp, board.as_gpu_temp()) {
            check(&location, "gpu temp", gpu.set_gpu_temp(temp));
        }
        if features.fan {
            if let Some(fan) = board.as_fan_speed() {
                check(&location, "fan speed", fan.set_fan_speed(snapshot.fan_rpm));
            }
        }
        if features.net {
            if let Some(net) = board.as_net_speed() {
                check(&location, "net speed", net.set_net_speed(snapshot.net_speed));
            }
        }
    }
    failures
}

/// Waits between cycles and reports cancellation
#[allow(async_fn_in_trait)]
pub trait Ticker {
    /// Checked once at the start of every cycle
    fn cancelled(&self) -> bool;
    /// Wait for the next cycle, returning early when cancelled
    async fn tick(&mut self);
}

/// Fixed idle wait paired with a cancellation flag.
///
/// Every wait lasts a full period from the moment it starts, however long the
/// preceding cycle took.
pub struct Interval {
    interval: TokioInterval,
    cancel: watch::Receiver<bool>,
}

impl Interval {
    pub fn new(period: Duration, cancel: watch::Receiver<bool>) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, cancel }
    }
}

impl Ticker for Interval {
    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn tick(&mut self) {
        self.interval.reset();
        tokio::select! {
            _ = self.interval.tick() => {},
            changed = self.cancel.changed() => {
                // sender gone, nobody can cancel anymore
                if changed.is_err() {
                    self.interval.tick().await;
                }
            },
        }
    }
}

/// Polls telemetry and fans it out to every open board until cancelled
pub struct Daemon<T, K> {
    boards: Vec<Box<dyn Board>>,
    telemetry: T,
    ticker: K,
    features: Features,
    weather: Option<WeatherUpdater>,
}

impl<T: TelemetrySource, K: Ticker> Daemon<T, K> {
    pub fn new(
        boards: Vec<Box<dyn Board>>,
        telemetry: T,
        ticker: K,
        features: Features,
        weather: Option<WeatherUpdater>,
    ) -> Self {
        Self {
            boards,
            telemetry,
            ticker,
            features,
            weather,
        }
    }

    /// Run until cancelled, returning the number of completed cycles.
    ///
    /// The clock is synced once before the first cycle. Sensor failures end the loop.
    pub async fn run(&mut self) -> Result<usize, SensorError> {
        info!("starting update loop with {} board(s)", self.boards.len());
        apply_time(&mut self.boards, Local::now());

        let mut cycles = 0;
        while !self.ticker.cancelled() {
            let snapshot = self.telemetry.snapshot()?;
            debug!(?snapshot, "dispatching");
            dispatch(&mut self.boards, &snapshot, &self.features);

            if let Some(weather) = &mut self.weather {
                weather.update(&mut self.boards);
            }

            cycles += 1;
            self.ticker.tick().await;
        }

        info!("update loop stopped after {cycles} cycle(s)");
        Ok(cycles)
    }
}
