//! Uplink cadence: the motion-category → period mapping and the periodic
//! timer it reprograms.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use crate::event::{EventGroup, TIMER_FIRED};
use crate::gnss::motion::MotionStatus;

/// Uplink period while driving straight, ms.
const STRAIGHT_PERIOD_MS: u32 = 60_000;
/// Uplink period through a curve, ms.
const CURVE_PERIOD_MS: u32 = 5_000;
/// Uplink period during a u-turn, ms.
const UTURN_PERIOD_MS: u32 = 500;

/// Maps the committed motion category to the uplink period.
pub fn uplink_period(status: MotionStatus) -> Duration {
    let ms = match status {
        MotionStatus::StraightLine => STRAIGHT_PERIOD_MS,
        MotionStatus::Curve => CURVE_PERIOD_MS,
        MotionStatus::UTurn => UTURN_PERIOD_MS,
    };
    Duration::from_millis(ms as u64)
}

/// The periodic uplink timer.
///
/// Lives for the whole process and is only ever reprogrammed, never torn
/// down. Reprogramming restarts the running interval, so a rate change takes
/// effect immediately rather than after the old period drains.
pub struct UplinkTimer {
    period_ms: AtomicU32,
    changed: Signal<CriticalSectionRawMutex, ()>,
}

impl UplinkTimer {
    pub const fn new(initial_period_ms: u32) -> Self {
        Self {
            period_ms: AtomicU32::new(initial_period_ms),
            changed: Signal::new(),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.load(Ordering::Relaxed) as u64)
    }

    /// Commits a new period and restarts the running interval. Never blocks;
    /// the rate-control stage is the only writer.
    pub fn set_period(&self, period: Duration) {
        self.period_ms
            .store(period.as_millis() as u32, Ordering::Relaxed);
        self.changed.signal(());
    }

    /// Drives the timer: publishes [`TIMER_FIRED`] every period, restarting
    /// the interval whenever the period is reprogrammed.
    pub async fn run(&self, events: &EventGroup) -> ! {
        loop {
            match select(Timer::after(self.period()), self.changed.wait()).await {
                Either::First(()) => events.set(TIMER_FIRED),
                Either::Second(()) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::select::select;

    #[test]
    fn period_mapping_matches_the_motion_categories() {
        assert_eq!(
            uplink_period(MotionStatus::StraightLine),
            Duration::from_millis(60_000)
        );
        assert_eq!(
            uplink_period(MotionStatus::Curve),
            Duration::from_millis(5_000)
        );
        assert_eq!(
            uplink_period(MotionStatus::UTurn),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn reprogramming_commits_the_new_period() {
        let timer = UplinkTimer::new(30_000);
        assert_eq!(timer.period(), Duration::from_millis(30_000));
        timer.set_period(uplink_period(MotionStatus::UTurn));
        assert_eq!(timer.period(), Duration::from_millis(500));
    }

    #[test]
    fn timer_fires_periodically() {
        block_on(async {
            let events = EventGroup::new();
            let timer = UplinkTimer::new(10);
            let fired = events.wait_all_timeout(TIMER_FIRED, Duration::from_secs(2));
            match select(timer.run(&events), fired).await {
                Either::First(_) => unreachable!("timer task never returns"),
                Either::Second(result) => assert_eq!(result, Ok(())),
            }
        });
    }

    #[test]
    fn reprogramming_restarts_the_interval() {
        block_on(async {
            let events = EventGroup::new();
            // Would effectively never fire on its own...
            let timer = UplinkTimer::new(600_000);
            // ...until the rate controller drops the period.
            timer.set_period(Duration::from_millis(10));
            let fired = events.wait_all_timeout(TIMER_FIRED, Duration::from_secs(2));
            match select(timer.run(&events), fired).await {
                Either::First(_) => unreachable!("timer task never returns"),
                Either::Second(result) => assert_eq!(result, Ok(())),
            }
        });
    }
}
