//! The stage handlers.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

use crate::event::{
    Signals, CONNECTED, FIX_PARSED, FIX_VALID, RATE_CHANGED, RAW_RECEIVED, READ_REISSUED,
    TIMER_FIRED,
};
use crate::fmt::{debug, error, info, warn};
use crate::gnss::fix::parse_fix;
use crate::modem::commands::{self, prepare_link};
use crate::modem::{Command, CommandTransactor};
use crate::port::{FailureStore, ModemRx, ModemTx, UplinkFailure};
use crate::rate::uplink_period;

use super::{Context, Stage};

/// Shared handle on the one transactor; gate and uplink serialize on it.
pub type TransactorLock<T, R> = Mutex<CriticalSectionRawMutex, CommandTransactor<T, R>>;

/// Decodes the newest raw bytes into the fix store.
///
/// A malformed buffer still completes the stage — with `None` in the store —
/// because the read must be re-armed either way; skipping happens at the
/// validity gate in [`ClassifyStage`].
pub struct ParseStage;

impl Stage for ParseStage {
    const NAME: &'static str = "parse";
    const TRIGGER: Signals = RAW_RECEIVED;

    async fn run(&mut self, ctx: &Context) -> Option<Signals> {
        let mut store = ctx.fix.lock().await;
        match ctx.with_raw(|raw| parse_fix(raw)) {
            Ok(fix) => {
                info!(
                    "fix: lat={} lon={} speed={} km/h course={}",
                    fix.latitude.as_str(),
                    fix.longitude.as_str(),
                    fix.speed_kmh,
                    fix.course
                );
                store.fix = Some(fix);
            }
            Err(reason) => {
                warn!("skipping cycle: {:?}", reason);
                store.fix = None;
            }
        }
        Some(FIX_PARSED)
    }
}

/// Arms the next raw receive as soon as the previous buffer is decoded, so
/// the receiver never sits idle while the rest of the cycle drains.
pub struct ReissueReadStage;

impl Stage for ReissueReadStage {
    const NAME: &'static str = "reissue-read";
    const TRIGGER: Signals = FIX_PARSED;

    async fn run(&mut self, ctx: &Context) -> Option<Signals> {
        ctx.arm_read();
        Some(READ_REISSUED)
    }
}

/// The validity gate, request-link preparation, and motion classification.
pub struct ClassifyStage;

impl Stage for ClassifyStage {
    const NAME: &'static str = "classify";
    const TRIGGER: Signals = READ_REISSUED;

    async fn run(&mut self, ctx: &Context) -> Option<Signals> {
        let mut store = ctx.fix.lock().await;
        let Some(fix) = store.fix.clone() else {
            return None;
        };
        if !transmit_worthy(fix.validity, ctx.config.accept_warning_fixes) {
            debug!("fix state {} not transmit-worthy", fix.validity);
            return None;
        }
        if let Err(reason) = prepare_link(
            &mut store.link,
            ctx.config.base_url,
            fix.latitude.as_str(),
            fix.longitude.as_str(),
        ) {
            warn!("request link build failed: {:?}", reason);
            return None;
        }

        // The one place both locks are held: data outside, movement inside.
        let mut motion = ctx.motion.lock().await;
        motion.current = motion.classifier.classify(fix.course, fix.speed_kmh);
        let changed = motion.current != motion.previous;
        motion.previous = motion.current;
        drop(motion);
        drop(store);

        if changed {
            Some(FIX_VALID | RATE_CHANGED)
        } else {
            Some(FIX_VALID)
        }
    }
}

/// Whether a fix in this receiver state may be uplinked. `'V'` is the
/// receiver warning state; accepting it is a configuration choice.
fn transmit_worthy(validity: char, accept_warning: bool) -> bool {
    match validity {
        'A' => true,
        'V' => accept_warning,
        _ => false,
    }
}

/// Reprograms the uplink timer when a motion change is committed.
pub struct RateControlStage;

impl Stage for RateControlStage {
    const NAME: &'static str = "rate-control";
    const TRIGGER: Signals = RATE_CHANGED;

    async fn run(&mut self, ctx: &Context) -> Option<Signals> {
        let current = ctx.motion.lock().await.current;
        let period = uplink_period(current);
        info!("motion now {:?}, uplink period {} ms", current, period.as_millis());
        ctx.timer.set_period(period);
        None
    }
}

/// Verifies the modem link before an uplink: one TLS-enable exchange when a
/// valid fix and a timer tick are both pending. The timer bit is sticky, so
/// a tick that beats the fix still pairs with it.
pub struct ConnectionGateStage<'d, T, R, F> {
    transactor: &'d TransactorLock<T, R>,
    failures: F,
}

impl<'d, T, R, F> ConnectionGateStage<'d, T, R, F> {
    pub fn new(transactor: &'d TransactorLock<T, R>, failures: F) -> Self {
        Self { transactor, failures }
    }
}

impl<'d, T: ModemTx, R: ModemRx, F: FailureStore> Stage for ConnectionGateStage<'d, T, R, F> {
    const NAME: &'static str = "connection-gate";
    const TRIGGER: Signals = FIX_VALID | TIMER_FIRED;

    async fn run(&mut self, _ctx: &Context) -> Option<Signals> {
        let mut transactor = self.transactor.lock().await;
        match transactor
            .execute_with_retry(commands::ENABLE_TLS, commands::OK)
            .await
        {
            Ok(()) => Some(CONNECTED),
            Err(reason) => {
                warn!("connection check exhausted: {:?}", reason);
                self.failures.record(UplinkFailure::ConnectionCheck);
                None
            }
        }
    }
}

/// Sends the ordered uplink sequence carrying the prepared request link.
pub struct UplinkStage<'d, T, R, F> {
    transactor: &'d TransactorLock<T, R>,
    failures: F,
}

impl<'d, T, R, F> UplinkStage<'d, T, R, F> {
    pub fn new(transactor: &'d TransactorLock<T, R>, failures: F) -> Self {
        Self { transactor, failures }
    }
}

impl<'d, T: ModemTx, R: ModemRx, F: FailureStore> Stage for UplinkStage<'d, T, R, F> {
    const NAME: &'static str = "uplink";
    const TRIGGER: Signals = CONNECTED;

    async fn run(&mut self, ctx: &Context) -> Option<Signals> {
        let link = ctx.fix.lock().await.link.clone();
        if link.is_empty() {
            warn!("no request link prepared, dropping uplink");
            return None;
        }

        let sequence = [
            Command { request: commands::SET_CID_PARAM, expected: commands::OK },
            Command { request: link.as_bytes(), expected: commands::OK },
            Command { request: commands::HTTP_GET, expected: commands::OK },
            Command { request: commands::TERMINATE_HTTP, expected: commands::OK },
        ];

        let mut transactor = self.transactor.lock().await;
        match transactor.run_sequence(&sequence).await {
            Ok(()) => info!("fix uplinked"),
            Err(aborted) => {
                error!(
                    "uplink aborted at entry {}: {:?}",
                    aborted.entry,
                    aborted.cause
                );
                self.failures
                    .record(UplinkFailure::Sequence { entry: aborted.entry });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::event::WaitTimedOut;
    use crate::gnss::fix::Fix;
    use crate::mock::{RecordingFailures, ScriptedGnss, ScriptedModem};
    use crate::pipeline::{acquire, drive};
    use embassy_futures::block_on;
    use embassy_futures::join::{join, join4, join5};
    use embassy_futures::select::{select, Either};
    use embassy_time::{with_timeout, Duration};
    use heapless::String;

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            signal_wait: Duration::from_millis(100),
            response_timeout: Duration::from_millis(100),
            initial_period_ms: 20,
            ..TrackerConfig::default()
        }
    }

    fn fix(validity: char, course: f32, speed_kmh: f32) -> Fix {
        let mut latitude = String::new();
        latitude.push_str("4807.038").unwrap();
        let mut longitude = String::new();
        longitude.push_str("01131.000").unwrap();
        Fix {
            time: 123519.0,
            validity,
            latitude,
            longitude,
            speed_kmh,
            course,
        }
    }

    async fn store_fix(ctx: &Context, fix: Fix) {
        ctx.fix.lock().await.fix = Some(fix);
    }

    #[test]
    fn classify_gates_on_validity() {
        block_on(async {
            let ctx = Context::new(test_config());
            let mut stage = ClassifyStage;

            store_fix(&ctx, fix('A', 10.0, 30.0)).await;
            assert_eq!(stage.run(&ctx).await, Some(FIX_VALID));

            // Unknown state character: skip, no signal.
            store_fix(&ctx, fix('X', 10.0, 30.0)).await;
            assert_eq!(stage.run(&ctx).await, None);

            // Missing fix (malformed cycle): skip, no signal.
            ctx.fix.lock().await.fix = None;
            assert_eq!(stage.run(&ctx).await, None);
        });
    }

    #[test]
    fn warning_fix_policy_is_configurable() {
        block_on(async {
            let ctx = Context::new(test_config());
            let mut stage = ClassifyStage;
            store_fix(&ctx, fix('V', 10.0, 30.0)).await;
            assert_eq!(stage.run(&ctx).await, Some(FIX_VALID));

            let strict = TrackerConfig {
                accept_warning_fixes: false,
                ..test_config()
            };
            let ctx = Context::new(strict);
            store_fix(&ctx, fix('V', 10.0, 30.0)).await;
            assert_eq!(stage.run(&ctx).await, None);
        });
    }

    #[test]
    fn rate_change_fires_exactly_once_per_transition() {
        block_on(async {
            let ctx = Context::new(test_config());
            let mut stage = ClassifyStage;

            // First cycle seeds the classifier: straight line, no change.
            store_fix(&ctx, fix('A', 10.0, 30.0)).await;
            assert_eq!(stage.run(&ctx).await, Some(FIX_VALID));

            // 10° -> 50° at 30 km/h: u-turn, one rate change.
            store_fix(&ctx, fix('A', 50.0, 30.0)).await;
            assert_eq!(stage.run(&ctx).await, Some(FIX_VALID | RATE_CHANGED));

            // Still turning: category unchanged, no second rate change.
            store_fix(&ctx, fix('A', 90.0, 30.0)).await;
            assert_eq!(stage.run(&ctx).await, Some(FIX_VALID));
        });
    }

    #[test]
    fn classify_prepares_the_request_link() {
        block_on(async {
            let ctx = Context::new(test_config());
            let mut stage = ClassifyStage;
            store_fix(&ctx, fix('A', 10.0, 30.0)).await;
            stage.run(&ctx).await;
            let link = ctx.fix.lock().await.link.clone();
            assert!(link.as_str().contains("lat=4807.038&lon=01131.000"));
        });
    }

    #[test]
    fn rate_control_reprograms_the_timer() {
        block_on(async {
            let ctx = Context::new(test_config());
            ctx.motion.lock().await.current = crate::gnss::motion::MotionStatus::UTurn;
            let mut stage = RateControlStage;
            assert_eq!(stage.run(&ctx).await, None);
            assert_eq!(ctx.timer.period(), Duration::from_millis(500));
        });
    }

    #[test]
    fn gate_connects_within_the_attempt_bound() {
        block_on(async {
            let ctx = Context::new(test_config());
            let modem = ScriptedModem::new();
            modem.push_response(b"ERROR\r\n");
            modem.push_response(b"OK\r\n");
            let (tx, rx) = modem.split();
            let transactor = TransactorLock::new(CommandTransactor::new(
                tx,
                rx,
                Duration::from_millis(100),
                5,
            ));
            let failures = RecordingFailures::new();
            let mut stage = ConnectionGateStage::new(&transactor, failures.clone());
            assert_eq!(stage.run(&ctx).await, Some(CONNECTED));
            assert!(failures.records().is_empty());
        });
    }

    #[test]
    fn gate_exhaustion_records_and_stays_silent() {
        block_on(async {
            let ctx = Context::new(test_config());
            let modem = ScriptedModem::new();
            for _ in 0..5 {
                modem.push_response(b"ERROR\r\n");
            }
            let (tx, rx) = modem.split();
            let transactor = TransactorLock::new(CommandTransactor::new(
                tx,
                rx,
                Duration::from_millis(100),
                5,
            ));
            let failures = RecordingFailures::new();
            let mut stage = ConnectionGateStage::new(&transactor, failures.clone());
            assert_eq!(stage.run(&ctx).await, None);
            assert_eq!(failures.records(), [UplinkFailure::ConnectionCheck]);
        });
    }

    #[test]
    fn uplink_aborts_record_the_entry() {
        block_on(async {
            let ctx = Context::new(test_config());
            store_fix(&ctx, fix('A', 10.0, 30.0)).await;
            ClassifyStage.run(&ctx).await;

            let modem = ScriptedModem::new();
            // Entry 0 succeeds, entry 1 (the URL) exhausts its budget.
            modem.push_response(b"OK\r\n");
            for _ in 0..5 {
                modem.push_response(b"ERROR\r\n");
            }
            let (tx, rx) = modem.split();
            let transactor = TransactorLock::new(CommandTransactor::new(
                tx,
                rx,
                Duration::from_millis(100),
                5,
            ));
            let failures = RecordingFailures::new();
            let mut stage = UplinkStage::new(&transactor, failures.clone());
            assert_eq!(stage.run(&ctx).await, None);
            assert_eq!(failures.records(), [UplinkFailure::Sequence { entry: 1 }]);
            // The later entries were never transmitted.
            let transmitted = modem.transmitted();
            assert!(transmitted.iter().all(|r| r != commands::HTTP_GET));
            assert!(transmitted.iter().all(|r| r != commands::TERMINATE_HTTP));
        });
    }

    const RMC_STRAIGHT: &[u8] =
        b"$GPRMC,123519,A,4807.038,N,01131.000,E,016.2,010.0,230394,003.1,W*6A\r\n";
    const RMC_TURNING: &[u8] =
        b"$GPRMC,123520,A,4807.040,N,01131.002,E,016.2,050.0,230394,003.1,W*6A\r\n";

    /// The whole pipeline against scripted hardware: fixes in, ordered AT
    /// sequence out.
    #[test]
    fn pipeline_uplinks_a_fix_end_to_end() {
        block_on(async {
            let ctx = Context::new(test_config());
            let gnss = ScriptedGnss::new(&[RMC_STRAIGHT, RMC_TURNING]);
            let modem = ScriptedModem::always_ok();
            let (tx, rx) = modem.split();
            let transactor = TransactorLock::new(CommandTransactor::new(
                tx,
                rx,
                Duration::from_millis(100),
                5,
            ));

            ctx.arm_read();
            let stages = join5(
                drive(&ctx, ParseStage),
                drive(&ctx, ReissueReadStage),
                drive(&ctx, ClassifyStage),
                drive(&ctx, RateControlStage),
                drive(
                    &ctx,
                    ConnectionGateStage::new(&transactor, RecordingFailures::new()),
                ),
            );
            let machinery = join4(
                stages,
                drive(&ctx, UplinkStage::new(&transactor, RecordingFailures::new())),
                acquire(&ctx, gnss),
                ctx.timer.run(&ctx.events),
            );

            // TLS check plus the four sequence entries.
            let observed = modem.wait_for_transmissions(5);
            let transmitted = match with_timeout(Duration::from_secs(5), select(machinery, observed)).await {
                Ok(Either::Second(transmitted)) => transmitted,
                _ => panic!("pipeline never reached the modem"),
            };

            assert_eq!(transmitted[0], commands::ENABLE_TLS);
            assert_eq!(transmitted[1], commands::SET_CID_PARAM);
            let url = core::str::from_utf8(&transmitted[2]).unwrap();
            assert!(url.starts_with("AT+HTTPPARA=\"URL\""));
            assert!(url.contains("lat=4807.038"));
            assert!(url.contains("&lon=01131.000"));
            assert_eq!(transmitted[3], commands::HTTP_GET);
            assert_eq!(transmitted[4], commands::TERMINATE_HTTP);
        });
    }

    /// A malformed buffer must skip its cycle without stalling the next one.
    #[test]
    fn malformed_buffer_skips_but_keeps_the_pipeline_live() {
        block_on(async {
            let ctx = Context::new(test_config());
            let gnss = ScriptedGnss::new(&[b"$GPGGA,no,rmc,here*00\r\n", RMC_STRAIGHT]);
            let modem = ScriptedModem::always_ok();
            let (tx, rx) = modem.split();
            let transactor = TransactorLock::new(CommandTransactor::new(
                tx,
                rx,
                Duration::from_millis(100),
                5,
            ));

            ctx.arm_read();
            let stages = join5(
                drive(&ctx, ParseStage),
                drive(&ctx, ReissueReadStage),
                drive(&ctx, ClassifyStage),
                drive(
                    &ctx,
                    ConnectionGateStage::new(&transactor, RecordingFailures::new()),
                ),
                drive(&ctx, UplinkStage::new(&transactor, RecordingFailures::new())),
            );
            let machinery = join(join(stages, acquire(&ctx, gnss)), ctx.timer.run(&ctx.events));

            let observed = modem.wait_for_transmissions(1);
            match with_timeout(Duration::from_secs(5), select(machinery, observed)).await {
                Ok(Either::Second(transmitted)) => {
                    assert_eq!(transmitted[0], commands::ENABLE_TLS);
                }
                _ => panic!("second cycle never reached the modem"),
            }
        });
    }

    /// Two cycles straight -> u-turn commit the faster uplink period.
    #[test]
    fn motion_transition_commits_the_uturn_period() {
        block_on(async {
            let ctx = Context::new(test_config());
            let gnss = ScriptedGnss::new(&[RMC_STRAIGHT, RMC_TURNING]);

            ctx.arm_read();
            let stages = join4(
                drive(&ctx, ParseStage),
                drive(&ctx, ReissueReadStage),
                drive(&ctx, ClassifyStage),
                drive(&ctx, RateControlStage),
            );
            let machinery = join(stages, acquire(&ctx, gnss));

            let observed = async {
                loop {
                    if ctx.timer.period() == Duration::from_millis(500) {
                        break;
                    }
                    embassy_futures::yield_now().await;
                }
            };
            match with_timeout(Duration::from_secs(5), select(machinery, observed)).await {
                Ok(Either::Second(())) => {}
                _ => panic!("u-turn period was never committed"),
            }
        });
    }

    /// The timer bit is sticky: a tick that arrives before the valid fix
    /// still pairs with it at the gate.
    #[test]
    fn early_timer_tick_pairs_with_a_later_fix() {
        block_on(async {
            let ctx = Context::new(test_config());
            ctx.events.set(TIMER_FIRED);
            store_fix(&ctx, fix('A', 10.0, 30.0)).await;
            let out = ClassifyStage.run(&ctx).await.unwrap();
            ctx.events.set(out);
            assert_eq!(
                ctx.events
                    .wait_all_timeout(FIX_VALID | TIMER_FIRED, Duration::from_millis(50))
                    .await,
                Ok(())
            );
        });
    }

    /// Signal waits time out and retry rather than fail.
    #[test]
    fn timed_out_signal_wait_retries_cleanly() {
        block_on(async {
            let ctx = Context::new(test_config());
            assert_eq!(
                ctx.events
                    .wait_all_timeout(CONNECTED, Duration::from_millis(20))
                    .await,
                Err(WaitTimedOut)
            );
            ctx.events.set(CONNECTED);
            assert_eq!(
                ctx.events
                    .wait_all_timeout(CONNECTED, Duration::from_millis(20))
                    .await,
                Ok(())
            );
        });
    }
}
