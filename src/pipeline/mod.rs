//! The fix pipeline: cooperating stages wired together purely through the
//! event group and the shared stores.
//!
//! Each stage is a descriptor — a trigger mask and a handler — run by the
//! one generic [`drive`] loop, which owns the wait/clear/dispatch/publish
//! protocol so the stages only contain their actual work. Signals chain
//! strictly within a cycle (`RAW_RECEIVED → FIX_PARSED → READ_REISSUED →
//! FIX_VALID → …`), while consecutive cycles overlap freely: a new raw
//! buffer can arrive while the previous fix is still in flight to the modem.

use core::cell::RefCell;

use embassy_sync::blocking_mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use heapless::Vec;

use crate::config::TrackerConfig;
use crate::event::{EventGroup, Signals, RAW_RECEIVED};
use crate::fmt::{debug, warn};
use crate::gnss::fix::Fix;
use crate::gnss::motion::MotionState;
use crate::modem::commands::RequestLink;
use crate::port::GnssPort;
use crate::rate::UplinkTimer;

mod stages;

pub use stages::{
    ClassifyStage, ConnectionGateStage, ParseStage, RateControlStage, ReissueReadStage,
    TransactorLock, UplinkStage,
};

/// Capacity of the raw receive buffer.
pub const RAW_CAPACITY: usize = 512;

/// The latest fix and the request link prepared from it, guarded together
/// by the data lock.
#[derive(Debug, Default)]
pub struct FixStore {
    pub fix: Option<Fix>,
    pub link: RequestLink,
}

/// Everything the stages share. One instance lives for the whole process;
/// there are deliberately no process-wide statics besides the one the
/// binary allocates for this.
pub struct Context {
    pub config: TrackerConfig,
    pub events: EventGroup,
    /// Data lock: the fix and its prepared link.
    pub fix: Mutex<CriticalSectionRawMutex, FixStore>,
    /// Movement lock: the committed categories and the classifier memo.
    pub motion: Mutex<CriticalSectionRawMutex, MotionState>,
    pub timer: UplinkTimer,
    /// Raw bytes of the newest receive, shared with the acquisition task.
    raw: blocking_mutex::Mutex<CriticalSectionRawMutex, RefCell<Vec<u8, RAW_CAPACITY>>>,
    /// Pinged to arm the next raw receive; the buffer is reused in place.
    rearm: Signal<CriticalSectionRawMutex, ()>,
}

impl Context {
    pub fn new(config: TrackerConfig) -> Self {
        let timer = UplinkTimer::new(config.initial_period_ms);
        Self {
            config,
            events: EventGroup::new(),
            fix: Mutex::new(FixStore::default()),
            motion: Mutex::new(MotionState::new()),
            timer,
            raw: blocking_mutex::Mutex::new(RefCell::new(Vec::new())),
            rearm: Signal::new(),
        }
    }

    /// Arms a raw receive. Called once at startup for the first read and by
    /// the re-issue stage for every read after that.
    pub fn arm_read(&self) {
        self.rearm.signal(());
    }

    pub(crate) fn with_raw<R>(&self, f: impl FnOnce(&mut Vec<u8, RAW_CAPACITY>) -> R) -> R {
        self.raw.lock(|raw| f(&mut raw.borrow_mut()))
    }
}

/// A pipeline stage descriptor: the trigger conjunction and the handler run
/// when every trigger bit is present.
#[allow(async_fn_in_trait)]
pub trait Stage {
    /// Name used in logs.
    const NAME: &'static str;
    /// Signals that must all be pending before the handler runs; the driver
    /// drains exactly these on dispatch.
    const TRIGGER: Signals;

    /// Runs one cycle; returns the signals to publish, if any.
    async fn run(&mut self, ctx: &Context) -> Option<Signals>;
}

/// Drives one stage forever: wait for the trigger conjunction, dispatch,
/// publish the handler's output. A timed-out wait is not an error — the
/// stage simply re-arms it.
pub async fn drive<S: Stage>(ctx: &Context, mut stage: S) -> ! {
    debug!("{} stage running", S::NAME);
    loop {
        if ctx
            .events
            .wait_all_timeout(S::TRIGGER, ctx.config.signal_wait)
            .await
            .is_err()
        {
            continue;
        }
        if let Some(output) = stage.run(ctx).await {
            ctx.events.set(output);
        }
    }
}

/// Feeds the raw buffer from the receiver port: every armed receive fills
/// the buffer in place and announces [`RAW_RECEIVED`].
///
/// A failed receive still completes the cycle with an empty buffer — the
/// parse stage reports the missing fix and the pipeline re-arms, so a flaky
/// receiver degrades to skipped cycles instead of a stall.
pub async fn acquire<P: GnssPort>(ctx: &Context, mut port: P) -> ! {
    loop {
        ctx.rearm.wait().await;
        let mut chunk = [0u8; RAW_CAPACITY];
        match port.read(&mut chunk).await {
            Ok(count) => {
                ctx.with_raw(|raw| {
                    raw.clear();
                    let _ = raw.extend_from_slice(&chunk[..count]);
                });
            }
            Err(error) => {
                warn!("raw receive failed: {:?}", error);
                ctx.with_raw(|raw| raw.clear());
            }
        }
        ctx.events.set(RAW_RECEIVED);
    }
}
