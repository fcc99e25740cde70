//! The signal group the pipeline stages handshake through.
//!
//! A small event-group primitive: producers set bits (from task or
//! receive-completion interrupt context), consumers wait for a conjunction
//! of bits and atomically clear exactly those bits when the wait succeeds.
//! Different tasks can wait on independent masks without interfering, since
//! each only ever clears what it demanded.

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Poll, Waker};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{with_timeout, Duration};
use heapless::Vec;

/// Bit mask over the pipeline's handshake signals.
pub type Signals = u32;

/// A raw GPS receive completed into the shared buffer.
pub const RAW_RECEIVED: Signals = 1 << 0;
/// The raw buffer was decoded (or explicitly failed to decode) into the fix store.
pub const FIX_PARSED: Signals = 1 << 1;
/// The next raw receive has been armed.
pub const READ_REISSUED: Signals = 1 << 2;
/// The stored fix passed the validity gate and its request link is prepared.
pub const FIX_VALID: Signals = 1 << 3;
/// The committed motion category changed since the previous cycle.
pub const RATE_CHANGED: Signals = 1 << 4;
/// The periodic uplink timer fired. Sticky until the connection gate drains
/// it together with [`FIX_VALID`].
pub const TIMER_FIRED: Signals = 1 << 5;
/// The modem link is verified and ready for the uplink sequence.
pub const CONNECTED: Signals = 1 << 6;

/// Waiter slots; sized for the fixed task set with headroom.
const MAX_WAITERS: usize = 8;

/// The deadline passed before every demanded bit was pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaitTimedOut;

struct State {
    bits: Signals,
    wakers: Vec<Waker, MAX_WAITERS>,
}

/// Multi-bit signal register with wait-all semantics.
pub struct EventGroup {
    state: Mutex<CriticalSectionRawMutex, RefCell<State>>,
}

impl EventGroup {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                bits: 0,
                wakers: Vec::new(),
            })),
        }
    }

    /// Sets every bit in `mask` and wakes all waiters. Idempotent, and safe
    /// to call from a receive-completion interrupt: the critical section is
    /// the only thing held.
    pub fn set(&self, mask: Signals) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.bits |= mask;
            for waker in state.wakers.iter() {
                waker.wake_by_ref();
            }
            state.wakers.clear();
        });
    }

    /// Snapshot of the bits currently pending.
    pub fn pending(&self) -> Signals {
        self.state.lock(|state| state.borrow().bits)
    }

    /// Resolves once every bit of `mask` is pending, clearing exactly those
    /// bits in the same step. Bits outside `mask` are untouched.
    pub fn wait_all(&self, mask: Signals) -> WaitAll<'_> {
        WaitAll { group: self, mask }
    }

    /// [`wait_all`](Self::wait_all) bounded by `timeout`. A timed-out wait
    /// clears nothing; partially-set bits stay pending for the next wait.
    pub async fn wait_all_timeout(
        &self,
        mask: Signals,
        timeout: Duration,
    ) -> Result<(), WaitTimedOut> {
        with_timeout(timeout, self.wait_all(mask))
            .await
            .map_err(|_| WaitTimedOut)
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`EventGroup::wait_all`].
pub struct WaitAll<'a> {
    group: &'a EventGroup,
    mask: Signals,
}

impl Future for WaitAll<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut core::task::Context<'_>) -> Poll<()> {
        self.group.state.lock(|state| {
            let mut state = state.borrow_mut();
            if state.bits & self.mask == self.mask {
                state.bits &= !self.mask;
                return Poll::Ready(());
            }
            let registered = state.wakers.iter().any(|w| w.will_wake(cx.waker()));
            if !registered {
                if let Err(waker) = state.wakers.push(cx.waker().clone()) {
                    // Full: evict the oldest entry and wake it so that task
                    // re-polls and re-registers on its own.
                    let evicted = state.wakers.remove(0);
                    evicted.wake();
                    let _ = state.wakers.push(waker);
                }
            }
            Poll::Pending
        })
    }
}
