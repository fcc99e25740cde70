//! Scripted stand-ins for the hardware ports.
//!
//! Same traits as the UART drivers, backed by in-memory scripts, so the
//! pipeline and the transactor run unmodified in native tests.

use core::future::poll_fn;
use core::task::Poll;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use crate::port::{FailureStore, GnssPort, ModemRx, ModemTx, PortError, UplinkFailure};

/// Replays canned receiver buffers, one per armed receive. An exhausted
/// script behaves like a silent receiver: the read never completes.
pub struct ScriptedGnss {
    script: VecDeque<Vec<u8>>,
}

impl ScriptedGnss {
    pub fn new(buffers: &[&[u8]]) -> Self {
        Self {
            script: buffers.iter().map(|b| b.to_vec()).collect(),
        }
    }
}

impl GnssPort for ScriptedGnss {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        let Some(next) = self.script.pop_front() else {
            return core::future::pending().await;
        };
        let count = next.len().min(buf.len());
        buf[..count].copy_from_slice(&next[..count]);
        Ok(count)
    }
}

struct ModemScript {
    transmitted: Vec<Vec<u8>>,
    responses: VecDeque<Vec<u8>>,
    auto_ok: bool,
}

/// A scripted modem: records every transmission and serves responses one
/// chunk per receive, so tests control exactly how a reply arrives.
pub struct ScriptedModem {
    state: Rc<RefCell<ModemScript>>,
}

impl ScriptedModem {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ModemScript {
                transmitted: Vec::new(),
                responses: VecDeque::new(),
                auto_ok: false,
            })),
        }
    }

    /// A modem that answers `OK\r\n` to everything.
    pub fn always_ok() -> Self {
        let modem = Self::new();
        modem.state.borrow_mut().auto_ok = true;
        modem
    }

    /// Queues one response chunk; each queued chunk is delivered by exactly
    /// one receive call.
    pub fn push_response(&self, chunk: &[u8]) {
        self.state.borrow_mut().responses.push_back(chunk.to_vec());
    }

    pub fn split(&self) -> (ScriptedModemTx, ScriptedModemRx) {
        (
            ScriptedModemTx {
                state: Rc::clone(&self.state),
            },
            ScriptedModemRx {
                state: Rc::clone(&self.state),
            },
        )
    }

    /// Everything transmitted so far, oldest first.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.state.borrow().transmitted.clone()
    }

    /// Resolves once at least `count` transmissions have been recorded.
    pub async fn wait_for_transmissions(&self, count: usize) -> Vec<Vec<u8>> {
        poll_fn(|cx| {
            let state = self.state.borrow();
            if state.transmitted.len() >= count {
                Poll::Ready(state.transmitted.clone())
            } else {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
        .await
    }
}

impl Default for ScriptedModem {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScriptedModemTx {
    state: Rc<RefCell<ModemScript>>,
}

impl ModemTx for ScriptedModemTx {
    async fn transmit(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        let mut state = self.state.borrow_mut();
        state.transmitted.push(bytes.to_vec());
        if state.auto_ok {
            state.responses.push_back(b"OK\r\n".to_vec());
        }
        Ok(())
    }
}

pub struct ScriptedModemRx {
    state: Rc<RefCell<ModemScript>>,
}

impl ModemRx for ScriptedModemRx {
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        poll_fn(|cx| {
            let mut state = self.state.borrow_mut();
            let Some(mut chunk) = state.responses.pop_front() else {
                cx.waker().wake_by_ref();
                return Poll::Pending;
            };
            let count = chunk.len().min(buf.len());
            buf[..count].copy_from_slice(&chunk[..count]);
            if count < chunk.len() {
                // Oversized chunk: keep the tail for the next receive.
                chunk.drain(..count);
                state.responses.push_front(chunk);
            }
            Poll::Ready(Ok(count))
        })
        .await
    }
}

/// Remembers every failure record for later assertions.
#[derive(Clone, Default)]
pub struct RecordingFailures {
    records: Rc<RefCell<Vec<UplinkFailure>>>,
}

impl RecordingFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UplinkFailure> {
        self.records.borrow().clone()
    }
}

impl FailureStore for RecordingFailures {
    fn record(&mut self, failure: UplinkFailure) {
        self.records.borrow_mut().push(failure);
    }
}
