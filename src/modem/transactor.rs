//! One-at-a-time AT command exchanges with bounded retry.

use embassy_time::{with_timeout, Duration, Instant};
use heapless::Vec;

use crate::fmt::debug;
use crate::port::{ModemRx, ModemTx};

use super::commands::ERROR_MARKER;
use super::error::{SequenceAborted, TransactionError};

/// Fixed margin the response budget adds for command echo and framing.
const RESPONSE_MARGIN: usize = 20;
/// Capacity of the owned response buffer.
pub const RESPONSE_CAPACITY: usize = 256;
/// Drain granularity for the modem link.
const CHUNK: usize = 32;

/// One entry of a command sequence.
#[derive(Debug, Clone, Copy)]
pub struct Command<'a> {
    pub request: &'a [u8],
    pub expected: &'a [u8],
}

/// Executes request/response exchanges over the modem link.
///
/// The transactor owns its response buffer, so exchanges compose without any
/// shared scratch space; system-wide "one exchange in flight" is enforced by
/// the mutex the pipeline wraps the transactor in.
pub struct CommandTransactor<T, R> {
    tx: T,
    rx: R,
    response: Vec<u8, RESPONSE_CAPACITY>,
    response_timeout: Duration,
    max_attempts: u8,
}

impl<T: ModemTx, R: ModemRx> CommandTransactor<T, R> {
    pub fn new(tx: T, rx: R, response_timeout: Duration, max_attempts: u8) -> Self {
        Self {
            tx,
            rx,
            response: Vec::new(),
            response_timeout,
            max_attempts,
        }
    }

    /// One exchange: transmit `request`, then drain response chunks against
    /// the deadline, scanning for `expected` first and the generic error
    /// marker second after every chunk.
    ///
    /// The response budget is the transmitted length (the modem echoes the
    /// command) plus the expected tail plus a fixed margin; a response that
    /// fills the budget without producing a verdict is an
    /// [`TransactionError::Overrun`]. Whatever the verdict, the buffer is
    /// cleared before returning so the next exchange starts clean.
    pub async fn execute(
        &mut self,
        request: &[u8],
        expected: &[u8],
    ) -> Result<(), TransactionError> {
        let budget = (request.len() + expected.len() + RESPONSE_MARGIN).min(RESPONSE_CAPACITY);
        self.response.clear();
        self.tx
            .transmit(request)
            .await
            .map_err(TransactionError::Port)?;

        let deadline = Instant::now() + self.response_timeout;
        let verdict = loop {
            let now = Instant::now();
            if now >= deadline {
                break Err(TransactionError::Timeout);
            }
            let mut chunk = [0u8; CHUNK];
            let read = with_timeout(deadline - now, self.rx.receive(&mut chunk)).await;
            let count = match read {
                Ok(Ok(count)) => count,
                Ok(Err(error)) => break Err(TransactionError::Port(error)),
                Err(_) => break Err(TransactionError::Timeout),
            };
            for &byte in &chunk[..count] {
                if self.response.len() < budget {
                    let _ = self.response.push(byte);
                }
            }
            if contains(&self.response, expected) {
                break Ok(());
            }
            if contains(&self.response, ERROR_MARKER) {
                break Err(TransactionError::Failed);
            }
            if self.response.len() >= budget {
                break Err(TransactionError::Overrun);
            }
        };
        self.response.clear();
        verdict
    }

    /// Retries [`execute`](Self::execute) up to the configured attempt
    /// bound, back to back, returning the final attempt's error.
    pub async fn execute_with_retry(
        &mut self,
        request: &[u8],
        expected: &[u8],
    ) -> Result<(), TransactionError> {
        let mut last = TransactionError::Timeout;
        for attempt in 1..=self.max_attempts {
            match self.execute(request, expected).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    debug!(
                        "exchange attempt {}/{} failed: {:?}",
                        attempt,
                        self.max_attempts,
                        error
                    );
                    last = error;
                }
            }
        }
        Err(last)
    }

    /// Runs `sequence` strictly in order. The first entry whose retry budget
    /// runs out aborts the whole pass; entries after it are never
    /// transmitted.
    pub async fn run_sequence(
        &mut self,
        sequence: &[Command<'_>],
    ) -> Result<(), SequenceAborted> {
        for (entry, command) in sequence.iter().enumerate() {
            if let Err(cause) = self
                .execute_with_retry(command.request, command.expected)
                .await
            {
                return Err(SequenceAborted { entry, cause });
            }
        }
        Ok(())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}
