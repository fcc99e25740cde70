//! The hardware boundary.
//!
//! Everything below this seam is board support: UART bring-up, DMA, pin
//! muxing. The pipeline and the transactor only ever talk to these traits;
//! the `esp32` feature wires them to real UARTs, the host feature to
//! scripted doubles.

use crate::fmt::warn;

/// A raw byte-transfer primitive failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortError {
    /// The receive channel failed.
    Read,
    /// The transmit channel failed.
    Write,
}

/// Receive half of the GPS receiver link.
#[allow(async_fn_in_trait)]
pub trait GnssPort {
    /// Completes one raw receive into `buf`, returning the byte count.
    /// Resolution stands in for the receive-completion interrupt; the
    /// caller is the one that turns it into a signal.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError>;
}

/// Transmit half of the modem link. Fire-and-forget: completion of a
/// transmit is only ever observed through the response side.
#[allow(async_fn_in_trait)]
pub trait ModemTx {
    async fn transmit(&mut self, bytes: &[u8]) -> Result<(), PortError>;
}

/// Receive half of the modem link.
#[allow(async_fn_in_trait)]
pub trait ModemRx {
    /// Waits for the next chunk of modem output, returning the byte count.
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, PortError>;
}

/// What was being attempted when a retry budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UplinkFailure {
    /// The link-verification exchange never succeeded.
    ConnectionCheck,
    /// The uplink sequence aborted at the given entry.
    Sequence { entry: usize },
}

/// Sink for exhausted transactions, reserved for a non-volatile record of
/// fixes that never made it out.
pub trait FailureStore {
    fn record(&mut self, failure: UplinkFailure);
}

/// Discards failure records. Stands in until a non-volatile log exists.
#[derive(Debug, Default)]
pub struct NullFailureStore;

impl FailureStore for NullFailureStore {
    fn record(&mut self, failure: UplinkFailure) {
        warn!("dropping failure record: {:?}", failure);
    }
}
