use crate::port::PortError;

/// One exchange's failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionError {
    /// The modem answered with the error marker.
    Failed,
    /// No verdict within the response deadline.
    Timeout,
    /// The response budget filled without a verdict.
    Overrun,
    /// The raw link itself failed.
    Port(PortError),
}

/// A strictly-ordered command sequence aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceAborted {
    /// Index of the entry whose retry budget ran out.
    pub entry: usize,
    /// The final attempt's error.
    pub cause: TransactionError,
}

/// A built command did not fit its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandTooLong;
