#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GnssError {
    /// No RMC-tagged sentence anywhere in the raw buffer.
    NoFixSentence,
    MissingField(&'static str), // Specify which field is missing
    /// A field that should be numeric did not parse.
    BadNumber(&'static str),
    /// A text field exceeded its on-wire width.
    FieldTooLong(&'static str),
}
