//! GPS receiver support: fix decoding and motion classification.

pub mod error;
pub mod fix;
pub mod motion;

// ESP32-specific modules
#[cfg(feature = "esp32")]
pub mod driver;
