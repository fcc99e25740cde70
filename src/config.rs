use embassy_time::Duration;

/// Top-level tracker configuration.
///
/// Defaults mirror the deployed behavior: receiver-warning fixes are still
/// transmit-worthy, five attempts per modem exchange, ten-second signal
/// waits, a thirty-second uplink period until the first rate change.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Whether a `'V'` (receiver warning) fix may still be uplinked.
    ///
    /// The stricter reading of the receiver contract would reject them;
    /// field units have always shipped with `true`.
    pub accept_warning_fixes: bool,

    /// Base endpoint the request URL is built on. Must end with the query
    /// separator so `lat=..&lon=..` can be appended directly.
    pub base_url: &'static str,

    /// APN credentials for GPRS bring-up.
    pub apn: ApnConfig,

    /// How long a stage blocks on its trigger signals before re-arming the
    /// wait. Expiry is not an error; the stage just waits again.
    pub signal_wait: Duration,

    /// Deadline for one command/response exchange with the modem.
    pub response_timeout: Duration,

    /// Attempts per exchange before the failure hook fires.
    pub max_attempts: u8,

    /// Uplink timer period until the first rate change, in milliseconds.
    pub initial_period_ms: u32,
}

/// Access-point-name triple handed to the modem during bring-up.
#[derive(Debug, Clone)]
pub struct ApnConfig {
    pub apn: &'static str,
    pub user: &'static str,
    pub password: &'static str,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            accept_warning_fixes: true,
            base_url: "https://tracker.example.com/report?",
            apn: ApnConfig {
                apn: "internet.vodafone.net",
                user: "internet",
                password: "internet",
            },
            signal_wait: Duration::from_secs(10),
            response_timeout: Duration::from_secs(10),
            max_attempts: 5,
            initial_period_ms: 30_000,
        }
    }
}
