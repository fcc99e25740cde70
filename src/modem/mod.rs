//! SIM800-dialect modem support: the AT command set, the retrying
//! request/response transactor, and network bring-up.

pub mod commands;
pub mod error;
pub mod transactor;

// ESP32-specific modules
#[cfg(feature = "esp32")]
pub mod driver;

pub use transactor::{Command, CommandTransactor};

use crate::config::ApnConfig;
use crate::fmt::warn;
use crate::port::{ModemRx, ModemTx};
use error::CommandTooLong;

/// Brings the GPRS bearer and the HTTP service up.
///
/// The modem may still be booting, so the liveness poll repeats until it
/// answers; each attempt is itself deadline-bounded, so this yields. The
/// remaining bring-up commands are best-effort: a refusal is logged and the
/// sequence moves on, since a half-configured bearer still fails loudly at
/// the first real exchange.
pub async fn set_net_connectivity<T: ModemTx, R: ModemRx>(
    transactor: &mut CommandTransactor<T, R>,
    apn: &ApnConfig,
) -> Result<(), CommandTooLong> {
    while transactor
        .execute(commands::TEST, commands::OK)
        .await
        .is_err()
    {}

    let apn_command = commands::apn_command(apn)?;
    let bring_up: [&[u8]; 4] = [
        commands::SET_BEARER_GPRS,
        apn_command.as_bytes(),
        commands::ACTIVATE_GPRS,
        commands::INIT_HTTP,
    ];
    for request in bring_up {
        if let Err(error) = transactor.execute(request, commands::OK).await {
            warn!("bring-up command refused: {:?}", error);
        }
    }
    Ok(())
}
