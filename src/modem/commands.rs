//! The SIM800-dialect AT command set.

use heapless::String;

use crate::config::ApnConfig;

use super::error::CommandTooLong;

/// Tail of every successful exchange.
pub const OK: &[u8] = b"OK\r\n";
/// Failure marker; scanning for it only starts once `OK` is absent.
pub const ERROR_MARKER: &[u8] = b"ERROR";

/// Liveness poll.
pub const TEST: &[u8] = b"AT\r\n";
/// Configure bearer profile 1 for GPRS.
pub const SET_BEARER_GPRS: &[u8] = b"AT+SAPBR=3,1,\"Contype\",\"GPRS\"\r\n";
/// Open the GPRS context.
pub const ACTIVATE_GPRS: &[u8] = b"AT+SAPBR=1,1\r\n";
/// Start the HTTP service.
pub const INIT_HTTP: &[u8] = b"AT+HTTPINIT\r\n";
/// Enable TLS for the HTTP service.
pub const ENABLE_TLS: &[u8] = b"AT+HTTPSSL=1\r\n";
/// Point HTTP requests at bearer profile 1.
pub const SET_CID_PARAM: &[u8] = b"AT+HTTPPARA=\"CID\",1\r\n";
/// Fire the GET request.
pub const HTTP_GET: &[u8] = b"AT+HTTPACTION=0\r\n";
/// Tear the HTTP service down.
pub const TERMINATE_HTTP: &[u8] = b"AT+HTTPTERM\r\n";

/// Capacity of the prepared URL command.
pub const LINK_CAPACITY: usize = 224;
const APN_CAPACITY: usize = 96;

/// The URL-parameter command carrying the fix coordinates.
pub type RequestLink = String<LINK_CAPACITY>;

/// Builds the APN configuration command.
pub fn apn_command(apn: &ApnConfig) -> Result<String<APN_CAPACITY>, CommandTooLong> {
    let mut command = String::new();
    for part in [
        "AT+CSTT=\"",
        apn.apn,
        "\",\"",
        apn.user,
        "\",\"",
        apn.password,
        "\"\r\n",
    ] {
        command.push_str(part).map_err(|_| CommandTooLong)?;
    }
    Ok(command)
}

/// Prepares the URL-parameter command for one fix:
/// `AT+HTTPPARA="URL","<base>lat=<lat>&lon=<lon>"\r\n`.
///
/// The coordinates go in exactly as the receiver sent them.
pub fn prepare_link(
    link: &mut RequestLink,
    base_url: &str,
    latitude: &str,
    longitude: &str,
) -> Result<(), CommandTooLong> {
    link.clear();
    for part in [
        "AT+HTTPPARA=\"URL\",\"",
        base_url,
        "lat=",
        latitude,
        "&lon=",
        longitude,
        "\"\r\n",
    ] {
        link.push_str(part).map_err(|_| CommandTooLong)?;
    }
    Ok(())
}
