use esp_hal::{
    gpio::AnyPin,
    peripherals::UART2,
    uart::{self, RxConfig, Uart, UartRx, UartTx},
    Async,
};

use crate::port::{ModemRx, ModemTx, PortError};

pub const MODEM_BAUD_RATE: u32 = 9600;

pub struct Config {
    pub baud_rate: u32,
    pub rx_pin: AnyPin,
    pub tx_pin: AnyPin,
}

/// TX half of the UART wired to the modem.
pub struct ModemUartTx {
    uart: UartTx<'static, Async>,
}

/// RX half of the UART wired to the modem.
pub struct ModemUartRx {
    uart: UartRx<'static, Async>,
}

/// Brings the modem UART up and splits it into the halves the transactor
/// owns.
pub fn split(uart2: UART2, config: Config) -> Result<(ModemUartTx, ModemUartRx), PortError> {
    let uart_config = uart::Config::default()
        .with_baudrate(config.baud_rate)
        .with_rx(RxConfig::default().with_fifo_full_threshold(1024));

    let uart = Uart::new(uart2, uart_config)
        .map_err(|_| PortError::Read)?
        .with_rx(config.rx_pin)
        .with_tx(config.tx_pin)
        .into_async();

    let (rx, tx) = uart.split();
    Ok((ModemUartTx { uart: tx }, ModemUartRx { uart: rx }))
}

impl ModemTx for ModemUartTx {
    async fn transmit(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        let mut rest = bytes;
        while !rest.is_empty() {
            let written = self
                .uart
                .write_async(rest)
                .await
                .map_err(|_| PortError::Write)?;
            rest = &rest[written..];
        }
        self.uart.flush_async().await.map_err(|_| PortError::Write)
    }
}

impl ModemRx for ModemUartRx {
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        self.uart
            .read_async(buf)
            .await
            .map_err(|_| PortError::Read)
    }
}
