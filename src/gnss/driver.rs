use esp_hal::{
    gpio::AnyPin,
    peripherals::UART1,
    uart::{self, RxConfig, UartRx},
    Async,
};

use crate::port::{GnssPort, PortError};

pub const GNSS_BAUD_RATE: u32 = 9600;

pub struct Config {
    pub baud_rate: u32,
    pub rx_pin: AnyPin,
}

/// RX half of the UART wired to the GPS receiver.
pub struct GnssUart {
    uart: UartRx<'static, Async>,
}

impl GnssUart {
    pub fn new(uart1: UART1, config: Config) -> Result<Self, PortError> {
        let uart_config = uart::Config::default()
            .with_baudrate(config.baud_rate)
            .with_rx(RxConfig::default().with_fifo_full_threshold(1024));

        let uart = UartRx::new(uart1, uart_config)
            .map_err(|_| PortError::Read)?
            .with_rx(config.rx_pin)
            .into_async();

        Ok(Self { uart })
    }
}

impl GnssPort for GnssUart {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        self.uart
            .read_async(buf)
            .await
            .map_err(|_| PortError::Read)
    }
}
