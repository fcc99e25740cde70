#![no_std]
#![no_main]

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::gpio::Pin as _;
use esp_println as _;
use static_cell::StaticCell;

use drover::config::TrackerConfig;
use drover::gnss::driver::{GnssUart, GNSS_BAUD_RATE};
use drover::modem::driver::{ModemUartRx, ModemUartTx, MODEM_BAUD_RATE};
use drover::modem::{set_net_connectivity, CommandTransactor};
use drover::pipeline::{
    acquire, drive, ClassifyStage, ConnectionGateStage, Context, ParseStage, RateControlStage,
    ReissueReadStage, UplinkStage,
};
use drover::port::NullFailureStore;

type TransactorLock = drover::pipeline::TransactorLock<ModemUartTx, ModemUartRx>;

static CONTEXT: StaticCell<Context> = StaticCell::new();
static TRANSACTOR: StaticCell<TransactorLock> = StaticCell::new();

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    let peripherals = esp_hal::init(esp_hal::Config::default());
    let timg0 = esp_hal::timer::timg::TimerGroup::new(peripherals.TIMG0);
    esp_hal_embassy::init(timg0.timer0);

    defmt::info!("vehicle tracker starting");

    let config = TrackerConfig::default();
    let apn = config.apn.clone();
    let response_timeout = config.response_timeout;
    let max_attempts = config.max_attempts;

    let gnss = GnssUart::new(
        peripherals.UART1,
        drover::gnss::driver::Config {
            baud_rate: GNSS_BAUD_RATE,
            rx_pin: peripherals.GPIO18.degrade(),
        },
    )
    .expect("GNSS UART bring-up");

    let (modem_tx, modem_rx) = drover::modem::driver::split(
        peripherals.UART2,
        drover::modem::driver::Config {
            baud_rate: MODEM_BAUD_RATE,
            rx_pin: peripherals.GPIO16.degrade(),
            tx_pin: peripherals.GPIO17.degrade(),
        },
    )
    .expect("modem UART bring-up");

    let transactor: &'static TransactorLock =
        TRANSACTOR.init(TransactorLock::new(CommandTransactor::new(
            modem_tx,
            modem_rx,
            response_timeout,
            max_attempts,
        )));

    // Bearer and HTTP service come up before the pipeline starts, so the
    // first uplink does not race the modem's boot chatter.
    {
        let mut transactor = transactor.lock().await;
        if let Err(error) = set_net_connectivity(&mut transactor, &apn).await {
            defmt::warn!("modem bring-up incomplete: {:?}", error);
        }
    }

    let ctx: &'static Context = CONTEXT.init(Context::new(config));

    // Issue the first read; every later one is armed by the re-issue stage.
    ctx.arm_read();

    spawner.must_spawn(acquisition_task(ctx, gnss));
    spawner.must_spawn(uplink_timer_task(ctx));
    spawner.must_spawn(parse_task(ctx));
    spawner.must_spawn(reissue_task(ctx));
    spawner.must_spawn(classify_task(ctx));
    spawner.must_spawn(rate_task(ctx));
    spawner.must_spawn(gate_task(ctx, transactor));
    spawner.must_spawn(uplink_task(ctx, transactor));
}

#[embassy_executor::task]
async fn acquisition_task(ctx: &'static Context, gnss: GnssUart) {
    acquire(ctx, gnss).await
}

#[embassy_executor::task]
async fn uplink_timer_task(ctx: &'static Context) {
    ctx.timer.run(&ctx.events).await
}

#[embassy_executor::task]
async fn parse_task(ctx: &'static Context) {
    drive(ctx, ParseStage).await
}

#[embassy_executor::task]
async fn reissue_task(ctx: &'static Context) {
    drive(ctx, ReissueReadStage).await
}

#[embassy_executor::task]
async fn classify_task(ctx: &'static Context) {
    drive(ctx, ClassifyStage).await
}

#[embassy_executor::task]
async fn rate_task(ctx: &'static Context) {
    drive(ctx, RateControlStage).await
}

#[embassy_executor::task]
async fn gate_task(ctx: &'static Context, transactor: &'static TransactorLock) {
    drive(ctx, ConnectionGateStage::new(transactor, NullFailureStore)).await
}

#[embassy_executor::task]
async fn uplink_task(ctx: &'static Context, transactor: &'static TransactorLock) {
    drive(ctx, UplinkStage::new(transactor, NullFailureStore)).await
}
