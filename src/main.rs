#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use anyhow::{anyhow, Context};

use avr_isp_bridge::linux::{self, LinuxBus};
use avr_isp_bridge::{Bridge, Options};

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    /// Serial port the host programmer connects to
    #[structopt(long, default_value = "/dev/ttyGS0")]
    port: String,

    /// Serial port baud rate
    #[structopt(long, default_value = "115200")]
    baud: usize,

    /// SPI device wired to the target
    #[structopt(long, default_value = "/dev/spidev0.0")]
    spi: String,

    /// SPI clock, must be below a quarter of the target clock
    #[structopt(long, default_value = "100000")]
    spi_speed_hz: u32,

    /// GPIO driving the target reset line
    #[structopt(long, default_value = "25")]
    reset_gpio: u64,

    /// GPIO for the error LED
    #[structopt(long)]
    fault_led: Option<u64>,

    /// GPIO for the programming LED
    #[structopt(long)]
    active_led: Option<u64>,

    #[structopt(flatten)]
    options: Options,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let _ = SimpleLogger::init(o.log_level, Config::default());

    info!("Opening target bus");

    let bus = LinuxBus::open(&o.spi, o.reset_gpio, o.spi_speed_hz)
        .map_err(|e| anyhow!("Error opening {}: {:?}", o.spi, e))?;

    let leds = linux::leds(o.fault_led, o.active_led)
        .map_err(|e| anyhow!("Error exporting LED GPIOs: {:?}", e))?;

    info!("Connecting to serial port");

    let mut bridge = Bridge::linux(&o.port, o.baud, bus, leds, o.options.clone())
        .with_context(|| format!("Error connecting to serial port {}", o.port))?;

    info!("Bridge ready, waiting for host");

    bridge.run().context("Bridge stopped")?;

    Ok(())
}
