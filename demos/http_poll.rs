//! Watch a variable on a WiFi board and call a function when it changes.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=debug cargo run --example http_poll -- http://192.168.1.50 temperature
//! ```

use std::sync::Arc;
use std::time::Duration;

use rs_arest::drivers::{Driver, DriverEvent, FunctionDriver, ValueDriver};
use rs_arest::{Board, Context, HttpConfig, HttpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "http://192.168.1.50".to_string());
    let variable = args.next().unwrap_or_else(|| "temperature".to_string());

    let config = HttpConfig::new(url).with_timeout_ms(3_000).with_debug(true);
    let board: Arc<dyn Board> = Arc::new(HttpTransport::new(config)?);
    board.connect(&Context::background()).await?;

    let driver = ValueDriver::new(board.clone(), variable).with_interval(Duration::from_secs(2));
    let notify = FunctionDriver::new(board, "notify");
    let mut events = driver.subscribe();
    driver.start();

    while let Ok(event) = events.recv().await {
        match event {
            DriverEvent::NewValue(value) => {
                log::info!("{} = {}", driver.name(), value);
                notify.set_parameters(value.to_string());
                if let Err(e) = notify.call(&Context::with_timeout(Duration::from_secs(3))).await {
                    log::warn!("notify failed: {}", e);
                }
            }
            DriverEvent::Error(e) => log::warn!("poll failed: {}", e),
            DriverEvent::NewValues(_) => {}
        }
    }

    driver.halt();
    Ok(())
}
