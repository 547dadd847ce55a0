//! Blink an LED on a board attached over USB serial.
//!
//! Pin 13 is toggled once a second. Unplugging the board makes the
//! watchdog fire; the transport keeps reconnecting in the background and
//! restores pin 13 to output once the board is back.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=info cargo run --example serial_blink -- /dev/ttyACM0
//! ```

use std::time::Duration;

use rs_arest::hal::SystemPortOpener;
use rs_arest::{Board, BoardEvent, Context, PinMode, PinNumber, SerialConfig, SerialTransport};

/// Pin with the on-board LED on most Arduino-style boards.
const LED_PIN: PinNumber = 13;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let config = SerialConfig::new(path).with_response_timeout_ms(2_000);
    let board = SerialTransport::new(config, SystemPortOpener);

    let mut events = board.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event == BoardEvent::Timeout {
                log::warn!("board went silent, waiting for it to come back");
            } else {
                log::info!("board event: {}", event);
            }
        }
    });

    let ctx = Context::background();
    board.connect(&ctx).await?;
    board.set_pin_mode(&ctx, LED_PIN, PinMode::Output).await?;

    let mut level = 0;
    loop {
        level ^= 1;
        let step = Context::with_timeout(Duration::from_secs(3));
        if let Err(e) = board.digital_write(&step, LED_PIN, level).await {
            log::warn!("write failed: {}", e);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
