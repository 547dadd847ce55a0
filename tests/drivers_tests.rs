//! Polling drivers on top of the serial transport and in-memory board.

use std::sync::Arc;
use std::time::Duration;

use rs_arest::drivers::{Driver, DriverEvent, FunctionDriver, ValueDriver, ValuesDriver};
use rs_arest::hal::{MockPortOpener, MockSerialPort};
use rs_arest::{Board, BoardError, Context, SerialConfig, SerialTransport};
use serde_json::json;
use tokio::sync::broadcast;

const TICK: Duration = Duration::from_millis(20);

async fn board() -> (Arc<dyn Board>, MockSerialPort) {
    let port = MockSerialPort::new();
    let config = SerialConfig::new("mock")
        .with_settle_delay_ms(0)
        .with_read_poll_ms(2)
        .with_response_timeout_ms(500);
    let board = SerialTransport::new(config, MockPortOpener::new(port.clone()));
    board.connect(&Context::background()).await.unwrap();
    (Arc::new(board), port)
}

async fn next(rx: &mut broadcast::Receiver<DriverEvent>) -> DriverEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("driver event")
        .expect("open channel")
}

// ============================================================================
// ValueDriver Tests
// ============================================================================

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn value_driver_publishes_only_changes() {
    let (board, port) = board().await;
    port.firmware(|fw| fw.set_variable("temperature", 20));

    let driver = ValueDriver::new(board, "temperature").with_interval(TICK);
    let mut rx = driver.subscribe();
    driver.start();
    assert!(driver.is_running());

    assert!(matches!(next(&mut rx).await, DriverEvent::NewValue(v) if v == json!(20)));

    // Several polls with the same value publish nothing.
    tokio::time::sleep(TICK * 4).await;
    assert!(rx.try_recv().is_err());

    port.firmware(|fw| fw.set_variable("temperature", 21));
    assert!(matches!(next(&mut rx).await, DriverEvent::NewValue(v) if v == json!(21)));

    driver.halt();
    assert!(!driver.is_running());
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn value_driver_reports_errors() {
    let (board, _) = board().await;
    let driver = ValueDriver::new(board, "missing").with_interval(TICK);
    let mut rx = driver.subscribe();
    driver.start();

    match next(&mut rx).await {
        DriverEvent::Error(e) => assert!(matches!(e, BoardError::VariableNotFound(_))),
        other => panic!("expected error, got {:?}", other),
    }
    driver.halt();
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn halted_driver_stays_quiet() {
    let (board, port) = board().await;
    port.firmware(|fw| fw.set_variable("counter", 1));

    let driver = ValueDriver::new(board, "counter").with_interval(TICK);
    let mut rx = driver.subscribe();
    driver.start();
    next(&mut rx).await;
    driver.halt();
    assert!(!driver.is_running());
    tokio::time::sleep(TICK).await;
    while rx.try_recv().is_ok() {}

    port.firmware(|fw| fw.set_variable("counter", 2));
    tokio::time::sleep(TICK * 4).await;
    assert!(rx.try_recv().is_err());
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn driver_names() {
    let (board, _) = board().await;
    let driver = ValueDriver::new(board.clone(), "temperature");
    assert_eq!(driver.name(), "temperature");
    assert_eq!(driver.variable(), "temperature");
    driver.set_name("kitchen");
    assert_eq!(driver.name(), "kitchen");

    let values = ValuesDriver::new(board);
    assert_eq!(values.name(), "values");
}

// ============================================================================
// ValuesDriver Tests
// ============================================================================

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn values_driver_publishes_variable_map() {
    let (board, port) = board().await;
    port.firmware(|fw| fw.set_variable("isRebooted", false));

    let driver = ValuesDriver::new(board).with_interval(TICK);
    let mut rx = driver.subscribe();
    driver.start();

    match next(&mut rx).await {
        DriverEvent::NewValues(vars) => {
            assert_eq!(vars.get("isRebooted"), Some(&json!(false)));
        }
        other => panic!("expected values, got {:?}", other),
    }

    port.firmware(|fw| fw.set_variable("isRebooted", true));
    match next(&mut rx).await {
        DriverEvent::NewValues(vars) => {
            assert_eq!(vars.get("isRebooted"), Some(&json!(true)));
        }
        other => panic!("expected values, got {:?}", other),
    }
    driver.halt();
}

// ============================================================================
// FunctionDriver Tests
// ============================================================================

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn function_driver_call_checks_return_code() {
    let (board, port) = board().await;
    port.firmware(|fw| fw.set_function("reset", 0));

    let driver = FunctionDriver::new(board, "reset");
    driver.set_parameters("now");
    assert_eq!(driver.parameters(), "now");

    let ctx = Context::background();
    assert_eq!(driver.call(&ctx).await.unwrap(), 0);
    assert_eq!(
        port.firmware(|fw| fw.calls.clone()),
        vec![("reset".to_string(), "now".to_string())]
    );

    let mut rx = driver.subscribe();
    port.firmware(|fw| fw.set_function("reset", 3));
    let err = driver.call(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        BoardError::ReturnCodeMismatch { expected: 0, actual: 3, .. }
    ));
    assert!(matches!(
        next(&mut rx).await,
        DriverEvent::Error(BoardError::ReturnCodeMismatch { .. })
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn function_driver_expected_code_and_not_found() {
    let (board, port) = board().await;
    port.firmware(|fw| fw.set_function("blink", 1));
    let ctx = Context::background();

    let blink = FunctionDriver::new(board.clone(), "blink").with_expected_return(1);
    assert_eq!(blink.call(&ctx).await.unwrap(), 1);

    let missing = FunctionDriver::new(board, "nope");
    assert!(matches!(
        missing.call(&ctx).await,
        Err(BoardError::FunctionNotFound(_))
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn function_driver_polls_return_code() {
    let (board, port) = board().await;
    port.firmware(|fw| fw.set_function("status", 4));

    let driver = FunctionDriver::new(board, "status").with_interval(TICK);
    let mut rx = driver.subscribe();
    driver.start();

    assert!(matches!(next(&mut rx).await, DriverEvent::NewValue(v) if v == json!(4)));
    driver.halt();
}
