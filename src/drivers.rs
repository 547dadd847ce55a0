//! Polling drivers built on the [`Board`] contract.
//!
//! A driver owns a background task that calls one board operation on a fixed
//! interval and publishes a [`DriverEvent`] when the result changes or the
//! call fails.
//!
//! | Driver | Polls | Publishes on change |
//! |--------|-------|---------------------|
//! | [`ValueDriver`] | `read_value(name)` | [`DriverEvent::NewValue`] |
//! | [`ValuesDriver`] | `read_values()` | [`DriverEvent::NewValues`] |
//! | [`FunctionDriver`] | `call_function(name, param)` | [`DriverEvent::NewValue`] |
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rs_arest::drivers::{Driver, DriverEvent, ValueDriver};
//! use rs_arest::{Board, HttpConfig, HttpTransport};
//!
//! # async fn run() -> rs_arest::Result<()> {
//! let board: Arc<dyn Board> = Arc::new(HttpTransport::new(HttpConfig::new("http://10.0.0.7"))?);
//! let driver = ValueDriver::new(board, "temperature").with_interval(Duration::from_secs(1));
//! let mut events = driver.subscribe();
//!
//! driver.start();
//! while let Ok(event) = events.recv().await {
//!     if let DriverEvent::NewValue(v) = event {
//!         println!("temperature is now {}", v);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::error::{BoardError, Result};
use crate::traits::Board;

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

const DRIVER_EVENT_CAPACITY: usize = 16;

/// Event published by a driver.
#[derive(Clone, Debug)]
pub enum DriverEvent {
    /// A single value changed.
    NewValue(Value),
    /// The variable set changed.
    NewValues(Map<String, Value>),
    /// A poll or call failed.
    Error(BoardError),
}

impl DriverEvent {
    /// Stable event name.
    pub const fn name(&self) -> &'static str {
        match self {
            DriverEvent::NewValue(_) => "new-value",
            DriverEvent::NewValues(_) => "new-values",
            DriverEvent::Error(_) => "error",
        }
    }
}

/// Lifecycle shared by all drivers.
pub trait Driver {
    /// Driver name.
    fn name(&self) -> String;
    /// Rename the driver.
    fn set_name(&self, name: &str);
    /// Start polling. Starting a running driver restarts it.
    fn start(&self);
    /// Stop polling.
    fn halt(&self);
}

// ============================================================================
// Poller
// ============================================================================

/// Name, event channel, and the handle of the polling task.
struct Poller {
    name: RwLock<String>,
    interval: Duration,
    events: broadcast::Sender<DriverEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    fn new(name: String) -> Self {
        let (events, _) = broadcast::channel(DRIVER_EVENT_CAPACITY);
        Self {
            name: RwLock::new(name),
            interval: DEFAULT_INTERVAL,
            events,
            task: Mutex::new(None),
        }
    }

    fn name(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_name(&self, name: &str) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }

    fn publish(&self, event: DriverEvent) {
        publish(&self.events, &self.name(), event);
    }

    /// Spawn a task running `poll` every interval. A result is published
    /// only when it differs from the previous successful one; every failure
    /// is published.
    fn start<T, F, Fut>(&self, mut poll: F, into_event: fn(T) -> DriverEvent)
    where
        T: PartialEq + Clone + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        let interval = self.interval;
        let events = self.events.clone();
        let name = self.name();

        let handle = tokio::spawn(async move {
            let mut last: Option<T> = None;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match poll().await {
                    Ok(value) => {
                        if last.as_ref() != Some(&value) {
                            last = Some(value.clone());
                            publish(&events, &name, into_event(value));
                        }
                    }
                    Err(e) => publish(&events, &name, DriverEvent::Error(e)),
                }
            }
        });

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        log::debug!("driver {} started", self.name());
    }

    fn halt(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            log::debug!("driver {} halted", self.name());
        }
    }

    fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.halt();
    }
}

fn publish(events: &broadcast::Sender<DriverEvent>, name: &str, event: DriverEvent) {
    match &event {
        DriverEvent::Error(e) => log::warn!("driver {}: {}", name, e),
        other => log::debug!("driver {}: {}", name, other.name()),
    }
    let _ = events.send(event);
}

// ============================================================================
// ValueDriver
// ============================================================================

/// Polls one named variable.
pub struct ValueDriver {
    board: Arc<dyn Board>,
    variable: String,
    poller: Poller,
}

impl ValueDriver {
    /// Poll `variable` on `board`. The driver is named after the variable.
    pub fn new(board: Arc<dyn Board>, variable: impl Into<String>) -> Self {
        let variable = variable.into();
        Self {
            board,
            poller: Poller::new(variable.clone()),
            variable,
        }
    }

    /// Set the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.poller.interval = interval;
        self
    }

    /// Polled variable.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.poller.events.subscribe()
    }

    /// True while the polling task runs.
    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }
}

impl Driver for ValueDriver {
    fn name(&self) -> String {
        self.poller.name()
    }

    fn set_name(&self, name: &str) {
        self.poller.set_name(name);
    }

    fn start(&self) {
        let board = self.board.clone();
        let variable = self.variable.clone();
        self.poller.start(
            move || {
                let board = board.clone();
                let variable = variable.clone();
                async move { board.read_value(&Context::background(), &variable).await }
            },
            DriverEvent::NewValue,
        );
    }

    fn halt(&self) {
        self.poller.halt();
    }
}

// ============================================================================
// ValuesDriver
// ============================================================================

/// Polls the whole variable set.
pub struct ValuesDriver {
    board: Arc<dyn Board>,
    poller: Poller,
}

impl ValuesDriver {
    /// Poll every variable on `board`.
    pub fn new(board: Arc<dyn Board>) -> Self {
        Self {
            board,
            poller: Poller::new("values".to_string()),
        }
    }

    /// Set the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.poller.interval = interval;
        self
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.poller.events.subscribe()
    }

    /// True while the polling task runs.
    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }
}

impl Driver for ValuesDriver {
    fn name(&self) -> String {
        self.poller.name()
    }

    fn set_name(&self, name: &str) {
        self.poller.set_name(name);
    }

    fn start(&self) {
        let board = self.board.clone();
        self.poller.start(
            move || {
                let board = board.clone();
                async move { board.read_values(&Context::background()).await }
            },
            DriverEvent::NewValues,
        );
    }

    fn halt(&self) {
        self.poller.halt();
    }
}

// ============================================================================
// FunctionDriver
// ============================================================================

/// Calls one named function, on demand or on an interval.
///
/// [`call`](Self::call) checks the return code against the expected code
/// (0 unless changed) and reports a mismatch as an error.
pub struct FunctionDriver {
    board: Arc<dyn Board>,
    function: String,
    parameters: RwLock<String>,
    expected: i64,
    poller: Poller,
}

impl FunctionDriver {
    /// Drive `function` on `board`. The driver is named after the function.
    pub fn new(board: Arc<dyn Board>, function: impl Into<String>) -> Self {
        let function = function.into();
        Self {
            board,
            poller: Poller::new(function.clone()),
            function,
            parameters: RwLock::new(String::new()),
            expected: 0,
        }
    }

    /// Set the polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.poller.interval = interval;
        self
    }

    /// Set the return code a successful call answers with.
    pub fn with_expected_return(mut self, code: i64) -> Self {
        self.expected = code;
        self
    }

    /// Function name.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Parameter string passed on every call.
    pub fn parameters(&self) -> String {
        self.parameters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the parameter string.
    pub fn set_parameters(&self, parameters: impl Into<String>) {
        *self
            .parameters
            .write()
            .unwrap_or_else(PoisonError::into_inner) = parameters.into();
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.poller.events.subscribe()
    }

    /// True while the polling task runs.
    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    /// Call the function once and check its return code.
    ///
    /// Failures are returned and also published as [`DriverEvent::Error`].
    pub async fn call(&self, ctx: &Context) -> Result<i64> {
        let parameters = self.parameters();
        let result = self
            .board
            .call_function(ctx, &self.function, &parameters)
            .await
            .and_then(|code| {
                if code == self.expected {
                    Ok(code)
                } else {
                    Err(BoardError::ReturnCodeMismatch {
                        function: self.function.clone(),
                        expected: self.expected,
                        actual: code,
                    })
                }
            });

        if let Err(e) = &result {
            self.poller.publish(DriverEvent::Error(e.clone()));
        }
        result
    }
}

impl Driver for FunctionDriver {
    fn name(&self) -> String {
        self.poller.name()
    }

    fn set_name(&self, name: &str) {
        self.poller.set_name(name);
    }

    /// Polls with the parameters set at the time of the call.
    fn start(&self) {
        let board = self.board.clone();
        let function = self.function.clone();
        let parameters = self.parameters();
        self.poller.start(
            move || {
                let board = board.clone();
                let function = function.clone();
                let parameters = parameters.clone();
                async move {
                    board
                        .call_function(&Context::background(), &function, &parameters)
                        .await
                        .map(Value::from)
                }
            },
            DriverEvent::NewValue,
        );
    }

    fn halt(&self) {
        self.poller.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names() {
        assert_eq!(DriverEvent::NewValue(Value::Null).name(), "new-value");
        assert_eq!(DriverEvent::NewValues(Map::new()).name(), "new-values");
        assert_eq!(
            DriverEvent::Error(BoardError::NotConnected).name(),
            "error"
        );
    }

    #[test]
    fn default_interval_is_ten_seconds() {
        assert_eq!(DEFAULT_INTERVAL, Duration::from_secs(10));
    }
}
