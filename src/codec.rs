//! aREST wire codec: request paths and response decoding.
//!
//! Both transports speak the same path language; the serial transport only
//! appends a line terminator. Responses are JSON objects and every operation
//! looks for exactly one key:
//!
//! ```text
//! GET  /digital/{pin}             -> {"return_value": 1}
//! POST /mode/{pin}/{i|I|o}        -> (ignored)
//! POST /digital/{pin}/{0|1}       -> (ignored)
//! GET  /{variable}                -> {"{variable}": ...}
//! GET  /                          -> {"variables": {...}}
//! POST /{function}?params={value} -> {"return_value": 0}
//! ```
//!
//! A missing key is a "not found" protocol error. A key that is present with
//! the wrong shape is a decode error, never a silent default.

use serde_json::{Map, Value};

use crate::error::{BoardError, Result};
use crate::pin::{Level, PinMode, PinNumber};

/// Line terminator appended to every serial command.
pub const SERIAL_TERMINATOR: &str = "\n\r";

/// Pin read by the connection liveness probe.
pub const PROBE_PIN: PinNumber = 0;

/// Key holding digital-read and function-call results.
pub const RETURN_VALUE_KEY: &str = "return_value";

/// Key holding the bulk variable map.
pub const VARIABLES_KEY: &str = "variables";

/// HTTP verb used for a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    /// Reads.
    Get,
    /// Writes, mode changes, and function calls.
    Post,
}

/// One aREST request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Read a digital pin.
    DigitalRead {
        /// Pin number.
        pin: PinNumber,
    },
    /// Configure a pin's mode.
    SetPinMode {
        /// Pin number.
        pin: PinNumber,
        /// Requested mode; [`PinMode::Unset`] is rejected when encoding.
        mode: PinMode,
    },
    /// Drive a digital output.
    DigitalWrite {
        /// Pin number.
        pin: PinNumber,
        /// Level to write.
        level: Level,
    },
    /// Read one named variable.
    ReadValue {
        /// Variable name.
        name: String,
    },
    /// Read every exposed variable.
    ReadValues,
    /// Call a named function with a string parameter.
    CallFunction {
        /// Function name.
        name: String,
        /// Raw (unencoded) parameter.
        param: String,
    },
}

impl Command {
    /// HTTP verb for this command.
    pub fn method(&self) -> HttpMethod {
        match self {
            Command::DigitalRead { .. } | Command::ReadValue { .. } | Command::ReadValues => {
                HttpMethod::Get
            }
            Command::SetPinMode { .. }
            | Command::DigitalWrite { .. }
            | Command::CallFunction { .. } => HttpMethod::Post,
        }
    }

    /// Request path, without terminator.
    ///
    /// ```
    /// use rs_arest::codec::Command;
    /// use rs_arest::pin::PinMode;
    ///
    /// let cmd = Command::SetPinMode { pin: 13, mode: PinMode::Output };
    /// assert_eq!(cmd.path().unwrap(), "/mode/13/o");
    ///
    /// let cmd = Command::CallFunction { name: "led".into(), param: "on now".into() };
    /// assert_eq!(cmd.path().unwrap(), "/led?params=on%20now");
    /// ```
    pub fn path(&self) -> Result<String> {
        Ok(match self {
            Command::DigitalRead { pin } => format!("/digital/{}", pin),
            Command::SetPinMode { pin, mode } => format!("/mode/{}/{}", pin, mode.wire_char()?),
            Command::DigitalWrite { pin, level } => format!("/digital/{}/{}", pin, level.as_u8()),
            Command::ReadValue { name } => format!("/{}", encode_param(name)),
            Command::ReadValues => "/".to_string(),
            Command::CallFunction { name, param } => {
                format!("/{}?params={}", encode_param(name), encode_param(param))
            }
        })
    }

    /// Path with the serial line terminator appended.
    pub fn serial_frame(&self) -> Result<String> {
        let mut frame = self.path()?;
        frame.push_str(SERIAL_TERMINATOR);
        Ok(frame)
    }
}

/// Percent-encode a path segment or query parameter value.
///
/// Unreserved characters (`A-Z a-z 0-9 - . _ ~`) pass through; every other
/// byte of the UTF-8 encoding becomes `%XX`.
pub fn encode_param(param: &str) -> String {
    let mut out = String::with_capacity(param.len());
    for b in param.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

// ============================================================================
// Response decoding
// ============================================================================

/// Parse a response body into a JSON object.
///
/// Surrounding whitespace (including the serial line terminator) is ignored.
pub fn parse_object(body: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(body.trim())? {
        Value::Object(map) => Ok(map),
        other => Err(BoardError::Decode(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

/// Decode a digital-read response into its integer level.
pub fn decode_digital_read(body: &str) -> Result<i64> {
    let data = parse_object(body)?;
    match data.get(RETURN_VALUE_KEY) {
        Some(v) => as_integer(RETURN_VALUE_KEY, v),
        None => Err(BoardError::ReturnValueNotFound),
    }
}

/// Decode a single-variable response.
pub fn decode_value(body: &str, name: &str) -> Result<Value> {
    let mut data = parse_object(body)?;
    data.remove(name)
        .ok_or_else(|| BoardError::VariableNotFound(name.to_string()))
}

/// Decode a bulk-variable response.
pub fn decode_values(body: &str) -> Result<Map<String, Value>> {
    let mut data = parse_object(body)?;
    match data.remove(VARIABLES_KEY) {
        Some(Value::Object(vars)) => Ok(vars),
        Some(other) => Err(BoardError::Decode(format!(
            "{} should be an object, got {}",
            VARIABLES_KEY,
            type_name(&other)
        ))),
        None => Err(BoardError::VariablesNotFound),
    }
}

/// Decode a function-call response into its return code.
pub fn decode_function(body: &str, name: &str) -> Result<i64> {
    let data = parse_object(body)?;
    match data.get(RETURN_VALUE_KEY) {
        Some(v) => as_integer(RETURN_VALUE_KEY, v),
        None => Err(BoardError::FunctionNotFound(name.to_string())),
    }
}

/// aREST sends integers as JSON numbers that may carry a fraction.
fn as_integer(key: &str, value: &Value) -> Result<i64> {
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    value
        .as_f64()
        .map(|f| f as i64)
        .ok_or_else(|| {
            BoardError::Decode(format!("{} should be a number, got {}", key, type_name(value)))
        })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =========================================================================
    // Path Tests
    // =========================================================================

    #[test]
    fn path_digital_read() {
        let cmd = Command::DigitalRead { pin: 4 };
        assert_eq!(cmd.path().unwrap(), "/digital/4");
        assert_eq!(cmd.method(), HttpMethod::Get);
    }

    #[test]
    fn path_set_pin_mode_letters() {
        let path = |mode| Command::SetPinMode { pin: 41, mode }.path().unwrap();
        assert_eq!(path(PinMode::Input), "/mode/41/i");
        assert_eq!(path(PinMode::InputPullup), "/mode/41/I");
        assert_eq!(path(PinMode::Output), "/mode/41/o");
    }

    #[test]
    fn path_set_pin_mode_unset_is_invalid() {
        let cmd = Command::SetPinMode {
            pin: 1,
            mode: PinMode::Unset,
        };
        assert!(matches!(cmd.path(), Err(BoardError::InvalidMode(_))));
    }

    #[test]
    fn path_digital_write() {
        let cmd = Command::DigitalWrite {
            pin: 3,
            level: Level::High,
        };
        assert_eq!(cmd.path().unwrap(), "/digital/3/1");
        assert_eq!(cmd.method(), HttpMethod::Post);
    }

    #[test]
    fn path_values() {
        assert_eq!(Command::ReadValues.path().unwrap(), "/");
        let cmd = Command::ReadValue {
            name: "isRebooted".into(),
        };
        assert_eq!(cmd.path().unwrap(), "/isRebooted");
    }

    #[test]
    fn path_names_are_encoded() {
        let cmd = Command::ReadValue {
            name: "room temp/2?".into(),
        };
        assert_eq!(cmd.path().unwrap(), "/room%20temp%2F2%3F");

        let cmd = Command::CallFunction {
            name: "set level".into(),
            param: "1".into(),
        };
        assert_eq!(cmd.path().unwrap(), "/set%20level?params=1");
    }

    #[test]
    fn serial_frame_appends_terminator() {
        let cmd = Command::DigitalRead { pin: 0 };
        assert_eq!(cmd.serial_frame().unwrap(), "/digital/0\n\r");
    }

    #[test]
    fn encode_param_reserved_characters() {
        assert_eq!(encode_param("abc-1.2_~"), "abc-1.2_~");
        assert_eq!(encode_param("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_param("é"), "%C3%A9");
        assert_eq!(encode_param(""), "");
    }

    // =========================================================================
    // Decoding Tests
    // =========================================================================

    #[test]
    fn decode_digital_read_level() {
        assert_eq!(decode_digital_read(r#"{"return_value": 1}"#).unwrap(), 1);
        assert_eq!(decode_digital_read("{\"return_value\": 0.0}\r\n").unwrap(), 0);
    }

    #[test]
    fn decode_digital_read_missing_key() {
        assert!(matches!(
            decode_digital_read(r#"{"id": "1"}"#),
            Err(BoardError::ReturnValueNotFound)
        ));
    }

    #[test]
    fn decode_digital_read_wrong_shape() {
        assert!(matches!(
            decode_digital_read(r#"{"return_value": "high"}"#),
            Err(BoardError::Decode(_))
        ));
    }

    #[test]
    fn decode_value_present() {
        let v = decode_value(r#"{"temperature": 21.5, "id": "1"}"#, "temperature").unwrap();
        assert_eq!(v, json!(21.5));
    }

    #[test]
    fn decode_value_missing() {
        assert!(matches!(
            decode_value(r#"{"id": "1"}"#, "temperature"),
            Err(BoardError::VariableNotFound(n)) if n == "temperature"
        ));
    }

    #[test]
    fn decode_values_present() {
        let vars = decode_values(r#"{"variables": {"isRebooted": false}}"#).unwrap();
        assert_eq!(vars.get("isRebooted"), Some(&json!(false)));
    }

    #[test]
    fn decode_values_missing() {
        assert!(matches!(
            decode_values(r#"{"id": "1", "name": "board"}"#),
            Err(BoardError::VariablesNotFound)
        ));
    }

    #[test]
    fn decode_values_wrong_shape() {
        assert!(matches!(
            decode_values(r#"{"variables": [1, 2]}"#),
            Err(BoardError::Decode(_))
        ));
    }

    #[test]
    fn decode_function_return_code() {
        assert_eq!(decode_function(r#"{"return_value": 42}"#, "f").unwrap(), 42);
        assert_eq!(decode_function(r#"{"return_value": -1.0}"#, "f").unwrap(), -1);
    }

    #[test]
    fn decode_function_missing() {
        assert!(matches!(
            decode_function(r#"{"message": "ok"}"#, "reboot"),
            Err(BoardError::FunctionNotFound(n)) if n == "reboot"
        ));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        assert!(matches!(
            decode_values("{\"variables\": "),
            Err(BoardError::Decode(_))
        ));
        assert!(matches!(decode_digital_read(""), Err(BoardError::Decode(_))));
    }

    #[test]
    fn decode_rejects_non_object() {
        assert!(matches!(parse_object("[1]"), Err(BoardError::Decode(_))));
    }
}
