//! Control-protocol envelope.
//!
//! Both processes answer the same JSON request/reply shape over their
//! control socket: `{"command": <name>, "parameters": {...}}` in,
//! `{"code": <int>, "message": <str>, "data": {...}}` out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands understood across the two processes. Unrecognized names parse
/// as `Unknown` and are answered with `ResponseCode::InvalidCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    // Shared
    Ping,
    GetStatus,
    GetStats,
    Shutdown,
    // Analyzer
    Start,
    Stop,
    ConfigSet,
    // Recorder
    StartRecording,
    StopRecording,
    PauseRecording,
    ResumeRecording,
    #[serde(other)]
    Unknown,
}

/// Reply codes carried in the `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ResponseCode {
    Success,
    InvalidCommand,
    InvalidParameters,
    NotInitialized,
    AlreadyRunning,
    NotRunning,
    Internal,
}

impl From<ResponseCode> for i32 {
    fn from(code: ResponseCode) -> i32 {
        match code {
            ResponseCode::Success => 0,
            ResponseCode::InvalidCommand => 1,
            ResponseCode::InvalidParameters => 2,
            ResponseCode::NotInitialized => 3,
            ResponseCode::AlreadyRunning => 4,
            ResponseCode::NotRunning => 5,
            ResponseCode::Internal => 6,
        }
    }
}

impl From<i32> for ResponseCode {
    fn from(code: i32) -> ResponseCode {
        match code {
            0 => ResponseCode::Success,
            1 => ResponseCode::InvalidCommand,
            2 => ResponseCode::InvalidParameters,
            3 => ResponseCode::NotInitialized,
            4 => ResponseCode::AlreadyRunning,
            5 => ResponseCode::NotRunning,
            _ => ResponseCode::Internal,
        }
    }
}

/// A parsed control request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: CommandType,
    #[serde(default)]
    pub parameters: Value,
}

impl CommandRequest {
    pub fn new(command: CommandType) -> Self {
        Self {
            command,
            parameters: Value::Null,
        }
    }

    pub fn with_parameters(command: CommandType, parameters: Value) -> Self {
        Self {
            command,
            parameters,
        }
    }
}

/// A control reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub code: ResponseCode,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl CommandResponse {
    /// Successful reply with a data payload.
    pub fn success(data: Value) -> Self {
        Self {
            code: ResponseCode::Success,
            message: "OK".to_string(),
            data,
        }
    }

    /// Successful reply with no payload.
    pub fn ok() -> Self {
        Self::success(Value::Null)
    }

    /// Error reply.
    pub fn error(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }
}

/// Implemented by each process to answer control requests.
///
/// Handlers run on a blocking thread; they may join pipeline threads.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, request: CommandRequest) -> CommandResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let json = r#"{"command": "GET_STATUS", "parameters": {}}"#;
        let request: CommandRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.command, CommandType::GetStatus);

        let out = serde_json::to_string(&request).unwrap();
        assert!(out.contains("GET_STATUS"));
    }

    #[test]
    fn test_unknown_command_parses() {
        let json = r#"{"command": "FROBNICATE"}"#;
        let request: CommandRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.command, CommandType::Unknown);
    }

    #[test]
    fn test_response_codes_serialize_as_ints() {
        let response = CommandResponse::error(ResponseCode::NotRunning, "not running");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"code\":5"));

        let back: CommandResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, ResponseCode::NotRunning);
    }

    #[test]
    fn test_unknown_code_maps_to_internal() {
        let response: CommandResponse =
            serde_json::from_str(r#"{"code": 99, "message": "?", "data": null}"#).unwrap();
        assert_eq!(response.code, ResponseCode::Internal);
    }

    #[test]
    fn test_missing_parameters_default_to_null() {
        let request: CommandRequest = serde_json::from_str(r#"{"command": "PING"}"#).unwrap();
        assert!(request.parameters.is_null());
    }
}
