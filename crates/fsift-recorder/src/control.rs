//! Control-protocol handler for the recorder process.

use std::sync::Arc;

use fsift_proto::{CommandHandler, CommandRequest, CommandResponse, CommandType, ResponseCode};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::api::RecorderApi;
use crate::error::RecorderError;

/// Maps control commands onto the recorder API.
pub struct RecorderCommandHandler {
    api: Arc<RecorderApi>,
    shutdown: watch::Sender<bool>,
}

impl RecorderCommandHandler {
    pub fn new(api: Arc<RecorderApi>, shutdown: watch::Sender<bool>) -> Self {
        Self { api, shutdown }
    }

    fn respond(result: Result<(), RecorderError>) -> CommandResponse {
        match result {
            Ok(()) => CommandResponse::ok(),
            Err(error) => CommandResponse::error(response_code(&error), error.to_string()),
        }
    }
}

fn response_code(error: &RecorderError) -> ResponseCode {
    match error {
        RecorderError::NotInitialized => ResponseCode::NotInitialized,
        RecorderError::AlreadyRunning => ResponseCode::AlreadyRunning,
        RecorderError::NotRunning => ResponseCode::NotRunning,
        RecorderError::InvalidConfig(_) => ResponseCode::InvalidParameters,
        _ => ResponseCode::Internal,
    }
}

impl CommandHandler for RecorderCommandHandler {
    fn handle(&self, request: CommandRequest) -> CommandResponse {
        match request.command {
            CommandType::Ping => CommandResponse::success(json!({"pong": true})),
            CommandType::GetStatus => {
                CommandResponse::success(json!({"status": self.api.status().as_i32()}))
            }
            CommandType::GetStats => match serde_json::to_value(self.api.stats()) {
                Ok(stats) => CommandResponse::success(stats),
                Err(error) => CommandResponse::error(ResponseCode::Internal, error.to_string()),
            },
            CommandType::StartRecording => Self::respond(self.api.start_recording()),
            CommandType::StopRecording => Self::respond(self.api.stop_recording()),
            CommandType::PauseRecording => Self::respond(self.api.pause_recording()),
            CommandType::ResumeRecording => Self::respond(self.api.resume_recording()),
            CommandType::Shutdown => {
                info!("Shutdown requested over control socket");
                self.api.shutdown();
                let _ = self.shutdown.send(true);
                CommandResponse::ok()
            }
            _ => CommandResponse::error(
                ResponseCode::InvalidCommand,
                "command not supported by the recorder",
            ),
        }
    }
}
