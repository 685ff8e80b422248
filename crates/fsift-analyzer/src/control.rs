//! Control-protocol handler for the analyzer process.

use std::sync::Arc;

use fsift_models::AnalyzerConfig;
use fsift_proto::{CommandHandler, CommandRequest, CommandResponse, CommandType, ResponseCode};
use serde_json::json;
use tokio::sync::watch;
use tracing::info;

use crate::api::AnalyzerApi;
use crate::error::PipelineError;

/// Maps control commands onto the analyzer API.
pub struct AnalyzerCommandHandler {
    api: Arc<AnalyzerApi>,
    shutdown: watch::Sender<bool>,
}

impl AnalyzerCommandHandler {
    pub fn new(api: Arc<AnalyzerApi>, shutdown: watch::Sender<bool>) -> Self {
        Self { api, shutdown }
    }

    fn respond(result: Result<(), PipelineError>) -> CommandResponse {
        match result {
            Ok(()) => CommandResponse::ok(),
            Err(error) => CommandResponse::error(response_code(&error), error.to_string()),
        }
    }
}

fn response_code(error: &PipelineError) -> ResponseCode {
    match error {
        PipelineError::NotInitialized => ResponseCode::NotInitialized,
        PipelineError::AlreadyRunning => ResponseCode::AlreadyRunning,
        PipelineError::NotRunning => ResponseCode::NotRunning,
        PipelineError::InvalidConfig(_) => ResponseCode::InvalidParameters,
        _ => ResponseCode::Internal,
    }
}

impl CommandHandler for AnalyzerCommandHandler {
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
            CommandType::Start => Self::respond(self.api.start()),
            CommandType::Stop => Self::respond(self.api.stop()),
            CommandType::ConfigSet => {
                match serde_json::from_value::<AnalyzerConfig>(request.parameters) {
                    Ok(config) => Self::respond(self.api.set_config(config)),
                    Err(error) => CommandResponse::error(
                        ResponseCode::InvalidParameters,
                        format!("invalid config payload: {error}"),
                    ),
                }
            }
            CommandType::Shutdown => {
                info!("Shutdown requested over control socket");
                self.api.shutdown();
                let _ = self.shutdown.send(true);
                CommandResponse::ok()
            }
            _ => CommandResponse::error(
                ResponseCode::InvalidCommand,
                "command not supported by the analyzer",
            ),
        }
    }
}
