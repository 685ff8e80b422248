//! Public recorder API: lifecycle, status, stats and callbacks.

use std::sync::{Arc, Mutex};

use fsift_models::{RecorderConfig, RecorderStats, ServiceStatus};
use fsift_proto::tcp::TcpMessageListener;
use fsift_proto::MessageSink;
use tracing::{error, info, warn};

use crate::encoder::{NullEncoder, VideoEncoderSink};
use crate::error::{RecorderError, RecorderResult};
use crate::grabber::{FrameGrabber, SyntheticGrabber};
use crate::service::RecorderService;

/// Everything a recording session consumes.
pub struct RecorderParts {
    pub grabber: Box<dyn FrameGrabber>,
    pub encoder: Box<dyn VideoEncoderSink>,
    pub frame_sink: Box<dyn MessageSink>,
}

/// Builds capture/encode/publish parts for each recording session.
pub type PartsFactory =
    Box<dyn Fn(&RecorderConfig) -> RecorderResult<RecorderParts> + Send + Sync>;

/// Fired on every status transition.
pub type StatusCallback = Box<dyn Fn(ServiceStatus) + Send + Sync>;

struct ApiState {
    config: RecorderConfig,
    service: Option<Arc<RecorderService>>,
    status: ServiceStatus,
    last_error: Option<String>,
    initialized: bool,
}

/// The recorder process facade.
pub struct RecorderApi {
    state: Mutex<ApiState>,
    parts_factory: PartsFactory,
    status_callback: Mutex<Option<StatusCallback>>,
}

impl RecorderApi {
    pub fn new(config: RecorderConfig, parts_factory: PartsFactory) -> Self {
        Self {
            state: Mutex::new(ApiState {
                config,
                service: None,
                status: ServiceStatus::Idle,
                last_error: None,
                initialized: false,
            }),
            parts_factory,
            status_callback: Mutex::new(None),
        }
    }

    /// Production wiring: synthetic grabber (capture is external), null
    /// encoder, TCP frame bus bound on `publisher_endpoint`.
    pub fn with_defaults(config: RecorderConfig) -> Self {
        Self::new(
            config,
            Box::new(|config| {
                let listener = TcpMessageListener::bind(&config.transport.publisher_endpoint)?;
                info!("Waiting for a frame subscriber...");
                let sink = listener.accept_sender()?;
                Ok(RecorderParts {
                    grabber: Box::new(SyntheticGrabber::new(
                        config.capture_width,
                        config.capture_height,
                    )),
                    encoder: Box::new(NullEncoder::new()),
                    frame_sink: Box::new(sink),
                })
            }),
        )
    }

    /// Validate the configuration. Errors transition to `Error`.
    pub fn initialize(&self) -> RecorderResult<()> {
        self.transition(ServiceStatus::Initializing);

        let report = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.config.validate()
        };
        for warning in &report.warnings {
            warn!(%warning, "Configuration warning");
        }
        if !report.is_ok() {
            let message = report.errors.join("; ");
            self.fail(&message);
            return Err(RecorderError::InvalidConfig(message));
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.initialized = true;
        drop(state);
        self.transition(ServiceStatus::Idle);
        info!("Recorder initialized");
        Ok(())
    }

    /// Start a recording session.
    pub fn start_recording(&self) -> RecorderResult<()> {
        let config = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.initialized {
                return Err(RecorderError::NotInitialized);
            }
            if state
                .service
                .as_ref()
                .is_some_and(|service| service.is_running())
            {
                return Err(RecorderError::AlreadyRunning);
            }
            state.config.clone()
        };

        let parts = (self.parts_factory)(&config).map_err(|error| {
            self.fail(&error.to_string());
            error
        })?;

        let service = Arc::new(RecorderService::new(
            config,
            parts.grabber,
            parts.encoder,
            parts.frame_sink,
        ));
        service.start()?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.service = Some(service);
        drop(state);
        self.transition(ServiceStatus::Running);
        Ok(())
    }

    /// Stop the running session. Stats stay readable afterwards.
    pub fn stop_recording(&self) -> RecorderResult<()> {
        let service = self.running_service()?;
        self.transition(ServiceStatus::Stopping);
        service.stop();
        self.transition(ServiceStatus::Idle);
        Ok(())
    }

    pub fn pause_recording(&self) -> RecorderResult<()> {
        self.running_service()?.pause();
        Ok(())
    }

    pub fn resume_recording(&self) -> RecorderResult<()> {
        self.running_service()?.resume();
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.stop_recording();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.service = None;
        state.status = ServiceStatus::Idle;
        info!("Recorder shut down");
    }

    pub fn status(&self) -> ServiceStatus {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).status
    }

    pub fn stats(&self) -> RecorderStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .service
            .as_ref()
            .map(|service| service.stats())
            .unwrap_or_default()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_error
            .clone()
    }

    pub fn set_status_callback(&self, callback: StatusCallback) {
        *self
            .status_callback
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    fn running_service(&self) -> RecorderResult<Arc<RecorderService>> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &state.service {
            Some(service) if service.is_running() => Ok(Arc::clone(service)),
            _ => Err(RecorderError::NotRunning),
        }
    }

    fn transition(&self, status: ServiceStatus) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.status = status;
        }
        if let Some(callback) = self
            .status_callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            callback(status);
        }
    }

    fn fail(&self, message: &str) {
        error!(%message, "Recorder entering error state");
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.last_error = Some(message.to_string());
        }
        self.transition(ServiceStatus::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsift_proto::loopback;

    fn stub_api(config: RecorderConfig) -> RecorderApi {
        RecorderApi::new(
            config,
            Box::new(|config| {
                let (frame_tx, _frame_rx) = loopback(64);
                Ok(RecorderParts {
                    grabber: Box::new(SyntheticGrabber::new(
                        config.capture_width,
                        config.capture_height,
                    )),
                    encoder: Box::new(NullEncoder::new()),
                    frame_sink: Box::new(frame_tx),
                })
            }),
        )
    }

    fn small_config() -> RecorderConfig {
        RecorderConfig {
            capture_width: 8,
            capture_height: 8,
            target_fps: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_lifecycle() {
        let api = stub_api(small_config());
        assert!(matches!(
            api.start_recording(),
            Err(RecorderError::NotInitialized)
        ));

        api.initialize().unwrap();
        api.start_recording().unwrap();
        assert_eq!(api.status(), ServiceStatus::Running);
        assert!(matches!(
            api.start_recording(),
            Err(RecorderError::AlreadyRunning)
        ));

        api.pause_recording().unwrap();
        api.resume_recording().unwrap();

        api.stop_recording().unwrap();
        assert_eq!(api.status(), ServiceStatus::Idle);
        assert!(matches!(
            api.stop_recording(),
            Err(RecorderError::NotRunning)
        ));
    }

    #[test]
    fn test_pause_requires_running() {
        let api = stub_api(small_config());
        api.initialize().unwrap();
        assert!(matches!(
            api.pause_recording(),
            Err(RecorderError::NotRunning)
        ));
    }

    #[test]
    fn test_invalid_config_errors() {
        let mut config = small_config();
        config.target_fps = 0;
        let api = stub_api(config);
        assert!(matches!(
            api.initialize(),
            Err(RecorderError::InvalidConfig(_))
        ));
        assert_eq!(api.status(), ServiceStatus::Error);
        assert!(api.last_error().unwrap().contains("target_fps"));
    }

    #[test]
    fn test_restart_supported() {
        let api = stub_api(small_config());
        api.initialize().unwrap();
        api.start_recording().unwrap();
        api.stop_recording().unwrap();
        api.start_recording().unwrap();
        api.stop_recording().unwrap();
    }
}
