//! Public analyzer API: lifecycle, status, stats and callbacks.
//!
//! Wraps the pipeline service with a status machine the control socket
//! can drive. Models and transport come from injected providers so tests
//! run against stubs and loopback buses.

use std::sync::{Arc, Mutex};

use fsift_media::ModelRegistry;
use fsift_models::{AnalyzerConfig, AnalyzerStats, ServiceStatus};
use fsift_proto::tcp::{TcpMessageListener, TcpMessageReceiver};
use fsift_proto::{MessageSink, MessageSource};
use tracing::{error, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::service::AnalyzerService;

/// Builds the frame source and metadata sink for a service run.
pub type TransportFactory = Box<
    dyn Fn(&AnalyzerConfig) -> PipelineResult<(Box<dyn MessageSource>, Box<dyn MessageSink>)>
        + Send
        + Sync,
>;

/// Loads the model registry for the current config.
pub type RegistryProvider =
    Box<dyn Fn(&AnalyzerConfig) -> PipelineResult<Arc<ModelRegistry>> + Send + Sync>;

/// Fired on every status transition.
pub type StatusCallback = Box<dyn Fn(ServiceStatus) + Send + Sync>;

struct ApiState {
    config: AnalyzerConfig,
    registry: Option<Arc<ModelRegistry>>,
    service: Option<Arc<AnalyzerService>>,
    status: ServiceStatus,
    last_error: Option<String>,
}

/// The analyzer process facade.
pub struct AnalyzerApi {
    state: Mutex<ApiState>,
    registry_provider: RegistryProvider,
    transport_factory: TransportFactory,
    status_callback: Mutex<Option<StatusCallback>>,
}

impl AnalyzerApi {
    pub fn new(
        config: AnalyzerConfig,
        registry_provider: RegistryProvider,
        transport_factory: TransportFactory,
    ) -> Self {
        Self {
            state: Mutex::new(ApiState {
                config,
                registry: None,
                service: None,
                status: ServiceStatus::Idle,
                last_error: None,
            }),
            registry_provider,
            transport_factory,
            status_callback: Mutex::new(None),
        }
    }

    /// Production wiring: ONNX Runtime models, TCP bus.
    ///
    /// The metadata sink binds `publisher_endpoint` and waits for one
    /// subscriber; the frame source connects to `subscriber_endpoint`.
    pub fn with_defaults(config: AnalyzerConfig) -> Self {
        Self::new(
            config,
            Box::new(|config| {
                ModelRegistry::from_models_config(&config.models, config.enable_text_recognition)
                    .map(Arc::new)
                    .map_err(PipelineError::from)
            }),
            Box::new(|config| {
                let source = TcpMessageReceiver::connect(&config.transport.subscriber_endpoint)?;
                let listener = TcpMessageListener::bind(&config.transport.publisher_endpoint)?;
                let sink = listener.accept_sender()?;
                Ok((Box::new(source), Box::new(sink)))
            }),
        )
    }

    /// Validate the config and load models. Errors transition to `Error`.
    pub fn initialize(&self) -> PipelineResult<()> {
        self.transition(ServiceStatus::Initializing);

        let config = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.config.clone()
        };

        let report = config.validate();
        for warning in &report.warnings {
            warn!(%warning, "Configuration warning");
        }
        if !report.is_ok() {
            let message = report.errors.join("; ");
            self.fail(&message);
            return Err(PipelineError::InvalidConfig(message));
        }

        match (self.registry_provider)(&config) {
            Ok(registry) => {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.registry = Some(registry);
                drop(state);
                self.transition(ServiceStatus::Idle);
                info!("Analyzer initialized");
                Ok(())
            }
            Err(error) => {
                self.fail(&error.to_string());
                Err(error)
            }
        }
    }

    /// Build a fresh service over new transport and start it.
    pub fn start(&self) -> PipelineResult<()> {
        let (config, registry) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state
                .service
                .as_ref()
                .is_some_and(|service| service.is_running())
            {
                return Err(PipelineError::AlreadyRunning);
            }
            let registry = state.registry.clone().ok_or(PipelineError::NotInitialized)?;
            (state.config.clone(), registry)
        };

        let (source, sink) = (self.transport_factory)(&config).map_err(|error| {
            self.fail(&error.to_string());
            error
        })?;

        let service = Arc::new(AnalyzerService::new(config, registry, source, sink));
        service.start()?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.service = Some(service);
        drop(state);
        self.transition(ServiceStatus::Running);
        Ok(())
    }

    /// Stop the running service. Stats stay readable afterwards.
    pub fn stop(&self) -> PipelineResult<()> {
        let service = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match &state.service {
                Some(service) if service.is_running() => Arc::clone(service),
                _ => return Err(PipelineError::NotRunning),
            }
        };

        self.transition(ServiceStatus::Stopping);
        service.stop();
        self.transition(ServiceStatus::Idle);
        Ok(())
    }

    /// Stop if needed and release models and service state.
    pub fn shutdown(&self) {
        let _ = self.stop();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.service = None;
        state.registry = None;
        state.status = ServiceStatus::Idle;
        info!("Analyzer shut down");
    }

    /// Replace the configuration. Rejected while running; models reload
    /// on the next start.
    pub fn set_config(&self, config: AnalyzerConfig) -> PipelineResult<()> {
        let report = config.validate();
        if !report.is_ok() {
            return Err(PipelineError::InvalidConfig(report.errors.join("; ")));
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state
            .service
            .as_ref()
            .is_some_and(|service| service.is_running())
        {
            return Err(PipelineError::AlreadyRunning);
        }
        state.config = config;
        state.registry = None;
        state.service = None;
        drop(state);

        self.initialize()
    }

    pub fn status(&self) -> ServiceStatus {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.status == ServiceStatus::Running {
            if let Some(service) = &state.service {
                if service.has_failed() {
                    return ServiceStatus::Error;
                }
            }
        }
        state.status
    }

    pub fn stats(&self) -> AnalyzerStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .service
            .as_ref()
            .map(|service| service.stats())
            .unwrap_or_default()
    }

    /// The most recent fatal message, if any.
    pub fn last_error(&self) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .service
            .as_ref()
            .and_then(|service| service.last_error())
            .or_else(|| state.last_error.clone())
    }

    pub fn set_status_callback(&self, callback: StatusCallback) {
        *self
            .status_callback
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    fn transition(&self, status: ServiceStatus) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.status = status;
        }
        // The callback fires outside the state lock.
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
        error!(%message, "Analyzer entering error state");
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.last_error = Some(message.to_string());
        }
        self.transition(ServiceStatus::Error);
    }
}
