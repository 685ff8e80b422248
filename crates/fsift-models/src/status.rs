//! Service status and stats reported over the control protocol.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a recorder or analyzer service.
///
/// The integer values are part of the control protocol (`GET_STATUS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Idle,
    Initializing,
    Running,
    Stopping,
    Error,
}

impl ServiceStatus {
    /// Wire value used by `GET_STATUS`.
    pub fn as_i32(self) -> i32 {
        match self {
            ServiceStatus::Idle => 0,
            ServiceStatus::Initializing => 1,
            ServiceStatus::Running => 2,
            ServiceStatus::Stopping => 3,
            ServiceStatus::Error => 4,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceStatus::Idle => "IDLE",
            ServiceStatus::Initializing => "INITIALIZING",
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::Stopping => "STOPPING",
            ServiceStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Summary of a recently selected keyframe, kept for `GET_STATS`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyframeSummary {
    pub frame_index: u32,
    pub score: f32,
    pub timestamp: f64,
}

/// Analyzer stats returned by `GET_STATS`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerStats {
    pub analyzed_frame_count: i64,
    pub keyframe_count: i64,
    /// Most recent keyframes, newest last, capped at 20.
    pub latest_keyframes: Vec<KeyframeSummary>,
}

/// Recorder stats returned by `GET_STATS`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RecorderStats {
    pub captured_frames: i64,
    pub dropped_frames: i64,
    /// Rolling FPS over the most recent capture instants.
    pub current_fps: f64,
}

/// Ring frame buffer counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RingBufferStats {
    pub total_written_frames: u64,
    pub total_read_frames: u64,
    pub total_overwritten_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_values() {
        assert_eq!(ServiceStatus::Idle.as_i32(), 0);
        assert_eq!(ServiceStatus::Initializing.as_i32(), 1);
        assert_eq!(ServiceStatus::Running.as_i32(), 2);
        assert_eq!(ServiceStatus::Stopping.as_i32(), 3);
        assert_eq!(ServiceStatus::Error.as_i32(), 4);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ServiceStatus::Running.to_string(), "RUNNING");
    }
}
