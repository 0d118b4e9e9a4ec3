// crates/core/src/status.rs
//! Status codes broadcast on a job's notification channel.

use serde::Serialize;

use crate::engine::EngineState;

/// Lifecycle phase reported to whoever tracks a job.
///
/// `Unspecified` doubles as the cancellation and failure sentinel; callers
/// tell the two apart through the job's error accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum JobStatus {
    Unspecified = 0,
    Pending = 1,
    Running = 2,
    ReadingResults = 3,
    Done = 4,
}

impl JobStatus {
    /// Integer code as exposed to clients.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// No status may follow a terminal one.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unspecified | Self::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ReadingResults => "reading_results",
            Self::Done => "done",
        }
    }
}

impl From<EngineState> for JobStatus {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::Pending => Self::Pending,
            EngineState::Running => Self::Running,
            EngineState::Done => Self::ReadingResults,
        }
    }
}

impl TryFrom<i32> for JobStatus {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Unspecified),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Running),
            3 => Ok(Self::ReadingResults),
            4 => Ok(Self::Done),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_discriminants() {
        assert_eq!(JobStatus::Unspecified.code(), 0);
        assert_eq!(JobStatus::Pending.code(), 1);
        assert_eq!(JobStatus::Running.code(), 2);
        assert_eq!(JobStatus::ReadingResults.code(), 3);
        assert_eq!(JobStatus::Done.code(), 4);
    }

    #[test]
    fn test_terminal_codes() {
        assert!(JobStatus::Unspecified.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::ReadingResults.is_terminal());
    }

    #[test]
    fn test_engine_state_mapping() {
        assert_eq!(JobStatus::from(EngineState::Done), JobStatus::ReadingResults);
        assert_eq!(JobStatus::from(EngineState::Running), JobStatus::Running);
    }

    #[test]
    fn test_try_from_rejects_unknown_code() {
        assert_eq!(JobStatus::try_from(4), Ok(JobStatus::Done));
        assert_eq!(JobStatus::try_from(9), Err(9));
    }

    #[test]
    fn test_job_status_serialize() {
        let json = serde_json::to_string(&JobStatus::ReadingResults).unwrap();
        assert_eq!(json, "\"READING_RESULTS\"");
    }
}
