//! Messages from background threads to the session owner.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::analysis::AnalysisOutcome;
use crate::ingest::RasterHandle;
use crate::loader::Slot;

pub enum SessionMessage {
    /// A slot finished loading.
    SlotLoaded {
        slot: Slot,
        generation: u64,
        raster: Arc<RasterHandle>,
    },
    /// A slot load failed.
    SlotFailed {
        slot: Slot,
        generation: u64,
        message: String,
    },
    /// A background change analysis completed.
    AnalysisComplete {
        outcome: Box<AnalysisOutcome>,
        elapsed: Duration,
    },
    AnalysisFailed {
        detector: String,
        message: String,
    },
    Log(LogEntry),
}

/// Log level for session log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// A user-facing log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: SystemTime,
}

impl LogEntry {
    fn at(level: LogLevel, msg: impl Into<String>) -> Self {
        Self {
            level,
            message: msg.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::at(LogLevel::Info, msg)
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self::at(LogLevel::Warning, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::at(LogLevel::Error, msg)
    }

    pub fn success(msg: impl Into<String>) -> Self {
        Self::at(LogLevel::Success, msg)
    }
}
