use serde::Serialize;

use super::report::DefectRecord;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Everything a scan reports back to whoever drives it.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    Progress {
        percent: u8,
    },
    Batch {
        records: Vec<DefectRecord>,
    },
    Finished {
        total_defects: usize,
        files_scanned: usize,
        cancelled: bool,
    },
}

impl ScanEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        ScanEvent::Log {
            level,
            message: message.into(),
        }
    }
}
