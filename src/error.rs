use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Longest raw fragment quoted back in a [`RecordError`].
pub const FRAGMENT_LIMIT: usize = 240;

/// A failure that makes one log unusable. Other logs in a batch are unaffected.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{origin}: not a JSON document: {source}")]
    Syntax {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{origin}: {reason}")]
    MalformedDocument { origin: String, reason: String },
    #[error("{origin}: {}", describe_records(.records))]
    MalformedRecords {
        origin: String,
        records: Vec<RecordError>,
    },
    #[error("failed to encode log: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LogError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }
}

/// One run that could not be read, located by group and position.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordError {
    pub group: String,
    pub index: usize,
    pub reason: String,
    /// Raw JSON of the offending run, truncated to [`FRAGMENT_LIMIT`] bytes.
    pub fragment: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries[{:?}][{}]: {} in `{}`",
            self.group, self.index, self.reason, self.fragment
        )
    }
}

/// Non-fatal findings. The log is still returned intact.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    SchemaDrift {
        group: String,
        index: usize,
        added: Vec<String>,
        removed: Vec<String>,
    },
    OrderingViolation {
        group: String,
        index: usize,
        date: u64,
        previous_max: u64,
    },
    StaleLastUpdate {
        recorded: u64,
        newest: u64,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SchemaDrift {
                group,
                index,
                added,
                removed,
            } => write!(
                f,
                "{group}[{index}]: bench set changed (added {added:?}, removed {removed:?})"
            ),
            Warning::OrderingViolation {
                group,
                index,
                date,
                previous_max,
            } => write!(
                f,
                "{group}[{index}]: date {date} precedes earlier run dated {previous_max}"
            ),
            Warning::StaleLastUpdate { recorded, newest } => write!(
                f,
                "lastUpdate {recorded} is older than the newest run ({newest})"
            ),
        }
    }
}

fn describe_records(records: &[RecordError]) -> String {
    match records.first() {
        Some(first) => format!("{} malformed run record(s), first {first}", records.len()),
        None => "malformed run records".to_string(),
    }
}

/// Cut `raw` to at most `FRAGMENT_LIMIT` bytes on a char boundary.
pub(crate) fn truncate_fragment(raw: &str) -> String {
    if raw.len() <= FRAGMENT_LIMIT {
        return raw.to_string();
    }
    let mut end = FRAGMENT_LIMIT;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}
