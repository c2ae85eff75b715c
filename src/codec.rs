//! Reading and writing suite logs.
//!
//! The dashboard loads each log with a `<script>` tag, so files usually look
//! like:
//!
//! ```text
//! window.BENCHMARK_DATA = {
//!   "lastUpdate": 1741632393253,
//!   "repoUrl": "https://github.com/...",
//!   "entries": { "Benchmark": [ ... ] }
//! }
//! ```
//!
//! Plain JSON is accepted as well. Output uses two-space indentation and no
//! trailing newline. Each author and committer keeps the key order it was
//! read with and string-typed values stay strings, so re-saving a log leaves
//! the runs it already held textually unchanged. Runs built in memory use
//! the `email, name, username` order.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{truncate_fragment, LogError, RecordError, Warning};
use crate::schema::{BenchmarkSuiteLog, Measurement, Run};
use crate::Format;

/// Binding the dashboard page reads the log from.
pub const GLOBAL_BINDING: &str = "window.BENCHMARK_DATA";

/// Prefix written in front of the JSON in [`Format::Wrapped`] output.
pub const WRAPPER_PREFIX: &str = "window.BENCHMARK_DATA = ";

/// A successfully read log together with how it was stored.
#[derive(Debug, Clone)]
pub struct ParsedLog {
    pub log: BenchmarkSuiteLog,
    pub format: Format,
    pub warnings: Vec<Warning>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    last_update: u64,
    repo_url: String,
}

/// Split off the `window.BENCHMARK_DATA =` assignment, if there is one.
fn strip_wrapper(text: &str) -> (&str, Format) {
    let text = text.trim_start_matches('\u{feff}').trim();
    if let Some(rest) = text.strip_prefix(GLOBAL_BINDING) {
        if let Some(rest) = rest.trim_start().strip_prefix('=') {
            let body = rest.trim().trim_end_matches(';').trim_end();
            return (body, Format::Wrapped);
        }
    }
    (text, Format::Json)
}

/// Parse one log. `origin` names the source in errors (usually the file path).
pub fn parse_str(origin: &str, text: &str) -> Result<ParsedLog, LogError> {
    let (body, format) = strip_wrapper(text);
    let doc: Value = serde_json::from_str(body).map_err(|source| LogError::Syntax {
        origin: origin.to_string(),
        source,
    })?;

    let log = decode_document(origin, doc)?;
    let warnings = log.check();
    debug!(
        origin,
        groups = log.entries.len(),
        warnings = warnings.len(),
        "parsed suite log"
    );

    Ok(ParsedLog {
        log,
        format,
        warnings,
    })
}

fn malformed(origin: &str, reason: impl Into<String>) -> LogError {
    LogError::MalformedDocument {
        origin: origin.to_string(),
        reason: reason.into(),
    }
}

fn decode_document(origin: &str, doc: Value) -> Result<BenchmarkSuiteLog, LogError> {
    let Value::Object(mut top) = doc else {
        return Err(malformed(origin, "top-level value is not an object"));
    };

    let entries = match top.remove("entries") {
        Some(Value::Object(entries)) => entries,
        Some(_) => return Err(malformed(origin, "`entries` is not an object")),
        None => return Err(malformed(origin, "missing field `entries`")),
    };
    let header = Header::deserialize(Value::Object(top))
        .map_err(|e| malformed(origin, e.to_string()))?;

    let mut log = BenchmarkSuiteLog {
        last_update: header.last_update,
        repo_url: header.repo_url,
        entries: Default::default(),
    };
    let mut records = Vec::new();

    for (group, runs) in entries {
        let Value::Array(runs) = runs else {
            return Err(malformed(
                origin,
                format!("entries[{group:?}] is not an array"),
            ));
        };

        let mut decoded = Vec::with_capacity(runs.len());
        for (index, raw) in runs.iter().enumerate() {
            match Run::deserialize(raw) {
                Ok(run) => decoded.push(run),
                Err(e) => records.push(locate_record_error(&group, index, raw, e)),
            }
        }
        log.entries.insert(group, decoded);
    }

    if records.is_empty() {
        Ok(log)
    } else {
        Err(LogError::MalformedRecords {
            origin: origin.to_string(),
            records,
        })
    }
}

// Point at the offending measurement when the run failed because of one.
fn locate_record_error(group: &str, index: usize, raw: &Value, err: serde_json::Error) -> RecordError {
    if let Some(Value::Array(benches)) = raw.get("benches") {
        for (i, bench) in benches.iter().enumerate() {
            if let Err(bench_err) = Measurement::deserialize(bench) {
                return RecordError {
                    group: group.to_string(),
                    index,
                    reason: format!("benches[{i}]: {bench_err}"),
                    fragment: truncate_fragment(&bench.to_string()),
                };
            }
        }
    }

    RecordError {
        group: group.to_string(),
        index,
        reason: err.to_string(),
        fragment: truncate_fragment(&raw.to_string()),
    }
}

/// Render a log in the requested format.
pub fn to_string(log: &BenchmarkSuiteLog, format: Format) -> Result<String, LogError> {
    let json = serde_json::to_string_pretty(log)?;
    Ok(match format {
        Format::Json => json,
        Format::Wrapped => format!("{WRAPPER_PREFIX}{json}"),
    })
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<ParsedLog, LogError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| LogError::io(path, e))?;
    parse_str(&path.display().to_string(), &text)
}

/// Write a log so that readers only ever see the old or the new contents.
///
/// The text goes to a temporary file next to `path`, which is then renamed
/// over it.
pub fn write_file<P: AsRef<Path>>(
    path: P,
    log: &BenchmarkSuiteLog,
    format: Format,
) -> Result<(), LogError> {
    let path = path.as_ref();
    let text = to_string(log, format)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| LogError::io(dir, e))?;
    tmp.write_all(text.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| LogError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| LogError::io(path, e.error))?;

    debug!(path = %path.display(), bytes = text.len(), "wrote suite log");
    Ok(())
}
