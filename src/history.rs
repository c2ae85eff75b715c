//! Operations on a single suite log: append, range queries and consistency
//! checks.
//!
//! Logs only ever grow at the end of a group. Nothing here sorts, merges or
//! deduplicates runs; file order is the order runs were recorded in.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use tracing::{debug, warn};

use crate::error::Warning;
use crate::schema::{BenchmarkSuiteLog, Run};

#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Keep at most this many runs in the group, dropping the oldest. Never
    /// zero, so the run just appended always survives.
    pub max_items: Option<NonZeroUsize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendOutcome {
    /// Position of the new run in its group after eviction.
    pub index: usize,
    pub evicted: usize,
    pub warnings: Vec<Warning>,
}

impl BenchmarkSuiteLog {
    pub fn new(repo_url: impl Into<String>) -> Self {
        Self {
            last_update: 0,
            repo_url: repo_url.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Runs of `group` in file order; empty if the group does not exist.
    pub fn runs(&self, group: &str) -> &[Run] {
        self.entries.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn run_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Newest run date across all groups.
    ///
    /// The stored `lastUpdate` is the writer's wall-clock time and usually
    /// trails the last run by a few milliseconds; this is the value derived
    /// from the data itself. A log without runs reports the stored value.
    pub fn last_update(&self) -> u64 {
        self.entries
            .values()
            .flatten()
            .map(|run| run.date)
            .max()
            .unwrap_or(self.last_update)
    }

    /// Append `run` to the end of `group`, creating the group if needed.
    pub fn append(&mut self, group: &str, run: Run, opts: &AppendOptions) -> AppendOutcome {
        let runs = self.entries.entry(group.to_string()).or_default();
        let mut warnings = Vec::new();

        if let Some(previous_max) = runs.iter().map(|r| r.date).max() {
            if run.date < previous_max {
                let w = Warning::OrderingViolation {
                    group: group.to_string(),
                    index: runs.len(),
                    date: run.date,
                    previous_max,
                };
                warn!("{w}");
                warnings.push(w);
            }
        }
        if let Some(prev) = runs.last() {
            if let Some(w) = drift(group, runs.len(), prev, &run) {
                debug!("{w}");
                warnings.push(w);
            }
        }

        self.last_update = self.last_update.max(run.date);
        runs.push(run);

        let mut evicted = 0;
        if let Some(max) = opts.max_items.map(NonZeroUsize::get) {
            if runs.len() > max {
                evicted = runs.len() - max;
                runs.drain(..evicted);
                debug!(group, evicted, "dropped oldest runs");
            }
        }

        AppendOutcome {
            index: runs.len().saturating_sub(1),
            evicted,
            warnings,
        }
    }

    /// Runs of `group` with `start <= date <= end`, in file order.
    pub fn query_range(&self, group: &str, start: u64, end: u64) -> Vec<&Run> {
        self.runs(group)
            .iter()
            .filter(|run| (start..=end).contains(&run.date))
            .collect()
    }

    /// Non-fatal diagnostics for the log as stored.
    pub fn check(&self) -> Vec<Warning> {
        let mut warnings = Vec::new();

        for (group, runs) in &self.entries {
            let mut max_date: Option<u64> = None;
            for (index, run) in runs.iter().enumerate() {
                if let Some(previous_max) = max_date {
                    if run.date < previous_max {
                        warnings.push(Warning::OrderingViolation {
                            group: group.clone(),
                            index,
                            date: run.date,
                            previous_max,
                        });
                    }
                }
                max_date = Some(max_date.map_or(run.date, |m| m.max(run.date)));

                if index > 0 {
                    warnings.extend(drift(group, index, &runs[index - 1], run));
                }
            }
        }

        let newest = self.last_update();
        if self.last_update < newest {
            warnings.push(Warning::StaleLastUpdate {
                recorded: self.last_update,
                newest,
            });
        }

        warnings
    }
}

fn bench_names(run: &Run) -> BTreeSet<&str> {
    run.benches.iter().map(|m| m.name.as_str()).collect()
}

fn drift(group: &str, index: usize, prev: &Run, run: &Run) -> Option<Warning> {
    let before = bench_names(prev);
    let after = bench_names(run);
    if before == after {
        return None;
    }

    Some(Warning::SchemaDrift {
        group: group.to_string(),
        index,
        added: after.difference(&before).map(|s| s.to_string()).collect(),
        removed: before.difference(&after).map(|s| s.to_string()).collect(),
    })
}
