//! Per-benchmark time series for trend reporting.
//!
//! A series is keyed by `(name, unit)`: the same bench name recorded in
//! seconds by one suite and in MiB/s by another never mixes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::schema::{Polarity, Run, SeriesKey};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub date: u64,
    pub commit_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub key: SeriesKey,
    /// Taken from the most recent run that recorded this series.
    pub polarity: Polarity,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub latest: f64,
    /// Recorded zeros. They are included in every statistic above.
    pub zero_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Improved,
    Regressed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub previous: f64,
    pub latest: f64,
    /// `latest / previous`; absent when the previous value is zero.
    pub ratio: Option<f64>,
    pub direction: Direction,
}

/// Group every measurement of `runs` into series, preserving run order.
pub fn collect<'a, I>(runs: I) -> BTreeMap<SeriesKey, Series>
where
    I: IntoIterator<Item = &'a Run>,
{
    let mut out: BTreeMap<SeriesKey, Series> = BTreeMap::new();

    for run in runs {
        let polarity = run.tool.polarity();
        for m in &run.benches {
            let key = m.series_key();
            let series = out.entry(key.clone()).or_insert_with(|| Series {
                key,
                polarity,
                points: Vec::new(),
            });
            series.polarity = polarity;
            series.points.push(Point {
                date: run.date,
                commit_id: run.commit.id.clone(),
                value: m.value,
            });
        }
    }

    out
}

impl Series {
    pub fn summary(&self) -> Option<SeriesSummary> {
        let latest = self.points.last()?.value;
        let values = self.points.iter().map(|p| p.value);

        let min = values.clone().fold(f64::INFINITY, f64::min);
        let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.clone().sum::<f64>() / self.points.len() as f64;
        let zero_count = values.filter(|v| *v == 0.0).count();

        Some(SeriesSummary {
            count: self.points.len(),
            min,
            max,
            mean,
            latest,
            zero_count,
        })
    }

    /// Compare the last two points, judged by the series' polarity.
    pub fn latest_change(&self) -> Option<Change> {
        let [.., prev, last] = self.points.as_slice() else {
            return None;
        };
        Some(compare(prev.value, last.value, self.polarity))
    }
}

pub fn compare(previous: f64, latest: f64, polarity: Polarity) -> Change {
    let ratio = (previous != 0.0).then(|| latest / previous);
    let direction = if latest == previous {
        Direction::Unchanged
    } else {
        match (polarity, latest < previous) {
            (Polarity::SmallerIsBetter, true) | (Polarity::BiggerIsBetter, false) => {
                Direction::Improved
            }
            _ => Direction::Regressed,
        }
    };

    Change {
        previous,
        latest,
        ratio,
        direction,
    }
}

/// Mean of a run's measurements, one figure per unit.
pub fn mean_by_unit(run: &Run) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for m in &run.benches {
        let entry = sums.entry(m.unit.clone()).or_insert((0.0, 0));
        entry.0 += m.value;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(unit, (sum, n))| (unit, sum / n as f64))
        .collect()
}
