//! Deterministic synthetic suite logs.
//!
//! Produces logs shaped like real CI history (re-runs of the same commit,
//! occasional zero readings, a bench added halfway through) for benchmarks,
//! tests and dashboard smoke checks. The same seed always yields the same log.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::history::AppendOptions;
use crate::schema::{BenchmarkSuiteLog, CommitInfo, Measurement, Person, Run, Tool, DEFAULT_GROUP};

/// Bench added to every run from the halfway point on when `drift` is set.
pub const DRIFT_BENCH: &str = "test";

#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// Number of runs to generate.
    pub runs: usize,
    pub seed: u64,
    pub repo_url: String,
    /// Date of the first run, epoch milliseconds.
    pub start_date: u64,
    /// Mean spacing between runs.
    pub interval_ms: u64,
    pub tool: Tool,
    /// `(name, unit)` of each measurement recorded per run.
    pub benches: Vec<(String, String)>,
    /// Probability that a measurement is recorded as exactly zero.
    pub zero_rate: f64,
    /// Probability that a run re-benchmarks the previous commit.
    pub rerun_rate: f64,
    pub drift: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        let benches = [
            ("sequential_read", "milliseconds"),
            ("random_read", "milliseconds"),
            ("sequential_write", "milliseconds"),
            ("create_1000_files_in_10_threads", "milliseconds"),
        ];
        Self {
            runs: 50,
            seed: 42,
            repo_url: "https://github.com/example/storage-fuse".to_string(),
            start_date: 1_741_426_022_487,
            interval_ms: 86_400_000,
            tool: Tool::CustomSmallerIsBetter,
            benches: benches
                .iter()
                .map(|(n, u)| (n.to_string(), u.to_string()))
                .collect(),
            zero_rate: 0.02,
            rerun_rate: 0.1,
            drift: true,
        }
    }
}

const AUTHORS: &[(&str, &str, &str)] = &[
    ("Ada Byron", "ada@example.com", "ada-b"),
    ("Linus Pauling", "linus@example.com", "lpauling"),
    ("Grace Murray", "grace@example.com", "gmurray"),
];

fn random_sha(rng: &mut ChaCha8Rng) -> String {
    (0..20).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}

fn random_commit(rng: &mut ChaCha8Rng, repo_url: &str, date: u64) -> CommitInfo {
    let (name, email, username) = *AUTHORS.choose(rng).unwrap_or(&AUTHORS[0]);
    let author = Person::new(name, email, Some(username.to_string()));
    let id = random_sha(rng);
    // Older uploader versions did not record `distinct` or `tree_id`.
    let legacy = rng.gen_bool(0.3);

    CommitInfo {
        committer: author.clone(),
        author,
        distinct: (!legacy).then_some(true),
        tree_id: (!legacy).then(|| random_sha(rng)),
        message: format!("Tune read path ({})", &id[..7]),
        timestamp: iso8601_utc(date.saturating_sub(rng.gen_range(60_000..3_600_000))),
        url: format!("{repo_url}/commit/{id}"),
        id,
    }
}

/// Format epoch milliseconds as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn iso8601_utc(epoch_ms: u64) -> String {
    let secs = epoch_ms / 1000;
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hh, mm, ss) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    // Civil date from days since 1970-01-01 (proleptic Gregorian).
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!("{year:04}-{month:02}-{day:02}T{hh:02}:{mm:02}:{ss:02}Z")
}

/// Build a log with `config.runs` runs in the default group.
pub fn generate(config: &SynthConfig) -> BenchmarkSuiteLog {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut log = BenchmarkSuiteLog::new(config.repo_url.clone());

    let baselines: Vec<f64> = config
        .benches
        .iter()
        .map(|_| rng.gen_range(0.05..250.0))
        .collect();

    let interval = config.interval_ms.max(2);
    let mut commit: Option<CommitInfo> = None;

    for i in 0..config.runs {
        let date = config.start_date + i as u64 * interval + rng.gen_range(0..interval / 2);

        let rerun = commit.is_some() && rng.gen_bool(config.rerun_rate.clamp(0.0, 1.0));
        let run_commit = match (&commit, rerun) {
            (Some(c), true) => c.clone(),
            _ => random_commit(&mut rng, &config.repo_url, date),
        };
        commit = Some(run_commit.clone());

        let mut benches: Vec<Measurement> = config
            .benches
            .iter()
            .zip(&baselines)
            .map(|((name, unit), base)| {
                let value = if rng.gen_bool(config.zero_rate.clamp(0.0, 1.0)) {
                    0.0
                } else {
                    base * rng.gen_range(0.85..1.15)
                };
                Measurement::new(name.clone(), value, unit.clone())
            })
            .collect();
        if config.drift && i >= config.runs / 2 {
            benches.push(Measurement::new(DRIFT_BENCH, rng.gen_range(1.0..10.0), "milliseconds"));
        }

        log.append(
            DEFAULT_GROUP,
            Run {
                commit: run_commit,
                date,
                tool: config.tool.clone(),
                benches,
            },
            &AppendOptions::default(),
        );
    }

    // The uploader stamps its own clock a little after the last run.
    log.last_update += rng.gen_range(50..400);
    log
}
