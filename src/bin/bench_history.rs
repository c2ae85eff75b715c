use bench_history::batch::{self, BatchReport};
use bench_history::codec;
use bench_history::history::AppendOptions;
use bench_history::schema::{Run, SeriesKey, DEFAULT_GROUP};
use bench_history::series::{self, Change, SeriesSummary};
use bench_history::synth::{self, SynthConfig};
use bench_history::{BenchmarkSuiteLog, Format, LogError};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse every log under the given paths and report problems.
    ///
    /// Directories are searched recursively for `data.js` logs; files named
    /// directly are read whatever their extension. All files are checked even
    /// when some fail, and the exit status is non-zero if any did.
    Check {
        #[arg(value_name = "PATH", num_args = 1.., required = true)]
        paths: Vec<PathBuf>,
    },

    /// Append one run to a log, creating the log if needed.
    Append {
        #[arg(long, value_name = "FILE")]
        log: PathBuf,

        /// JSON file holding the run to append; `-` reads stdin.
        #[arg(long, value_name = "FILE")]
        run: PathBuf,

        /// Keep at most this many runs in the group, dropping the oldest.
        /// Must be at least 1.
        #[arg(long)]
        max_items: Option<NonZeroUsize>,

        /// Repository URL for a log that does not exist yet.
        #[arg(long)]
        repo_url: Option<String>,

        /// Format for a newly created log. Existing logs keep their format.
        #[arg(long, value_enum, default_value_t = Format::Wrapped)]
        format: Format,
    },

    /// Print the runs recorded between two dates (epoch ms, inclusive).
    Range {
        #[arg(long, value_name = "FILE")]
        log: PathBuf,

        #[arg(long, default_value_t = 0)]
        from: u64,

        #[arg(long, default_value_t = u64::MAX)]
        to: u64,
    },

    /// Summarize each (name, unit) series and its latest change.
    Trend {
        #[arg(long, value_name = "FILE")]
        log: PathBuf,

        /// Only report series with this bench name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Re-emit a log as plain JSON or as a `window.BENCHMARK_DATA` script.
    Convert {
        #[arg(long, value_name = "FILE")]
        log: PathBuf,

        #[arg(long, value_enum)]
        format: Format,
    },

    /// Write a deterministic synthetic log.
    Generate {
        #[arg(long, short = 'n', default_value_t = 50)]
        runs: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long)]
        repo_url: Option<String>,

        #[arg(long, value_enum, default_value_t = Format::Wrapped)]
        format: Format,
    },
}

#[derive(Parser, Debug)]
#[command(name = "bench-history")]
#[command(about = "Read, append to and summarize CI benchmark-history logs")]
struct Args {
    /// Where to write the command's output. If omitted, prints to stdout.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Run group inside `entries`.
    #[arg(long, env = "BENCH_HISTORY_GROUP", default_value = DEFAULT_GROUP, global = true)]
    group: String,

    /// More log output on stderr (-v debug, -vv trace). `RUST_LOG` wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error("failed to read run from {}: {source}", .path.display())]
    RunInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: not a valid run: {source}", .path.display())]
    InvalidRun {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} does not exist; pass --repo-url to create it", .0.display())]
    MissingRepoUrl(PathBuf),
}

#[derive(Serialize)]
struct TrendRow<'a> {
    #[serde(flatten)]
    key: &'a SeriesKey,
    polarity: bench_history::schema::Polarity,
    summary: Option<SeriesSummary>,
    latest_change: Option<Change>,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn emit(out: Option<&Path>, text: &str) -> Result<(), CliError> {
    match out {
        Some(path) => fs::write(path, text).map_err(|e| LogError::io(path, e))?,
        None => println!("{text}"),
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value).map_err(LogError::from)?)
}

fn read_run(path: &Path) -> Result<Run, CliError> {
    let read = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).map(|_| buf)
    } else {
        fs::read_to_string(path)
    };
    let text = read.map_err(|source| CliError::RunInput {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&text).map_err(|source| CliError::InvalidRun {
        path: path.to_path_buf(),
        source,
    })
}

fn report_check(report: &BatchReport, group: &str) -> String {
    let mut lines = Vec::new();

    for loaded in &report.loaded {
        let log = &loaded.parsed.log;
        lines.push(format!(
            "ok    {} ({}): {} runs in {group:?}, {} total, last update {}",
            loaded.suite,
            loaded.path.display(),
            log.runs(group).len(),
            log.run_count(),
            log.last_update(),
        ));
        for w in &loaded.parsed.warnings {
            warn!(suite = %loaded.suite, "{w}");
        }
    }

    for err in &report.errors {
        match err {
            LogError::MalformedRecords { origin, records } => {
                for record in records {
                    lines.push(format!(
                        "error {origin}: entries[{:?}][{}]: {}\n      fragment: {}",
                        record.group, record.index, record.reason, record.fragment
                    ));
                }
            }
            other => lines.push(format!("error {other}")),
        }
    }

    lines.push(format!(
        "{} log(s) read, {} failed",
        report.loaded.len(),
        report.errors.len()
    ));
    lines.join("\n")
}

fn run(args: Args) -> Result<ExitCode, CliError> {
    let out = args.out.as_deref();
    let group = args.group.as_str();

    match args.cmd {
        Command::Check { paths } => {
            let report = batch::load_roots(&paths);
            emit(out, &report_check(&report, group))?;
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Append {
            log: log_path,
            run,
            max_items,
            repo_url,
            format,
        } => {
            let new_run = read_run(&run)?;
            let (mut log, format) = if log_path.exists() {
                let parsed = codec::read_file(&log_path)?;
                (parsed.log, parsed.format)
            } else {
                let url = repo_url.ok_or_else(|| CliError::MissingRepoUrl(log_path.clone()))?;
                info!(path = %log_path.display(), "creating new suite log");
                (BenchmarkSuiteLog::new(url), format)
            };

            let commit = new_run.commit.id.clone();
            let outcome = log.append(group, new_run, &AppendOptions { max_items });
            codec::write_file(&log_path, &log, format)?;

            info!(
                path = %log_path.display(),
                commit = %commit,
                index = outcome.index,
                evicted = outcome.evicted,
                "appended run"
            );
        }
        Command::Range { log, from, to } => {
            let parsed = codec::read_file(&log)?;
            let runs = parsed.log.query_range(group, from, to);
            debug!(matched = runs.len(), "range query");
            emit(out, &to_json(&runs)?)?;
        }
        Command::Trend { log, name } => {
            let parsed = codec::read_file(&log)?;
            let all = series::collect(parsed.log.runs(group));
            let rows: Vec<TrendRow<'_>> = all
                .values()
                .filter(|s| name.as_deref().map_or(true, |n| s.key.name == n))
                .map(|s| TrendRow {
                    key: &s.key,
                    polarity: s.polarity,
                    summary: s.summary(),
                    latest_change: s.latest_change(),
                })
                .collect();
            emit(out, &to_json(&rows)?)?;
        }
        Command::Convert { log, format } => {
            let parsed = codec::read_file(&log)?;
            emit(out, &codec::to_string(&parsed.log, format)?)?;
        }
        Command::Generate {
            runs,
            seed,
            repo_url,
            format,
        } => {
            let mut config = SynthConfig {
                runs,
                seed,
                ..Default::default()
            };
            if let Some(url) = repo_url {
                config.repo_url = url;
            }
            let log = synth::generate(&config);
            match out {
                Some(path) => codec::write_file(path, &log, format)?,
                None => println!("{}", codec::to_string(&log, format)?),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
