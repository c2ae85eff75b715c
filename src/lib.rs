use clap::ValueEnum;

pub mod batch;
pub mod codec;
pub mod error;
pub mod history;
pub mod schema;
pub mod series;
pub mod synth;

pub use error::{LogError, RecordError, Warning};
pub use schema::{BenchmarkSuiteLog, CommitInfo, Measurement, Person, Run, Tool};

/// On-disk representation of a suite log.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum Format {
    /// Plain JSON document.
    Json,
    /// JSON assigned to `window.BENCHMARK_DATA`, loadable with a `<script>` tag.
    #[default]
    #[value(name = "js")]
    Wrapped,
}
