//! Command-line surface.
//!
//! Flag names follow the original `run.py` and `analyse.py` argparse
//! definitions as closely as Rust/clap conventions allow.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "netcrawl",
    version,
    about = "Bulk HTTP fetcher and batched HTML extraction pipeline"
)]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv, ...); default is "info".
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch URLs from a file concurrently and persist batched results.
    Run(RunArgs),
    /// Re-read persisted batches and run an extraction function over them.
    Analyse(AnalyseArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Multiplexed event loop over a bounded slot pool (curl-multi style).
    Pycurl,
    /// One request at a time per worker (simple, sequential).
    Requests,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value = "pycurl")]
    pub backend: Backend,

    #[arg(long)]
    pub urlfile: PathBuf,

    #[arg(long)]
    pub workers: usize,

    #[arg(long)]
    pub batchsize: usize,

    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    #[arg(long = "connect-timeout", default_value_t = 3)]
    pub connect_timeout: u64,

    #[arg(long)]
    pub logfile: PathBuf,

    #[arg(long)]
    pub datafile: PathBuf,

    #[arg(long, default_value = "127.0.0.1")]
    pub nsserver: String,

    #[arg(long)]
    pub useragent: Option<String>,

    #[arg(long = "output-batchsize", default_value_t = 100_000)]
    pub output_batchsize: usize,

    #[arg(long = "pycurl-maxhandles", default_value_t = 100)]
    pub pycurl_maxhandles: usize,

    #[arg(long = "pycurl-readinterval", default_value_t = 10.0)]
    pub pycurl_readinterval: f64,

    #[arg(long = "pycurl-enabled-ares", default_value_t = false)]
    pub pycurl_enabled_ares: bool,

    #[arg(long = "pycurl-maxbodysize", default_value_t = 4096)]
    pub pycurl_maxbodysize: usize,

    #[arg(long = "pycurl-maxheadersize", default_value_t = 4096)]
    pub pycurl_maxheadersize: usize,

    #[arg(long = "pycurl-lastfill-waittime", default_value_t = 0.1)]
    pub pycurl_lastfill_waittime: f64,

    #[arg(long = "pycurl-max-spawns-per-iteration", default_value_t = 3)]
    pub pycurl_max_spawns_per_iteration: usize,
}

#[derive(Parser, Debug)]
pub struct AnalyseArgs {
    #[arg(long = "file-glob")]
    pub file_glob: String,

    #[arg(long = "max-workers")]
    pub max_workers: usize,

    #[arg(long)]
    pub function: String,

    #[arg(long)]
    pub regexp: Option<String>,
}
