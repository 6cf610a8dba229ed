//! Typed, validated configuration built from parsed CLI args.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{AnalyseArgs, Backend, RunArgs};
use crate::error::{CrawlError, Result};
use crate::extract::functions::ALLOWED_FUNCTIONS;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub backend: Backend,
    pub urlfile: PathBuf,
    pub workers: usize,
    pub batchsize: usize,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub logfile: PathBuf,
    pub datafile: PathBuf,
    pub nsserver: String,
    pub useragent: Option<String>,
    pub output_batchsize: usize,

    pub pycurl_maxhandles: usize,
    pub pycurl_read_interval: Duration,
    pub pycurl_enabled_ares: bool,
    pub pycurl_contentbuffersize: usize,
    pub pycurl_headerbuffersize: usize,
    pub pycurl_lastfill_waittime: Duration,
    pub pycurl_max_spawns_per_iteration: usize,
}

/// `1_000_000 < x < 1` in the original is an unreachable typo for
/// `not (1 <= x <= 1_000_000)`; we implement the intent.
const MAX_HANDLES_CEILING: usize = 1_000_000;

impl CrawlConfig {
    pub fn from_args(args: RunArgs) -> Result<Self> {
        if args.workers == 0 {
            return Err(CrawlError::config("--workers must be at least 1"));
        }
        if args.batchsize == 0 {
            return Err(CrawlError::config("--batchsize must be at least 1"));
        }
        if !(1..=MAX_HANDLES_CEILING).contains(&args.pycurl_maxhandles) {
            return Err(CrawlError::config(format!(
                "--pycurl-maxhandles must be in 1..={MAX_HANDLES_CEILING}, got {}",
                args.pycurl_maxhandles
            )));
        }
        if args.pycurl_max_spawns_per_iteration == 0 {
            return Err(CrawlError::config(
                "--pycurl-max-spawns-per-iteration must be at least 1",
            ));
        }
        if args.output_batchsize == 0 {
            return Err(CrawlError::config("--output-batchsize must be at least 1"));
        }
        if !args.urlfile.exists() {
            return Err(CrawlError::config(format!(
                "urlfile does not exist: {}",
                args.urlfile.display()
            )));
        }

        Ok(Self {
            backend: args.backend,
            urlfile: args.urlfile,
            workers: args.workers,
            batchsize: args.batchsize,
            timeout: Duration::from_secs(args.timeout),
            connect_timeout: Duration::from_secs(args.connect_timeout),
            logfile: args.logfile,
            datafile: args.datafile,
            nsserver: args.nsserver,
            useragent: args.useragent,
            output_batchsize: args.output_batchsize,
            pycurl_maxhandles: args.pycurl_maxhandles,
            pycurl_read_interval: Duration::from_secs_f64(args.pycurl_readinterval / 1000.0),
            pycurl_enabled_ares: args.pycurl_enabled_ares,
            pycurl_contentbuffersize: args.pycurl_maxbodysize,
            pycurl_headerbuffersize: args.pycurl_maxheadersize,
            pycurl_lastfill_waittime: Duration::from_secs_f64(args.pycurl_lastfill_waittime),
            pycurl_max_spawns_per_iteration: args.pycurl_max_spawns_per_iteration,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnalyseConfig {
    pub file_glob: String,
    pub max_workers: usize,
    pub function: String,
    pub regexp: Option<String>,
}

impl AnalyseConfig {
    pub fn from_args(args: AnalyseArgs) -> Result<Self> {
        if !ALLOWED_FUNCTIONS.contains(&args.function.as_str()) {
            return Err(CrawlError::config(format!(
                "unknown function {:?}, expected one of {:?}",
                args.function, ALLOWED_FUNCTIONS
            )));
        }
        if args.function == "regexmatch" && args.regexp.is_none() {
            return Err(CrawlError::config(
                "--regexp is required when --function=regexmatch",
            ));
        }
        if args.max_workers == 0 {
            return Err(CrawlError::config("--max-workers must be at least 1"));
        }

        Ok(Self {
            file_glob: args.file_glob,
            max_workers: args.max_workers,
            function: args.function,
            regexp: args.regexp,
        })
    }
}
