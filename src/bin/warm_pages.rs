//! `warm-pages`: page-cache variant. Discovers every regular file under one
//! or more directories and reads it through the normal buffered I/O path so
//! its contents land in the page cache.
//!
//! Grounded on `original_source/page-cache-warmer/main.c`'s option set,
//! which drops `--full-disk`/`--merge-extents` (no device, no extents) and
//! collapses the block-device variant's phase1/phase2 throttle split into a
//! single `--throttle` (page-cache warming has no phase 2).

use clap::Parser;

use diskwarmer::config::{
    Config, DEFAULT_MAX_DEPTH, DEFAULT_QUEUE_DEPTH, DEFAULT_READ_SIZE_KB, DEFAULT_THREADS,
};
use diskwarmer::progress::{NullSink, ProgressSink, StderrSink};

#[derive(Parser, Debug)]
#[command(name = "warm-pages", about = "Warm the OS page cache for a set of directories")]
struct Cli {
    /// Directories to discover files under; at least one is required.
    #[arg(required = true, num_args = 1..)]
    directories: Vec<String>,

    /// Per-read length in KiB.
    #[arg(short = 'r', long = "read-size-kb", default_value_t = DEFAULT_READ_SIZE_KB)]
    read_size_kb: u64,

    /// Files read concurrently through the async backend.
    #[arg(short = 'q', long = "queue-depth", default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: u32,

    /// Duplicate summary records to syslog.
    #[arg(short = 'l', long = "syslog")]
    syslog: bool,

    /// Suppress progress output.
    #[arg(long = "silent")]
    silent: bool,

    /// Verbose diagnostics.
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Discovery depth cap; -1 for unlimited.
    #[arg(short = 'D', long = "max-depth", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: i32,

    /// Discovery concurrency, 1-16.
    #[arg(short = 'T', long = "threads", default_value_t = DEFAULT_THREADS)]
    threads: u32,

    /// Nice/ioprio throttle level, 0-7.
    #[arg(short = 'P', long = "throttle", default_value_t = 0)]
    throttle: u32,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            directories: cli.directories,
            device: None,
            read_size_kb: cli.read_size_kb,
            stride_kb: cli.read_size_kb,
            queue_depth: cli.queue_depth,
            full_disk: false,
            merge_extents: false,
            syslog: cli.syslog,
            silent: cli.silent,
            debug: cli.debug,
            max_depth: cli.max_depth,
            threads: cli.threads,
            phase1_throttle: cli.throttle,
            phase2_throttle: 0,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config: Config = cli.into();

    if let Err(e) = config.validate() {
        eprintln!("warm-pages: {e}");
        std::process::exit(1);
    }

    let sink: Box<dyn ProgressSink> = if config.silent {
        Box::new(NullSink)
    } else {
        Box::new(StderrSink::new(config.debug))
    };

    if let Err(e) = diskwarmer::run_page_cache(&config, sink.as_ref()) {
        eprintln!("warm-pages: {e}");
        std::process::exit(1);
    }
}
