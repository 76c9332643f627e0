//! `warm`: block-device variant. Discovers the physical extents of the
//! files under one or more directories, warms them, and optionally sweeps
//! the remainder of the device.
//!
//! Grounded on spec §6's full flag table; the teacher has no CLI of its
//! own, so the surface here is built with `clap`'s derive API, following
//! `examples/coreos-coreos-installer/src/cmdline.rs`'s option naming in
//! spirit but using the modern derive macros instead of that crate's
//! builder-style `App`/`Arg` (a v3-era API; this crate targets clap 4).

use clap::Parser;

use diskwarmer::config::{
    Config, DEFAULT_MAX_DEPTH, DEFAULT_QUEUE_DEPTH, DEFAULT_READ_SIZE_KB, DEFAULT_STRIDE_KB,
    DEFAULT_THREADS,
};
use diskwarmer::progress::{NullSink, ProgressSink, StderrSink};

#[derive(Parser, Debug)]
#[command(name = "warm", about = "Asynchronously warm an EBS-backed block device")]
struct Cli {
    /// One or more directories to discover files under, followed by the
    /// block device (or image file) to warm. The last path is always taken
    /// as the device; clap cannot express "variadic, then one more" as two
    /// separate positionals, so this is a single list split in `From<Cli>`.
    #[arg(required = true, num_args = 2..)]
    paths: Vec<String>,

    /// Per-read length in KiB; auto-aligned under direct I/O.
    #[arg(short = 'r', long = "read-size-kb", default_value_t = DEFAULT_READ_SIZE_KB)]
    read_size_kb: u64,

    /// Stride between reads within an extent, in KiB.
    #[arg(short = 's', long = "stride-kb", default_value_t = DEFAULT_STRIDE_KB)]
    stride_kb: u64,

    /// In-flight requests per phase.
    #[arg(short = 'q', long = "queue-depth", default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: u32,

    /// Enable the phase-2 full-device sweep.
    #[arg(short = 'f', long = "full-disk")]
    full_disk: bool,

    /// Enable the adjacent-extent merge pass (16 MiB cap).
    #[arg(short = 'm', long = "merge-extents")]
    merge_extents: bool,

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
    ///
    /// `allow_hyphen_values` is required here: `-1`/`--phase1-throttle`
    /// registers `-1` as a short flag, which would otherwise make clap
    /// swallow `--max-depth -1` as that flag instead of as this value.
    #[arg(short = 'D', long = "max-depth", allow_hyphen_values = true, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: i32,

    /// Discovery concurrency, 1-16.
    #[arg(short = 'T', long = "threads", default_value_t = DEFAULT_THREADS)]
    threads: u32,

    /// Nice/ioprio throttle level for phase 2, 0-7.
    #[arg(short = 'P', long = "phase2-throttle", default_value_t = 0)]
    phase2_throttle: u32,

    /// Nice/ioprio throttle level for phase 1, 0-7.
    #[arg(short = '1', long = "phase1-throttle", default_value_t = 0)]
    phase1_throttle: u32,
}

impl From<Cli> for Config {
    fn from(mut cli: Cli) -> Self {
        let device = cli.paths.pop().expect("clap enforces at least 2 paths");
        Config {
            directories: cli.paths,
            device: Some(device),
            read_size_kb: cli.read_size_kb,
            stride_kb: cli.stride_kb,
            queue_depth: cli.queue_depth,
            full_disk: cli.full_disk,
            merge_extents: cli.merge_extents,
            syslog: cli.syslog,
            silent: cli.silent,
            debug: cli.debug,
            max_depth: cli.max_depth,
            threads: cli.threads,
            phase1_throttle: cli.phase1_throttle,
            phase2_throttle: cli.phase2_throttle,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config: Config = cli.into();

    if let Err(e) = config.validate() {
        eprintln!("warm: {e}");
        std::process::exit(1);
    }

    let sink: Box<dyn ProgressSink> = if config.silent {
        Box::new(NullSink)
    } else {
        Box::new(StderrSink::new(config.debug))
    };

    if let Err(e) = diskwarmer::run_block_device(&config, sink.as_ref()) {
        eprintln!("warm: {e}");
        std::process::exit(1);
    }
}
