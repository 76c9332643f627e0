pub mod bitmap;
pub mod config;
pub mod device;
pub mod discover;
pub mod engine;
pub mod error;
pub mod extent;
pub mod io;
pub mod progress;
pub mod syslog;
pub mod throttle;
pub mod timing;

pub use config::Config;
pub use error::DiskWarmerError;

use bitmap::WarmedBitmap;
use io::backend::select_backend;
use progress::ProgressSink;
use syslog::Syslog;
use throttle::ThrottleGuard;
use timing::PhaseTimer;

/// Runs the block-device variant end to end: probe the device, discover
/// extents under `config.directories`, warm them (phase 1), and optionally
/// sweep the remainder of the device (phase 2).
pub fn run_block_device(config: &Config, progress: &dyn ProgressSink) -> Result<(), DiskWarmerError> {
    config.validate()?;
    let syslog = Syslog::new(config.syslog);
    let device_path = config
        .device
        .as_deref()
        .ok_or_else(|| DiskWarmerError::BadArgument("a device path is required".into()))?;

    let overall_start = PhaseTimer::start();

    let dev = device::open(device_path, progress)?;
    let (read_size, stride) = dev
        .params
        .align_io_params(config.read_size_bytes(), config.stride_bytes());

    let discover_timer = PhaseTimer::start();
    let mut store = discover::discover_extents(
        &config.directories,
        config.max_depth,
        config.threads,
        progress,
    );
    discover_timer.finish("Discovery", config.silent, &syslog);

    progress.debug(&format!("found {} extents before merge", store.len()));
    store.sort();
    if config.merge_extents {
        store.merge_adjacent(config.merge_cap_bytes());
    }

    let mut bitmap = WarmedBitmap::new(dev.params.size_bytes, stride);

    if !config.silent {
        println!("=== Phase 1: warming directory files ===");
    }
    {
        let _throttle = ThrottleGuard::apply(config.phase1_throttle);
        let phase1_timer = PhaseTimer::start();
        let (mut backend, kind) = select_backend(config.queue_depth as usize, read_size as usize)?;
        progress.debug(&format!("phase 1 backend: {kind}"));
        engine::warm_extents(
            backend.as_mut(),
            &mut bitmap,
            &store,
            read_size,
            stride,
            dev.params.size_bytes,
            dev.fd,
            "Phase 1 - Directory files",
            progress,
        )?;
        phase1_timer.finish("Phase 1 (directory warming)", config.silent, &syslog);
    }

    if config.full_disk {
        if !config.silent {
            println!("=== Phase 2: warming remaining disk blocks ===");
        }
        let _throttle = ThrottleGuard::apply(config.phase2_throttle);
        let phase2_timer = PhaseTimer::start();
        let (mut backend, kind) = select_backend(config.queue_depth as usize, read_size as usize)?;
        progress.debug(&format!("phase 2 backend: {kind}"));
        engine::warm_device_sweep(
            backend.as_mut(),
            &bitmap,
            dev.params.size_bytes,
            read_size,
            stride,
            dev.fd,
            "Phase 2 - Remaining disk blocks",
            progress,
        )?;
        phase2_timer.finish("Phase 2 (remaining disk warming)", config.silent, &syslog);
        if !config.silent {
            println!("=== Two-phase disk warming completed successfully ===");
        }
    }

    overall_start.finish("Total warming time", config.silent, &syslog);
    syslog.info("warming run completed successfully");
    Ok(())
}

/// Runs the page-cache variant: discover every regular file under
/// `config.directories` and drive up to `config.queue_depth` of them
/// through the page cache concurrently (no block device, no extents, no
/// phase 2).
pub fn run_page_cache(config: &Config, progress: &dyn ProgressSink) -> Result<(), DiskWarmerError> {
    config.validate()?;
    let syslog = Syslog::new(config.syslog);
    let overall_start = PhaseTimer::start();

    let _throttle = ThrottleGuard::apply(config.phase1_throttle);

    let discover_timer = PhaseTimer::start();
    let entries = discover::discover_file_entries(
        &config.directories,
        config.max_depth,
        config.threads,
        progress,
    );
    discover_timer.finish("Discovery", config.silent, &syslog);

    let read_size = config.read_size_bytes();
    let (mut backend, kind) = select_backend(config.queue_depth as usize, read_size as usize)?;
    progress.debug(&format!("page cache backend: {kind}"));
    engine::warm_files(
        backend.as_mut(),
        &entries,
        read_size,
        "Warming page cache",
        progress,
    )?;

    overall_start.finish("Total warming time", config.silent, &syslog);
    syslog.info("page cache warming completed successfully");
    Ok(())
}
