//! Per-phase wall-clock timing reports, printed to stdout (not the progress
//! sink) and mirrored to syslog when enabled.
//!
//! Grounded on `original_source/disk-warmer/main.c`'s `get_time_diff`/
//! `print_timing` and `page-cache-warmer/main.c`'s `timing_get_duration`/
//! `timing_print_phase`.

use std::time::Instant;

use crate::syslog::Syslog;

pub struct PhaseTimer {
    start: Instant,
}

impl PhaseTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Prints `"<phase> completed in <secs>.2f seconds"` to stdout (unless
    /// `silent`) and logs an equivalent record to syslog (if enabled).
    /// Returns the elapsed duration so callers can accumulate a total.
    pub fn finish(self, phase_name: &str, silent: bool, syslog: &Syslog) -> std::time::Duration {
        let elapsed = self.start.elapsed();
        if !silent {
            println!("{phase_name} completed in {:.2} seconds", elapsed.as_secs_f64());
        }
        syslog.info(&format!(
            "{phase_name} completed in {:.2} seconds",
            elapsed.as_secs_f64()
        ));
        elapsed
    }
}
