//! CPU and I/O priority throttling, with an RAII guard that restores the
//! process's original priorities regardless of how the throttled phase
//! exits.
//!
//! Grounded on `original_source/page-cache-warmer/main.c`'s throttle block
//! (`getpriority`/`setpriority(PRIO_PROCESS, ...)` plus
//! `syscall(SYS_ioprio_get/SYS_ioprio_set, ...)`) and
//! `original_source/disk-warmer/main.c`'s equivalent. `ioprio_get`/
//! `ioprio_set` have no `libc` wrapper, so they're invoked as raw syscalls,
//! same as the teacher's raw-syscall pattern in `io/engine.rs` for io_uring
//! setup. Unlike the C originals, which only restore priorities on a clean
//! exit path, this is a `Drop` guard: it restores on every exit, including
//! early returns and panics (spec §16, "stronger than the C original").

#[cfg(target_os = "linux")]
const SYS_IOPRIO_GET: libc::c_long = 252;
#[cfg(target_os = "linux")]
const SYS_IOPRIO_SET: libc::c_long = 251;

#[cfg(target_os = "linux")]
const IOPRIO_WHO_PROCESS: libc::c_int = 1;

const IOPRIO_CLASS_SHIFT: i32 = 13;

/// Maps a throttle level (0-7, spec §6) onto a `(nice, ioprio_class,
/// ioprio_level)` triple. Level 0 means "no throttling" and is handled by
/// the caller before constructing a guard.
fn throttle_params(level: u32) -> (i32, i32, i32) {
    let nice = 10 + level as i32;
    let ioclass = if level >= 4 { 3 } else { 2 }; // idle : best-effort
    let iolevel = if ioclass == 3 {
        0
    } else {
        (level as i32 + 3).min(7)
    };
    (nice, ioclass, iolevel)
}

#[cfg(target_os = "linux")]
fn ioprio_get_self() -> i32 {
    unsafe { libc::syscall(SYS_IOPRIO_GET, IOPRIO_WHO_PROCESS, 0) as i32 }
}

#[cfg(target_os = "linux")]
fn ioprio_set_self(class: i32, level: i32) {
    let ioprio = (class << IOPRIO_CLASS_SHIFT) | level;
    unsafe {
        libc::syscall(SYS_IOPRIO_SET, IOPRIO_WHO_PROCESS, 0, ioprio);
    }
}

/// Applies CPU-nice and (on Linux) I/O-class throttling for `level` in
/// `1..=7` on construction, and restores the pre-throttle priorities when
/// dropped. `level == 0` yields a no-op guard.
pub struct ThrottleGuard {
    orig_nice: i32,
    #[cfg(target_os = "linux")]
    orig_ioprio: i32,
    active: bool,
}

impl ThrottleGuard {
    pub fn apply(level: u32) -> Self {
        if level == 0 {
            return Self {
                orig_nice: 0,
                #[cfg(target_os = "linux")]
                orig_ioprio: 0,
                active: false,
            };
        }

        let orig_nice = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
        #[cfg(target_os = "linux")]
        let orig_ioprio = ioprio_get_self();

        let (nice, ioclass, iolevel) = throttle_params(level);
        unsafe {
            libc::setpriority(libc::PRIO_PROCESS, 0, nice);
        }
        #[cfg(target_os = "linux")]
        ioprio_set_self(ioclass, iolevel);

        Self {
            orig_nice,
            #[cfg(target_os = "linux")]
            orig_ioprio,
            active: true,
        }
    }
}

impl Drop for ThrottleGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        unsafe {
            libc::setpriority(libc::PRIO_PROCESS, 0, self.orig_nice);
        }
        #[cfg(target_os = "linux")]
        {
            let class = (self.orig_ioprio >> IOPRIO_CLASS_SHIFT) & 0x7;
            let level = self.orig_ioprio & 0x1fff;
            ioprio_set_self(class, level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_zero_is_inactive() {
        let guard = ThrottleGuard::apply(0);
        assert!(!guard.active);
    }

    #[test]
    fn low_level_maps_to_best_effort_class() {
        let (nice, class, level) = throttle_params(1);
        assert_eq!(nice, 11);
        assert_eq!(class, 2);
        assert_eq!(level, 4);
    }

    #[test]
    fn high_level_maps_to_idle_class() {
        let (nice, class, level) = throttle_params(7);
        assert_eq!(nice, 17);
        assert_eq!(class, 3);
        assert_eq!(level, 0);
    }

    #[test]
    fn best_effort_level_is_capped_at_seven() {
        let (_, class, level) = throttle_params(3);
        assert_eq!(class, 2);
        assert_eq!(level, 6);
    }

    #[test]
    fn applying_and_dropping_a_guard_does_not_panic() {
        let guard = ThrottleGuard::apply(1);
        drop(guard);
    }
}
