//! Thin safe wrapper around the three libc syslog calls, active only when
//! `-l`/`--syslog` is passed.
//!
//! Grounded on `original_source/page-cache-warmer/main.c`'s
//! `logging_init`/`logging_cleanup` pair (`openlog("page-cache-warmer", ...)`
//! / `closelog()`) and the `syslog(LOG_INFO, ...)` call sites at phase
//! boundaries. `libc` is already a teacher dependency; no syslog crate
//! exists anywhere in the retrieval pack, so this stays a direct FFI
//! wrapper rather than pulling in a new one.

use std::ffi::CString;

const IDENT: &str = "disk-warmer";

pub struct Syslog {
    enabled: bool,
}

impl Syslog {
    /// Opens the syslog connection with identity `disk-warmer`, facility
    /// user, if `enabled`.
    pub fn new(enabled: bool) -> Self {
        if enabled {
            let ident = CString::new(IDENT).unwrap();
            // openlog retains the pointer, so `ident` must outlive the
            // process; a 'static leak mirrors the C original's static
            // string literal.
            let ident: &'static CString = Box::leak(Box::new(ident));
            unsafe {
                libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_USER);
            }
        }
        Self { enabled }
    }

    pub fn info(&self, message: &str) {
        self.log(libc::LOG_INFO, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(libc::LOG_WARNING, message);
    }

    pub fn error(&self, message: &str) {
        self.log(libc::LOG_ERR, message);
    }

    fn log(&self, priority: libc::c_int, message: &str) {
        if !self.enabled {
            return;
        }
        if let Ok(cmsg) = CString::new(message) {
            unsafe {
                libc::syslog(priority, c"%s".as_ptr(), cmsg.as_ptr());
            }
        }
    }
}

impl Drop for Syslog {
    fn drop(&mut self) {
        if self.enabled {
            unsafe {
                libc::closelog();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_syslog_is_a_no_op() {
        let log = Syslog::new(false);
        log.info("should not call into libc");
    }
}
