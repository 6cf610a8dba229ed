//! Process-wide resource limits.
//!
//! Mirrors the original tool's `resource.setrlimit(RLIMIT_NOFILE, (1e6,
//! 1e6))` at startup and its `os.nice(19)` inside each fetch worker. Both
//! are best-effort: a failure to raise the limit does not abort the run,
//! it just means the operator needs to size `workers * max_handles` within
//! whatever ceiling the OS allows.

pub const TARGET_NOFILE: u64 = 1_000_000;

#[cfg(unix)]
pub fn raise_nofile_limit() {
    match rlimit::increase_nofile_limit(TARGET_NOFILE) {
        Ok(got) if got < TARGET_NOFILE => {
            tracing::warn!(
                requested = TARGET_NOFILE,
                granted = got,
                "could not raise RLIMIT_NOFILE to the requested ceiling"
            );
        }
        Ok(got) => {
            tracing::debug!(limit = got, "raised RLIMIT_NOFILE");
        }
        Err(err) => {
            tracing::warn!(%err, "failed to raise RLIMIT_NOFILE; continuing with current limit");
        }
    }
}

#[cfg(not(unix))]
pub fn raise_nofile_limit() {
    tracing::debug!("RLIMIT_NOFILE raise skipped: not a unix target");
}

/// Lower this process's scheduling priority so it yields to more important
/// collocated processes (the coordinator, a local resolver). Best-effort;
/// a failure here is not fatal.
#[cfg(unix)]
pub fn lower_priority() {
    // SAFETY: PRIO_PROCESS + pid 0 only ever affects the calling process.
    let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, 19) };
    if ret != 0 {
        tracing::debug!("failed to lower process priority (nice +19)");
    }
}

#[cfg(not(unix))]
pub fn lower_priority() {}
