//! Progress reporting for long-running algorithms.
//!
//! Greedy anchor selection runs one full reconstruction per added anchor and
//! the compression pipeline chains several stages, so both accept a
//! [`Progress`] callback.
//!
//! # Example
//!
//! ```
//! use lapmesh::algo::progress::Progress;
//!
//! let progress = Progress::new(|current, total, message| {
//!     eprintln!("[{}/{}] {}", current, total, message);
//! });
//! progress.report(1, 4, "quantizing");
//! ```

/// A progress callback that receives updates during long-running operations.
///
/// The callback receives the current step, the total number of steps and a
/// short description of the stage.
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    /// Create a new progress reporter with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report progress.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        (self.callback)(current, total, message);
    }

    /// Report progress of a sub-task occupying step `stage` of `stages`.
    ///
    /// The sub-task's `[0, sub_total]` range is mapped onto
    /// `[stage, stage + 1]`, scaled by 1000 to stay in integers.
    #[inline]
    pub fn report_sub(
        &self,
        sub_current: usize,
        sub_total: usize,
        stage: usize,
        stages: usize,
        message: &str,
    ) {
        if sub_total == 0 || stages == 0 {
            return;
        }
        let within = (sub_current.min(sub_total) * 1000) / sub_total;
        (self.callback)(stage * 1000 + within, stages * 1000, message);
    }

    /// Create a no-op progress reporter that discards all updates.
    pub fn none() -> Self {
        Self::new(|_, _, _| {})
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_report_sub_scales_into_stage() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |c, t, _| sink.lock().unwrap().push((c, t)));

        progress.report_sub(1, 4, 2, 5, "solving");
        progress.report_sub(9, 4, 2, 5, "solving");
        progress.report_sub(1, 0, 2, 5, "ignored");

        assert_eq!(*seen.lock().unwrap(), vec![(2250, 5000), (3000, 5000)]);
    }
}
