//! Progress reporting for trajectory processing (feature `progress`).
//!
//! * [`trajectory_progress`] – A styled [`ProgressBar`] over a number of GPS logs.
//! * [`FileTimer`] – Exponential moving average of per-file processing time, shown in the bar
//!   message so a slow log stands out while workers run in parallel.
//! * [`fmt_dur`] – `"253µs"`, `"42ms"`, `"3.14s"` formatting.
//!
//! The EMA update is `ema ← α·dt + (1–α)·ema`; the first sample initializes it.
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub(crate) fn trajectory_progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total.max(1) as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} logs ({percent:>3}%) | ETA {eta_precise} | {msg}",
    ) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(200));
    pb
}

/// Shared moving average of per-file durations.
pub(crate) struct FileTimer {
    alpha: f64,
    state: Mutex<(f64, u64)>,
}

impl FileTimer {
    pub(crate) fn new(alpha: f64) -> Self {
        Self {
            alpha,
            state: Mutex::new((0.0, 0)),
        }
    }

    /// Record one file duration and return the updated average.
    pub(crate) fn record(&self, dt: Duration) -> Duration {
        let Ok(mut state) = self.state.lock() else {
            return dt;
        };
        let (ema_ns, count) = &mut *state;
        let dt_ns = dt.as_nanos() as f64;
        *count += 1;
        *ema_ns = if *count == 1 {
            dt_ns
        } else {
            self.alpha * dt_ns + (1.0 - self.alpha) * *ema_ns
        };
        Duration::from_nanos(*ema_ns as u64)
    }
}

#[inline]
pub(crate) fn fmt_dur(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        format!("{us}µs")
    } else if d.as_millis() < 1_000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f32())
    }
}
