// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress reporting for long-running operations.
//!
//! A [`ProgressReporter`] is handed to the code executing a job; observers
//! watch the paired [`ProgressStream`]. Reports are clamped to [0, 100]
//! and regressions drop to the floor (the stored value never decreases).

use tokio::sync::watch;

/// Writer half. Cheap to clone; all clones feed the same stream.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<u8>,
}

/// Reader half for progress observers.
pub type ProgressStream = watch::Receiver<u8>;

impl ProgressReporter {
    pub fn new() -> (Self, ProgressStream) {
        let (tx, rx) = watch::channel(0);
        (Self { tx }, rx)
    }

    /// Report completion percentage. Values above 100 clamp; values below
    /// the current floor are ignored.
    pub fn report(&self, pct: u8) {
        let pct = pct.min(100);
        self.tx.send_if_modified(|current| {
            if pct > *current {
                *current = pct;
                true
            } else {
                false
            }
        });
    }

    /// Scale a sub-operation's 0–100 reports into the [base, base+span]
    /// window of the parent operation.
    pub fn stage(&self, base: u8, span: u8) -> StageReporter {
        StageReporter { inner: self.clone(), base, span }
    }

    pub fn current(&self) -> u8 {
        *self.tx.borrow()
    }
}

/// Reporter that maps 0–100 into a window of the parent reporter.
#[derive(Clone)]
pub struct StageReporter {
    inner: ProgressReporter,
    base: u8,
    span: u8,
}

impl StageReporter {
    pub fn report(&self, pct: u8) {
        let pct = pct.min(100) as u32;
        let scaled = self.base as u32 + pct * self.span as u32 / 100;
        self.inner.report(scaled.min(100) as u8);
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
