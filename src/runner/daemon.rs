//! Background round loop guarded by a single-instance lock file.
//!
//! Each cycle tries to take the lock. If another process holds it the cycle
//! is skipped; otherwise one full round runs and the lock is released. A
//! failing round is logged and the loop carries on at the next interval.

use crate::runner::lock::InstanceLock;
use crate::runner::round::RoundRunner;
use crate::simulator::PerformanceSource;
use rand::Rng;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonSummary {
    pub cycles: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
}

pub struct Daemon<S> {
    runner: RoundRunner<S>,
    lock_path: PathBuf,
    interval: Duration,
    max_cycles: Option<u64>,
}

impl<S: PerformanceSource> Daemon<S> {
    pub fn new(runner: RoundRunner<S>, lock_path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            runner,
            lock_path: lock_path.into(),
            interval,
            max_cycles: None,
        }
    }

    /// Stop after this many cycles instead of running until shutdown.
    pub fn with_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = Some(max_cycles);
        self
    }

    pub async fn run<R: Rng, F: Future<Output = ()>>(
        &mut self,
        rng: &mut R,
        shutdown: F,
    ) -> DaemonSummary {
        tokio::pin!(shutdown);
        let mut summary = DaemonSummary::default();
        info!(
            interval_secs = self.interval.as_secs_f64(),
            lock = %self.lock_path.display(),
            "daemon started"
        );

        loop {
            summary.cycles += 1;
            self.cycle(rng, &mut summary);

            if self.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(
            cycles = summary.cycles,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            "daemon stopped"
        );
        summary
    }

    fn cycle<R: Rng>(&mut self, rng: &mut R, summary: &mut DaemonSummary) {
        let lock = match InstanceLock::try_acquire(&self.lock_path) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                info!(
                    lock = %self.lock_path.display(),
                    "another instance is running, skipping cycle"
                );
                summary.skipped += 1;
                return;
            }
            Err(e) => {
                error!(error = %e, "could not acquire lock");
                summary.failed += 1;
                return;
            }
        };

        match self.runner.run_round(rng) {
            Ok(report) => {
                summary.completed += 1;
                info!(
                    round = report.round,
                    generation = report.generation,
                    grade = %report.grade.grade,
                    "cycle complete"
                );
            }
            Err(e) => {
                summary.failed += 1;
                error!(error = %e, fatal = e.is_fatal(), "round failed, retrying next cycle");
            }
        }

        lock.release();
    }
}
