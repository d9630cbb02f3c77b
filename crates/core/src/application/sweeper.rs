// Sweep Runner - drives the dispatch cycle on a fixed interval

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::application::dispatch::{DispatchCycle, SweepReport};
use crate::application::ShutdownToken;
use crate::error::Result;
use crate::port::TimeProvider;

/// Hosts the dispatch cycle
///
/// Interval sweeps and manual sweeps share one lock, so two sweeps never
/// overlap.
pub struct SweepRunner {
    cycle: DispatchCycle,
    time_provider: Arc<dyn TimeProvider>,
    interval: Duration,
    running: Mutex<()>,
}

impl SweepRunner {
    pub fn new(cycle: DispatchCycle, time_provider: Arc<dyn TimeProvider>, interval: Duration) -> Self {
        Self {
            cycle,
            time_provider,
            interval,
            running: Mutex::new(()),
        }
    }

    /// Run one sweep now (waits for an in-progress sweep to finish first)
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        self.sweep(&ShutdownToken::never()).await
    }

    async fn sweep(&self, shutdown: &ShutdownToken) -> Result<SweepReport> {
        let _guard = self.running.lock().await;
        let now = self.time_provider.now();

        let report = self.cycle.run_once(now, shutdown).await?;
        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failure_count(),
                "Sweep completed"
            );
        }
        Ok(report)
    }

    /// Sweep every interval until shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(interval_secs = self.interval.as_secs(), "Sweep runner started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait() => {
                    info!("Sweep runner interrupted while idle");
                    break;
                }
            }

            if shutdown.is_shutdown() {
                break;
            }

            if let Err(e) = self.sweep(&shutdown).await {
                // Query failures are transient; the next tick retries
                error!(error = %e, "Sweep failed");
            }
        }

        info!("Sweep runner stopped");
        Ok(())
    }
}
