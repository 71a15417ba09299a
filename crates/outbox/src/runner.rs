//! Repeated relay invocations.

use std::future::Future;
use std::time::Duration;

use futures_util::FutureExt;

use crate::bus::MessageBus;
use crate::error::Result;
use crate::lock::LockProvider;
use crate::processor::OutboxProcessor;
use crate::repository::OutboxRepository;

/// Totals of a [`RelayRunner::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub iterations: u64,
    pub total_processed: usize,
}

/// Calls the processor in a loop.
///
/// With `iterations == 0` it runs until the shutdown future resolves. After a
/// batch that processed nothing it waits `delay`, unless that was the last
/// iteration.
#[derive(Debug)]
pub struct RelayRunner<R, B, L> {
    processor: OutboxProcessor<R, B, L>,
    batch_size: usize,
    iterations: u64,
    delay: Duration,
}

impl<R, B, L> RelayRunner<R, B, L>
where
    R: OutboxRepository,
    B: MessageBus,
    L: LockProvider,
{
    pub fn new(
        processor: OutboxProcessor<R, B, L>,
        batch_size: usize,
        iterations: u64,
        delay: Duration,
    ) -> Self {
        Self {
            processor,
            batch_size,
            iterations,
            delay,
        }
    }

    pub fn processor(&self) -> &OutboxProcessor<R, B, L> {
        &self.processor
    }

    /// Runs until the iteration budget is spent or `shutdown` resolves.
    ///
    /// A batch already in flight when shutdown arrives is finished first, so
    /// the lock is never abandoned mid-batch. The first processor error ends
    /// the run.
    pub async fn run<F>(&self, shutdown: F) -> Result<RelaySummary>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut summary = RelaySummary::default();
        tracing::info!(
            batch_size = self.batch_size,
            iterations = self.iterations,
            delay_secs = self.delay.as_secs_f64(),
            "starting outbox relay"
        );

        loop {
            summary.iterations += 1;
            let processed = self.processor.process_outbox_events(self.batch_size).await?;
            summary.total_processed += processed;
            tracing::info!(
                batch = summary.iterations,
                processed,
                total_processed = summary.total_processed,
                "processed outbox batch"
            );

            let more = self.iterations == 0 || summary.iterations < self.iterations;
            if !more {
                break;
            }

            if processed == 0 {
                tracing::debug!(delay_secs = self.delay.as_secs_f64(), "no events, waiting");
                tokio::select! {
                    () = &mut shutdown => break,
                    () = tokio::time::sleep(self.delay) => {}
                }
            } else if (&mut shutdown).now_or_never().is_some() {
                break;
            }
        }

        tracing::info!(
            iterations = summary.iterations,
            total_processed = summary.total_processed,
            "outbox relay finished"
        );
        Ok(summary)
    }
}
