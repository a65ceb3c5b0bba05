//! Processor - single sequential worker turning completed groups into
//! finished ones.
//!
//! Drains the capacity-1 handoff channel, invokes the analyzer, attaches the
//! outcome, and forwards every group to the output stream exactly once.
//! Strictly one analysis call in flight across all groups: this favors
//! simplicity and cross-group ordering over throughput. A future widening
//! would be a bounded worker pool preserving order only within a group.
//!
//! In steady state no timeout is enforced here: a call that never returns
//! stalls the whole pipeline, including ingestion, through the blocking
//! handoff chain. Once shutdown has begun, each remaining call is bounded by
//! the configured grace period instead, so shutdown completes in bounded
//! time without dropping any group.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisError, Analyzer};
use crate::stats::UsageStats;
use crate::types::{AnalysisOutcome, MediaGroup, NutritionReport};

pub(crate) struct Processor {
    handoff_rx: mpsc::Receiver<MediaGroup>,
    output_tx: mpsc::Sender<MediaGroup>,
    analyzer: Arc<dyn Analyzer>,
    cancel: CancellationToken,
    shutdown_grace: Duration,
    stats: Arc<UsageStats>,
}

impl Processor {
    pub(crate) fn new(
        handoff_rx: mpsc::Receiver<MediaGroup>,
        output_tx: mpsc::Sender<MediaGroup>,
        analyzer: Arc<dyn Analyzer>,
        cancel: CancellationToken,
        shutdown_grace: Duration,
        stats: Arc<UsageStats>,
    ) -> Self {
        Self {
            handoff_rx,
            output_tx,
            analyzer,
            cancel,
            shutdown_grace,
            stats,
        }
    }

    /// Run until the consolidator drops the handoff sender, finishing every
    /// handed-off group first. The output sender drops when this returns,
    /// ending the caller's consume loop.
    pub(crate) async fn run(mut self) {
        while let Some(mut group) = self.handoff_rx.recv().await {
            info!(
                album = %group.key,
                images = group.urls.len(),
                analyzer = self.analyzer.analyzer_name(),
                "analyzing group"
            );

            let outcome = match self.analyze_bounded(&group).await {
                Ok(report) => AnalysisOutcome::Report(report),
                Err(err) => {
                    self.stats.record_analysis_failure();
                    warn!(album = %group.key, error = %err, "analysis failed");
                    AnalysisOutcome::Failed(err)
                }
            };
            group.outcome = Some(outcome);

            if self.output_tx.send(group).await.is_err() {
                debug!("output receiver dropped, stopping processor");
                return;
            }
        }
        debug!("handoff channel closed, processor finished");
    }

    /// Invoke the analyzer. Unbounded in steady state; once shutdown has
    /// begun, the in-flight call gets the remaining grace period and is
    /// abandoned after that.
    async fn analyze_bounded(
        &self,
        group: &MediaGroup,
    ) -> Result<NutritionReport, AnalysisError> {
        let call = self.analyzer.analyze(&group.caption, &group.urls);
        tokio::pin!(call);

        tokio::select! {
            result = &mut call => result,
            _ = self.cancel.cancelled() => {
                debug!(album = %group.key, grace_ms = self.shutdown_grace.as_millis() as u64,
                    "shutdown during analysis, bounding the call");
                match tokio::time::timeout(self.shutdown_grace, &mut call).await {
                    Ok(result) => result,
                    Err(_) => Err(AnalysisError::ShutdownGraceExpired),
                }
            }
        }
    }
}
