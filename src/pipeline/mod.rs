//! Media consolidation pipeline
//!
//! ```text
//! item ──► Consolidator ──[idle timeout]──► Processor ──► output stream
//!          (merge or pass through)          (blocking analysis call)
//! ```
//!
//! Three concurrently active tasks, each internally single-threaded: the
//! ingestion caller, the consolidator actor, and the processor worker. All
//! cross-task communication is a capacity-1 channel handoff: the sender
//! blocks until the receiver has taken the previous value, which is the sole
//! backpressure mechanism. A slow analysis call throttles the consolidator,
//! which throttles ingestion.
//!
//! Per-group state machine:
//!
//! ```text
//! CREATED ──► ACCUMULATING ⟲ ──[idle timeout]──► HANDED_OFF
//!         ──► PROCESSED[success|error] ──► DISPATCHED
//! ```
//!
//! Standalone items skip ACCUMULATING and go straight to HANDED_OFF.

mod consolidator;
mod processor;

pub use consolidator::GroupTable;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::analysis::Analyzer;
use crate::config::PipelineConfig;
use crate::stats::UsageStats;
use crate::types::{MediaGroup, MediaItem};

use consolidator::Consolidator;
use processor::Processor;

/// Submitting to a pipeline whose tasks have already exited.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pipeline is shut down; item rejected")]
pub struct PipelineClosed;

/// Spawns and wires the consolidator and processor tasks.
pub struct MediaPipeline;

impl MediaPipeline {
    /// Spawn the pipeline. Returns the submission/shutdown handle and the
    /// output stream of finished groups.
    ///
    /// The caller owns the output receiver and must drain it: the processor
    /// blocks on emission until the previous group is consumed.
    pub fn spawn(
        analyzer: Arc<dyn Analyzer>,
        config: PipelineConfig,
        stats: Arc<UsageStats>,
        cancel: CancellationToken,
    ) -> (PipelineHandle, mpsc::Receiver<MediaGroup>) {
        let (input_tx, input_rx) = mpsc::channel(1);
        let (handoff_tx, handoff_rx) = mpsc::channel(1);
        let (output_tx, output_rx) = mpsc::channel(1);

        let consolidator = Consolidator::new(
            input_rx,
            handoff_tx,
            config.tick_interval(),
            config.idle_threshold(),
            cancel.clone(),
            Arc::clone(&stats),
        );
        let processor = Processor::new(
            handoff_rx,
            output_tx,
            analyzer,
            cancel.clone(),
            config.shutdown_grace(),
            stats,
        );

        let handle = PipelineHandle {
            input_tx,
            cancel,
            consolidator: tokio::spawn(consolidator.run()),
            processor: tokio::spawn(processor.run()),
        };
        (handle, output_rx)
    }
}

/// Submission and lifecycle handle for a running pipeline.
pub struct PipelineHandle {
    input_tx: mpsc::Sender<MediaItem>,
    cancel: CancellationToken,
    consolidator: JoinHandle<()>,
    processor: JoinHandle<()>,
}

impl PipelineHandle {
    /// Submit one media item.
    ///
    /// Blocks while the consolidator is busy or stalled behind a handoff;
    /// this is the backpressure path, not an error.
    pub async fn submit(&self, item: MediaItem) -> Result<(), PipelineClosed> {
        self.input_tx.send(item).await.map_err(|_| PipelineClosed)
    }

    /// Graceful completion after the ingestion source is exhausted: closes
    /// the input, lets the consolidator force-flush everything it still
    /// tracks, and waits for the processor to finish (unbounded calls, as in
    /// steady state).
    pub async fn finish(self) {
        drop(self.input_tx);
        Self::join(self.consolidator, self.processor).await;
    }

    /// Cancel-and-drain shutdown: stops intake, force-flushes every tracked
    /// group, and bounds each remaining analysis call with the configured
    /// grace period. Bounded overall by roughly grace × groups remaining.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.input_tx);
        Self::join(self.consolidator, self.processor).await;
    }

    async fn join(consolidator: JoinHandle<()>, processor: JoinHandle<()>) {
        if consolidator.await.is_err() {
            debug!("consolidator task panicked or was cancelled");
        }
        if processor.await.is_err() {
            debug!("processor task panicked or was cancelled");
        }
    }
}
