//! End-to-end pipeline tests
//!
//! Exercises the full consolidator -> processor -> output path with paused
//! tokio time, so the 1-second consolidation timers run deterministically
//! and instantly. The analyzer is the fixture (instant canned results, with
//! a caption marker to force failures) or a hanging analyzer that never
//! returns, for the backpressure and shutdown-grace scenarios.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;
use mealsnap::analysis::{AnalysisError, Analyzer, FixtureAnalyzer};
use mealsnap::config::PipelineConfig;
use mealsnap::pipeline::{MediaPipeline, PipelineHandle};
use mealsnap::stats::UsageStats;
use mealsnap::types::{GroupKey, MediaGroup, MediaItem, NutritionReport};

// ============================================================================
// Helpers
// ============================================================================

/// Analyzer whose calls never return. Used to simulate a stalled external
/// collaborator.
struct HangingAnalyzer;

#[async_trait]
impl Analyzer for HangingAnalyzer {
    async fn analyze(
        &self,
        _caption: &str,
        _image_urls: &[String],
    ) -> Result<NutritionReport, AnalysisError> {
        std::future::pending().await
    }

    fn analyzer_name(&self) -> &str {
        "hanging"
    }
}

fn album_item(album: &str, caption: &str, url: &str, reply_to: Option<i64>) -> MediaItem {
    MediaItem {
        key: GroupKey::Grouped(album.to_string()),
        chat_id: 100,
        caption: caption.to_string(),
        url: url.to_string(),
        reply_to,
    }
}

fn standalone_item(url: &str) -> MediaItem {
    MediaItem {
        key: GroupKey::Standalone,
        chat_id: 200,
        caption: "single".to_string(),
        url: url.to_string(),
        reply_to: None,
    }
}

/// 1 s tick, 1 s idle threshold, 5 s shutdown grace (the design defaults).
fn test_config() -> PipelineConfig {
    PipelineConfig {
        tick_interval_ms: 1000,
        idle_threshold_ms: 1000,
        shutdown_grace_ms: 5000,
    }
}

type SpawnedPipeline = (
    PipelineHandle,
    mpsc::Receiver<MediaGroup>,
    Arc<UsageStats>,
);

fn spawn_pipeline(analyzer: Arc<dyn Analyzer>) -> SpawnedPipeline {
    let stats = UsageStats::new();
    let (handle, output_rx) = MediaPipeline::spawn(
        analyzer,
        test_config(),
        Arc::clone(&stats),
        CancellationToken::new(),
    );
    (handle, output_rx, stats)
}

// ============================================================================
// Consolidation Properties
// ============================================================================

#[tokio::test(start_paused = true)]
async fn album_merges_in_submission_order_and_flushes_exactly_once() {
    let (handle, mut output, stats) = spawn_pipeline(Arc::new(FixtureAnalyzer::new()));

    handle
        .submit(album_item("g1", "lunch", "u1", None))
        .await
        .expect("submit A");
    sleep(Duration::from_millis(200)).await;
    handle
        .submit(album_item("g1", "ignored caption", "u2", None))
        .await
        .expect("submit B");

    // Flush latency is bounded by threshold + one tick period.
    let group = timeout(Duration::from_secs(3), output.recv())
        .await
        .expect("group should flush within two tick periods")
        .expect("output stream open");
    assert_eq!(group.urls, vec!["u1".to_string(), "u2".to_string()]);
    assert_eq!(group.caption, "lunch");
    assert_eq!(group.chat_id, 100);
    assert!(group.report().is_some());

    // No duplicate emission for the same album.
    assert!(
        timeout(Duration::from_secs(3), output.recv()).await.is_err(),
        "group must be flushed exactly once"
    );

    handle.finish().await;
    assert!(output.recv().await.is_none());
    assert_eq!(stats.snapshot().groups_flushed, 1);
}

#[tokio::test(start_paused = true)]
async fn standalone_item_bypasses_the_timer() {
    let (handle, mut output, stats) = spawn_pipeline(Arc::new(FixtureAnalyzer::new()));

    handle
        .submit(standalone_item("u3"))
        .await
        .expect("submit standalone");

    // Well under one tick period: the singleton must not wait for the timer.
    let group = timeout(Duration::from_millis(10), output.recv())
        .await
        .expect("standalone must be handed off without a tick")
        .expect("output stream open");
    assert_eq!(group.urls, vec!["u3".to_string()]);
    assert_eq!(group.key, GroupKey::Standalone);

    handle.finish().await;
    assert_eq!(stats.snapshot().singletons_passed, 1);
}

#[tokio::test(start_paused = true)]
async fn reply_target_is_first_one_supplied() {
    let (handle, mut output, _stats) = spawn_pipeline(Arc::new(FixtureAnalyzer::new()));

    handle
        .submit(album_item("g1", "lunch", "u1", None))
        .await
        .expect("submit");
    handle
        .submit(album_item("g1", "", "u2", Some(42)))
        .await
        .expect("submit");
    handle
        .submit(album_item("g1", "", "u3", Some(99)))
        .await
        .expect("submit");

    let group = output.recv().await.expect("group should flush");
    assert_eq!(group.reply_to, Some(42));
    handle.finish().await;
}

#[tokio::test(start_paused = true)]
async fn analysis_failure_is_isolated_and_flush_order_is_oldest_first() {
    let (handle, mut output, stats) = spawn_pipeline(Arc::new(FixtureAnalyzer::new()));

    handle
        .submit(album_item(
            "g2",
            &format!("bad {}", FixtureAnalyzer::FAIL_MARKER),
            "u4",
            None,
        ))
        .await
        .expect("submit failing album");
    handle
        .submit(album_item("g3", "fine", "u5", None))
        .await
        .expect("submit healthy album");

    // Both become idle together; the older album (g2) flushes first.
    let first = output.recv().await.expect("first group");
    assert_eq!(first.key.to_string(), "g2");
    assert!(first.report().is_none());
    assert!(matches!(first.error(), Some(AnalysisError::Http(_))));

    let second = output.recv().await.expect("second group");
    assert_eq!(second.key.to_string(), "g3");
    assert!(second.report().is_some());
    assert!(second.error().is_none());

    handle.finish().await;
    assert_eq!(stats.snapshot().analysis_failures, 1);
}

// ============================================================================
// Shutdown Properties
// ============================================================================

#[tokio::test(start_paused = true)]
async fn shutdown_force_flushes_accumulating_groups() {
    let (handle, mut output, stats) = spawn_pipeline(Arc::new(FixtureAnalyzer::new()));

    handle
        .submit(album_item("g4", "dinner", "u6", None))
        .await
        .expect("submit");
    // Well before the idle threshold elapses.
    sleep(Duration::from_millis(100)).await;
    handle.shutdown().await;

    let group = output.recv().await.expect("drained group must be emitted");
    assert_eq!(group.caption, "dinner");
    assert!(group.report().is_some());
    assert!(output.recv().await.is_none());
    assert_eq!(stats.snapshot().drained_at_shutdown, 1);
}

#[tokio::test(start_paused = true)]
async fn hung_analysis_is_bounded_by_the_shutdown_grace() {
    let (handle, mut output, _stats) = spawn_pipeline(Arc::new(HangingAnalyzer));

    handle
        .submit(standalone_item("u7"))
        .await
        .expect("submit");
    // Let the processor start the (never-returning) call.
    sleep(Duration::from_millis(50)).await;
    handle.shutdown().await;

    let group = output.recv().await.expect("group must not be lost");
    assert!(matches!(
        group.error(),
        Some(AnalysisError::ShutdownGraceExpired)
    ));
    assert!(output.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn stalled_analysis_backpressures_ingestion_without_losing_items() {
    let (handle, mut output, stats) = spawn_pipeline(Arc::new(HangingAnalyzer));

    // s1 is taken by the processor (which hangs), s2 fills the handoff
    // buffer, s3 blocks the consolidator mid-handoff, s4 fills the input
    // buffer. A fifth submission cannot be accepted.
    for url in ["s1", "s2", "s3", "s4"] {
        handle
            .submit(standalone_item(url))
            .await
            .expect("pipeline should accept up to its buffered capacity");
    }
    assert!(
        timeout(Duration::from_secs(2), handle.submit(standalone_item("s5")))
            .await
            .is_err(),
        "submission must block while the pipeline is stalled"
    );

    // Shutdown grace-bounds every remaining call; all four accepted items
    // come out, each with the grace-expired error.
    let collector = tokio::spawn(async move {
        let mut groups = Vec::new();
        while let Some(group) = output.recv().await {
            groups.push(group);
        }
        groups
    });
    handle.shutdown().await;

    let groups = collector.await.expect("collector task");
    let urls: Vec<&str> = groups.iter().map(|g| g.urls[0].as_str()).collect();
    assert_eq!(urls, vec!["s1", "s2", "s3", "s4"]);
    assert!(groups
        .iter()
        .all(|g| matches!(g.error(), Some(AnalysisError::ShutdownGraceExpired))));
    // The fifth item never entered the pipeline.
    assert_eq!(stats.snapshot().items_received, 4);
}
