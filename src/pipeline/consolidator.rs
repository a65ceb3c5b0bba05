//! Consolidator - the grouping engine that merges album items and decides
//! when a group is complete.
//!
//! Split in two layers:
//! - [`GroupTable`]: the pure merge/flush core. No channels, no clock of its
//!   own; every operation takes `now` explicitly, so the decision logic is
//!   unit-testable without a runtime.
//! - [`Consolidator`]: the actor loop that owns a `GroupTable` and drives it
//!   from exactly two triggers, "item arrived" and "timer fired", via
//!   `select!`. The table is reachable only through this task, so it needs
//!   no locking.
//!
//! The handoff to the processor is a capacity-1 channel send awaited inside
//! the actor: while a handoff is blocked, no further items are merged and no
//! ticks are processed, and the stall propagates backward into ingestion.

use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::stats::UsageStats;
use crate::types::{GroupKey, MediaGroup, MediaItem};

// ============================================================================
// Group Table
// ============================================================================

/// In-flight album entry: the group under construction plus the monotonic
/// instant of its last merge (wall-clock `group.last_update` is for
/// reporting; idle decisions use the monotonic clock).
#[derive(Debug)]
struct PendingEntry {
    group: MediaGroup,
    last_update: Instant,
}

/// Mapping from album identifier to its in-progress group.
///
/// Insertion-ordered, so simultaneously-due groups flush oldest-created
/// first: deterministic rather than left to hash iteration order.
#[derive(Debug, Default)]
pub struct GroupTable {
    entries: IndexMap<String, PendingEntry>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Merge one item.
    ///
    /// Standalone items bypass the table entirely: the singleton group is
    /// returned for immediate handoff. Album items either seed a new entry
    /// or append to the existing one; `chat_id` and `caption` stay fixed
    /// from the seeding item, and `reply_to` is adopted only while absent.
    pub fn submit(&mut self, item: MediaItem, now: Instant) -> Option<MediaGroup> {
        let album_id = match &item.key {
            GroupKey::Standalone => return Some(MediaGroup::seeded_from(item)),
            GroupKey::Grouped(id) => id.clone(),
        };

        match self.entries.get_mut(&album_id) {
            Some(entry) => {
                entry.group.urls.push(item.url);
                entry.group.last_update = chrono::Utc::now();
                entry.last_update = now;
                if entry.group.reply_to.is_none() {
                    entry.group.reply_to = item.reply_to;
                }
            }
            None => {
                self.entries.insert(
                    album_id,
                    PendingEntry {
                        group: MediaGroup::seeded_from(item),
                        last_update: now,
                    },
                );
            }
        }
        None
    }

    /// Remove and return every group idle for at least `threshold`,
    /// oldest-created first.
    pub fn take_idle(&mut self, now: Instant, threshold: Duration) -> Vec<MediaGroup> {
        let due: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_update) >= threshold)
            .map(|(id, _)| id.clone())
            .collect();

        due.into_iter()
            .filter_map(|id| self.entries.shift_remove(&id))
            .map(|entry| entry.group)
            .collect()
    }

    /// Remove and return every tracked group regardless of idle state,
    /// oldest-created first. Used by the shutdown drain.
    pub fn drain(&mut self) -> Vec<MediaGroup> {
        self.entries
            .drain(..)
            .map(|(_, entry)| entry.group)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Consolidator Actor
// ============================================================================

/// Owns the group table and the idle timer; feeds the processor.
pub(crate) struct Consolidator {
    input_rx: mpsc::Receiver<MediaItem>,
    handoff_tx: mpsc::Sender<MediaGroup>,
    table: GroupTable,
    tick_interval: Duration,
    idle_threshold: Duration,
    cancel: CancellationToken,
    stats: Arc<UsageStats>,
}

impl Consolidator {
    pub(crate) fn new(
        input_rx: mpsc::Receiver<MediaItem>,
        handoff_tx: mpsc::Sender<MediaGroup>,
        tick_interval: Duration,
        idle_threshold: Duration,
        cancel: CancellationToken,
        stats: Arc<UsageStats>,
    ) -> Self {
        Self {
            input_rx,
            handoff_tx,
            table: GroupTable::new(),
            tick_interval,
            idle_threshold,
            cancel,
            stats,
        }
    }

    /// Run until cancellation or until the ingestion side closes the input
    /// channel, then force-flush everything still tracked. The handoff
    /// sender drops when this returns, which is what lets the processor
    /// finish its own drain.
    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut input_closed = false;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("consolidator received shutdown signal");
                    break;
                }
                maybe_item = self.input_rx.recv() => match maybe_item {
                    Some(item) => {
                        if !self.on_item(item).await {
                            return;
                        }
                    }
                    None => {
                        debug!("ingestion input closed");
                        input_closed = true;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.on_tick().await {
                        return;
                    }
                }
            }
        }

        // Cancellation path: items already accepted into the input buffer
        // were submitted successfully and must not be lost. The shutdown
        // caller drops the input sender, so this recv loop terminates once
        // the buffer is absorbed.
        if !input_closed {
            while let Some(item) = self.input_rx.recv().await {
                if !self.on_item(item).await {
                    return;
                }
            }
        }

        self.drain().await;
    }

    /// Merge one arrival; standalone items go straight to handoff.
    ///
    /// Returns false when the processor side is gone.
    async fn on_item(&mut self, item: MediaItem) -> bool {
        self.stats.record_item();
        debug!(key = %item.key, chat = item.chat_id, "received media item");

        if let Some(group) = self.table.submit(item, Instant::now()) {
            self.stats.record_singleton();
            info!(chat = group.chat_id, "consolidating single image");
            return self.handoff(group).await;
        }
        true
    }

    /// Flush every group idle past the threshold.
    async fn on_tick(&mut self) -> bool {
        let now = Instant::now();
        for group in self.table.take_idle(now, self.idle_threshold) {
            self.stats.record_flush();
            info!(
                album = %group.key,
                images = group.urls.len(),
                "consolidating group"
            );
            if !self.handoff(group).await {
                return false;
            }
        }
        true
    }

    /// Shutdown drain: hand off every tracked group, bypassing the idle
    /// check, so nothing submitted is silently lost.
    async fn drain(mut self) {
        let remaining = self.table.len();
        if remaining > 0 {
            info!(groups = remaining, "force-flushing in-flight groups for shutdown");
        }
        for group in self.table.drain() {
            self.stats.record_drained();
            if !self.handoff(group).await {
                return;
            }
        }
    }

    /// Synchronous handoff: blocks until the processor takes the group.
    /// Returns false when the processor side is gone.
    async fn handoff(&self, group: MediaGroup) -> bool {
        self.handoff_tx.send(group).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupKey;

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
            chat_id: 100,
            caption: "solo".to_string(),
            url: url.to_string(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn standalone_items_bypass_the_table() {
        let mut table = GroupTable::new();
        let now = Instant::now();

        let group = table
            .submit(standalone_item("u1"), now)
            .expect("standalone should pass through");
        assert_eq!(group.urls, vec!["u1".to_string()]);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn album_items_merge_in_arrival_order() {
        let mut table = GroupTable::new();
        let now = Instant::now();

        assert!(table.submit(album_item("g1", "lunch", "u1", None), now).is_none());
        assert!(table.submit(album_item("g1", "ignored", "u2", None), now).is_none());
        assert!(table.submit(album_item("g1", "", "u3", None), now).is_none());
        assert_eq!(table.len(), 1);

        let flushed = table.take_idle(now + Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(flushed.len(), 1);
        let group = &flushed[0];
        assert_eq!(group.urls, vec!["u1", "u2", "u3"]);
        // Caption fixed from the seeding item, later captions ignored.
        assert_eq!(group.caption, "lunch");
        assert_eq!(group.chat_id, 100);
    }

    #[tokio::test]
    async fn reply_target_adopted_from_first_item_that_has_one() {
        let mut table = GroupTable::new();
        let now = Instant::now();

        table.submit(album_item("g1", "lunch", "u1", None), now);
        table.submit(album_item("g1", "", "u2", Some(42)), now);
        table.submit(album_item("g1", "", "u3", Some(99)), now);

        let flushed = table.take_idle(now + Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(flushed[0].reply_to, Some(42));
    }

    #[tokio::test]
    async fn fresh_items_reset_the_idle_clock() {
        let mut table = GroupTable::new();
        let t0 = Instant::now();
        let threshold = Duration::from_secs(1);

        table.submit(album_item("g1", "lunch", "u1", None), t0);

        // Second item 800ms later keeps the group alive past t0 + 1s.
        let t1 = t0 + Duration::from_millis(800);
        table.submit(album_item("g1", "", "u2", None), t1);
        assert!(table.take_idle(t0 + Duration::from_millis(1100), threshold).is_empty());

        // Idle past the threshold from the *last* update flushes it.
        let flushed = table.take_idle(t1 + threshold, threshold);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].urls.len(), 2);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn idle_boundary_is_inclusive() {
        let mut table = GroupTable::new();
        let t0 = Instant::now();
        let threshold = Duration::from_secs(1);

        table.submit(album_item("g1", "lunch", "u1", None), t0);
        assert!(table
            .take_idle(t0 + Duration::from_millis(999), threshold)
            .is_empty());
        assert_eq!(table.take_idle(t0 + threshold, threshold).len(), 1);
    }

    #[tokio::test]
    async fn simultaneously_due_groups_flush_oldest_first() {
        let mut table = GroupTable::new();
        let t0 = Instant::now();

        table.submit(album_item("older", "a", "u1", None), t0);
        table.submit(album_item("newer", "b", "u2", None), t0 + Duration::from_millis(10));

        let flushed = table.take_idle(t0 + Duration::from_secs(2), Duration::from_secs(1));
        let keys: Vec<String> = flushed.iter().map(|g| g.key.to_string()).collect();
        assert_eq!(keys, vec!["older", "newer"]);
    }

    #[tokio::test]
    async fn drain_returns_everything_oldest_first() {
        let mut table = GroupTable::new();
        let now = Instant::now();

        table.submit(album_item("g1", "a", "u1", None), now);
        table.submit(album_item("g2", "b", "u2", None), now);
        table.submit(album_item("g1", "", "u3", None), now);

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].key.to_string(), "g1");
        assert_eq!(drained[0].urls.len(), 2);
        assert_eq!(drained[1].key.to_string(), "g2");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn distinct_albums_never_merge() {
        let mut table = GroupTable::new();
        let now = Instant::now();

        table.submit(album_item("g1", "a", "u1", None), now);
        table.submit(album_item("g2", "b", "u2", None), now);
        assert_eq!(table.len(), 2);

        let flushed = table.take_idle(now + Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].urls, vec!["u1"]);
        assert_eq!(flushed[1].urls, vec!["u2"]);
    }
}
