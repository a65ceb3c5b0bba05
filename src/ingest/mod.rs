//! Item source abstraction for media ingestion.
//!
//! Provides a unified trait for reading media items from different sources:
//! stdin (JSON lines) for live piping from a gateway adapter, and files
//! (JSON lines) for replay. The chat gateway itself (largest-variant
//! resolution, download URLs, reconnection) is an external collaborator;
//! these sources consume its already-resolved wire records.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{MediaItem, RawMediaItem};

/// Events produced by an item source.
pub enum ItemEvent {
    /// A valid media item was read.
    Item(MediaItem),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where media items come from.
///
/// Implementations handle format parsing and pacing internally. The
/// ingestion loop calls [`next_item`](ItemSource::next_item) in a `select!`
/// with cancellation.
#[async_trait]
pub trait ItemSource: Send + 'static {
    /// Read the next item from the source.
    ///
    /// Returns `ItemEvent::Eof` when no more data is available.
    /// Returns `Err` on unrecoverable errors.
    async fn next_item(&mut self) -> Result<ItemEvent>;

    /// Human-readable name for logging (e.g. "stdin", "replay").
    fn source_name(&self) -> &str;
}

/// Parse one wire-format line; `None` for blank or malformed lines.
fn parse_line(line: &str) -> Option<MediaItem> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<RawMediaItem>(line) {
        Ok(raw) => Some(raw.into()),
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed ingestion line");
            None
        }
    }
}

// ============================================================================
// Stdin Source (JSON media items, one per line)
// ============================================================================

/// Reads JSON-formatted wire records from stdin.
///
/// Used with a gateway adapter: `gateway-adapter | mealsnap`
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(2048),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemSource for StdinSource {
    async fn next_item(&mut self) -> Result<ItemEvent> {
        use tokio::io::AsyncBufReadExt;
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(ItemEvent::Eof);
            }
            if let Some(item) = parse_line(&self.line_buffer) {
                return Ok(ItemEvent::Item(item));
            }
            // Skip malformed lines and keep reading
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// Replay Source (JSON-lines file)
// ============================================================================

/// Replays pre-loaded media items with optional inter-item delay.
///
/// Useful for demos and for exercising the consolidation timing against a
/// recorded stream.
pub struct ReplaySource {
    items: std::vec::IntoIter<MediaItem>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    /// Load every parseable line of a JSON-lines file.
    pub fn load(path: &std::path::Path, delay_ms: u64) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let items: Vec<MediaItem> = raw.lines().filter_map(parse_line).collect();
        Ok(Self {
            items: items.into_iter(),
            delay_ms,
            yielded_first: false,
        })
    }
}

#[async_trait]
impl ItemSource for ReplaySource {
    async fn next_item(&mut self) -> Result<ItemEvent> {
        // Delay between items, skipping the delay before the first one.
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.items.next() {
            Some(item) => {
                self.yielded_first = true;
                Ok(ItemEvent::Item(item))
            }
            None => Ok(ItemEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}
