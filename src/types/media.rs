//! Media item and group types carried through the consolidation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisError;

use super::NutritionReport;

/// Grouping key for a media item.
///
/// The upstream wire format signals "do not group" with an empty string.
/// That sentinel is converted to an explicit variant once, at the ingestion
/// boundary, so the rest of the pipeline never has to reason about
/// accidentally-empty identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    /// Item arrived outside any album. Never merged, flushed immediately.
    Standalone,
    /// Opaque album identifier correlating items into one group.
    Grouped(String),
}

impl GroupKey {
    /// Convert the wire-format identifier: empty string means "do not group".
    pub fn from_raw(raw: &str) -> Self {
        if raw.is_empty() {
            GroupKey::Standalone
        } else {
            GroupKey::Grouped(raw.to_string())
        }
    }

    /// The album identifier, if this key belongs to an album.
    pub fn album_id(&self) -> Option<&str> {
        match self {
            GroupKey::Standalone => None,
            GroupKey::Grouped(id) => Some(id.as_str()),
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Standalone => write!(f, "standalone"),
            GroupKey::Grouped(id) => write!(f, "{}", id),
        }
    }
}

/// One physical media arrival from the upstream chat source.
///
/// Transient: consumed synchronously by the consolidator and never stored
/// beyond the merge it triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    /// Grouping key (album or standalone).
    pub key: GroupKey,
    /// Destination chat identifier.
    pub chat_id: i64,
    /// Caption text, may be empty.
    pub caption: String,
    /// Content URL for the media payload. Assumed non-empty upstream.
    pub url: String,
    /// Message to reply to when delivering the result.
    pub reply_to: Option<i64>,
}

/// Wire-format ingestion record, as emitted by the upstream gateway.
///
/// Carries the raw sentinels (`""` group id, `0` reply target) that
/// [`MediaItem`] replaces with explicit types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMediaItem {
    #[serde(default)]
    pub group_id: String,
    pub chat_id: i64,
    #[serde(default)]
    pub caption: String,
    pub url: String,
    #[serde(default)]
    pub reply_to: i64,
}

impl From<RawMediaItem> for MediaItem {
    fn from(raw: RawMediaItem) -> Self {
        MediaItem {
            key: GroupKey::from_raw(&raw.group_id),
            chat_id: raw.chat_id,
            caption: raw.caption,
            url: raw.url,
            reply_to: if raw.reply_to == 0 {
                None
            } else {
                Some(raw.reply_to)
            },
        }
    }
}

/// Outcome of the analysis call for a completed group.
///
/// A processed group carries exactly one of result/error; the enum makes
/// that hold by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisOutcome {
    /// The analyzer produced a structured nutrition estimate.
    Report(NutritionReport),
    /// The analysis call failed; the group is still delivered.
    Failed(AnalysisError),
}

/// One logical album, under construction or completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaGroup {
    /// Grouping key this album was accumulated under.
    pub key: GroupKey,
    /// Destination chat identifier, fixed from the first item.
    pub chat_id: i64,
    /// Caption, fixed from the first item.
    pub caption: String,
    /// Content URLs in arrival order. Append-only while accumulating.
    pub urls: Vec<String>,
    /// Wall-clock time of the most recent merge.
    pub last_update: DateTime<Utc>,
    /// Reply target, fixed from the first item that supplied one.
    pub reply_to: Option<i64>,
    /// Set exactly once by the processor; `None` while in flight.
    pub outcome: Option<AnalysisOutcome>,
}

impl MediaGroup {
    /// Seed a new group from its first item.
    pub fn seeded_from(item: MediaItem) -> Self {
        MediaGroup {
            key: item.key,
            chat_id: item.chat_id,
            caption: item.caption,
            urls: vec![item.url],
            last_update: Utc::now(),
            reply_to: item.reply_to,
            outcome: None,
        }
    }

    /// The nutrition report, if analysis succeeded.
    pub fn report(&self) -> Option<&NutritionReport> {
        match &self.outcome {
            Some(AnalysisOutcome::Report(report)) => Some(report),
            _ => None,
        }
    }

    /// The analysis error, if analysis failed.
    pub fn error(&self) -> Option<&AnalysisError> {
        match &self.outcome {
            Some(AnalysisOutcome::Failed(err)) => Some(err),
            _ => None,
        }
    }
}
