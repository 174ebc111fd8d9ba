//! Parser and entry-processor contracts.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Output of the feed-format parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_url: Option<String>,
    pub items: Vec<ParsedItem>,
    pub ttl: TtlHints,
    pub hub_url: Option<String>,
    pub self_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Polling hints a feed declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlHints {
    /// RSS `<ttl>`, in minutes.
    pub ttl_minutes: Option<i32>,
    /// `sy:updatePeriod`: hourly, daily, weekly, monthly or yearly.
    pub update_period: Option<String>,
    /// `sy:updateFrequency`: times per period.
    pub update_frequency: Option<i32>,
}

/// Context handed to the entry processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryProcessingContext {
    pub fetched_at: DateTime<Utc>,
    pub previous_update_watermark: Option<DateTime<Utc>>,
}

/// Result of diffing parsed items against stored entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntryChanges {
    pub new_count: u32,
    pub updated_count: u32,
    pub unchanged_count: u32,
    pub disappeared_count: u32,
    pub has_changes: bool,
}
