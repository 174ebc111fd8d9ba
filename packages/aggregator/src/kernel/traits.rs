// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no scheduling logic.
// Scheduling decisions (classification, backoff, redirects) are domain functions
// that call through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseFeedFetcher, BaseFeedParser)

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{FeedId, ImportId, JobId, UserId};
use crate::domains::feeds::{
    EntryChanges, EntryProcessingContext, FetchOutcome, FetchRequest, ParsedFeed,
};
use crate::domains::imports::ImportSummary;
use crate::domains::scoring::TrainingSummary;
use crate::domains::websub::RenewalSummary;
use crate::kernel::jobs::JobType;

// =============================================================================
// Feed Fetching (Infrastructure - HTTP transport)
// =============================================================================

#[async_trait]
pub trait BaseFeedFetcher: Send + Sync {
    /// Fetch a feed with conditional headers.
    ///
    /// Transport failures are reported as outcomes (`NetworkError`, ...), not
    /// as `Err`. An `Err` means the fetcher itself is broken.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome>;
}

// =============================================================================
// Feed Parsing
// =============================================================================

pub trait BaseFeedParser: Send + Sync {
    /// Parse a raw body. Malformed input is an `Err`.
    fn parse(&self, body: &[u8]) -> Result<ParsedFeed>;
}

// =============================================================================
// Entry Diffing
// =============================================================================

#[async_trait]
pub trait BaseEntryProcessor: Send + Sync {
    /// Diff parsed items against stored entries and persist the changes.
    async fn process(
        &self,
        feed_id: FeedId,
        feed: &ParsedFeed,
        context: EntryProcessingContext,
    ) -> Result<EntryChanges>;
}

// =============================================================================
// WebSub
// =============================================================================

#[async_trait]
pub trait BaseWebSubRenewer: Send + Sync {
    /// Renew hub subscriptions whose lease expires within the window.
    async fn renew_expiring_subscriptions(&self, hours_before_expiry: i64)
        -> Result<RenewalSummary>;
}

// =============================================================================
// OPML Import
// =============================================================================

#[async_trait]
pub trait BaseImportProcessor: Send + Sync {
    /// Process an uploaded import, returning the feeds it subscribed to.
    async fn process(&self, import_id: ImportId) -> Result<ImportSummary>;
}

// =============================================================================
// Score Model Training
// =============================================================================

#[async_trait]
pub trait BaseScoreTrainer: Send + Sync {
    async fn train(&self, user_id: UserId) -> Result<TrainingSummary>;
}

// =============================================================================
// Error Observability
// =============================================================================

/// Context attached to a handler defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobErrorContext {
    pub job_id: JobId,
    pub job_type: JobType,
    pub consecutive_failures: i32,
}

#[async_trait]
pub trait BaseErrorReporter: Send + Sync {
    /// Surface an unexpected handler failure to an external sink.
    async fn report(&self, error: &anyhow::Error, context: JobErrorContext);
}
