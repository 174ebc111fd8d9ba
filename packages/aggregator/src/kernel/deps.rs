//! Server dependencies for job handlers (using traits for testability)
//!
//! This module provides the central dependency container passed to every
//! handler. All external collaborators use trait abstractions so tests can
//! swap in doubles from `kernel::test_dependencies`.

use sqlx::PgPool;
use std::sync::Arc;
use typed_builder::TypedBuilder;

use crate::kernel::error_reporter::TracingErrorReporter;
use crate::kernel::jobs::JobStore;
use crate::kernel::{
    BaseEntryProcessor, BaseErrorReporter, BaseFeedFetcher, BaseFeedParser, BaseImportProcessor,
    BaseScoreTrainer, BaseWebSubRenewer,
};

// =============================================================================
// ServerDeps
// =============================================================================

/// Dependencies accessible to job handlers
#[derive(Clone, TypedBuilder)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub jobs: JobStore,
    pub fetcher: Arc<dyn BaseFeedFetcher>,
    pub parser: Arc<dyn BaseFeedParser>,
    pub entry_processor: Arc<dyn BaseEntryProcessor>,
    pub websub_renewer: Arc<dyn BaseWebSubRenewer>,
    pub import_processor: Arc<dyn BaseImportProcessor>,
    pub score_trainer: Arc<dyn BaseScoreTrainer>,
    /// Sink for handler defects
    #[builder(default = Arc::new(TracingErrorReporter))]
    pub error_reporter: Arc<dyn BaseErrorReporter>,
    /// Renewal window handed to the WebSub renewer
    #[builder(default = 24)]
    pub websub_renew_hours_before_expiry: i64,
}
