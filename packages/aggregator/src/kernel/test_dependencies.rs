// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into ServerDeps for tests.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    BaseEntryProcessor, BaseErrorReporter, BaseFeedFetcher, BaseFeedParser, BaseImportProcessor,
    BaseScoreTrainer, BaseWebSubRenewer, JobErrorContext, ServerDeps,
};
use crate::common::{FeedId, ImportId, UserId};
use crate::domains::feeds::{
    CacheHeaders, EntryChanges, EntryProcessingContext, FetchOutcome, FetchRequest, ParsedFeed,
    RedirectHop,
};
use crate::domains::imports::ImportSummary;
use crate::domains::scoring::TrainingSummary;
use crate::domains::websub::RenewalSummary;
use crate::kernel::jobs::JobStore;

// =============================================================================
// Mock Feed Fetcher
// =============================================================================

/// Returns queued outcomes per URL; unknown URLs get a network error.
pub struct MockFeedFetcher {
    responses: Arc<Mutex<HashMap<String, Vec<FetchOutcome>>>>,
    calls: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFeedFetcher {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue an outcome for a URL. The last queued outcome repeats.
    pub fn with_outcome(self, url: &str, outcome: FetchOutcome) -> Self {
        self.push(url, outcome);
        self
    }

    /// Queue a 200 with the given body
    pub fn with_body(self, url: &str, body: &str) -> Self {
        self.with_outcome(
            url,
            FetchOutcome::Success {
                body: body.as_bytes().to_vec(),
                cache: CacheHeaders::default(),
                redirects: vec![],
            },
        )
    }

    /// Queue a 200 reached through a single 301 to `target`
    pub fn with_permanent_redirect(self, url: &str, target: &str, body: &str) -> Self {
        self.with_outcome(
            url,
            FetchOutcome::Success {
                body: body.as_bytes().to_vec(),
                cache: CacheHeaders::default(),
                redirects: vec![RedirectHop {
                    status: 301,
                    location: target.to_string(),
                }],
            },
        )
    }

    pub fn push(&self, url: &str, outcome: FetchOutcome) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(outcome);
    }

    /// Get all fetch requests
    pub fn calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockFeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseFeedFetcher for MockFeedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        self.calls.lock().unwrap().push(request.clone());

        let mut responses = self.responses.lock().unwrap();
        let outcome = match responses.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => FetchOutcome::NetworkError {
                message: format!("no mock response for {}", request.url),
            },
        };
        Ok(outcome)
    }
}

// =============================================================================
// Mock Feed Parser
// =============================================================================

pub struct MockFeedParser {
    feed: ParsedFeed,
    fail_with: Option<String>,
}

impl MockFeedParser {
    pub fn new() -> Self {
        Self {
            feed: ParsedFeed {
                title: Some("Mock Feed".to_string()),
                ..Default::default()
            },
            fail_with: None,
        }
    }

    pub fn with_feed(mut self, feed: ParsedFeed) -> Self {
        self.feed = feed;
        self
    }

    /// Make every parse fail
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }
}

impl Default for MockFeedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseFeedParser for MockFeedParser {
    fn parse(&self, _body: &[u8]) -> Result<ParsedFeed> {
        match &self.fail_with {
            Some(message) => anyhow::bail!("{}", message),
            None => Ok(self.feed.clone()),
        }
    }
}

// =============================================================================
// Mock Entry Processor
// =============================================================================

pub struct MockEntryProcessor {
    changes: EntryChanges,
    calls: Arc<Mutex<Vec<(FeedId, EntryProcessingContext)>>>,
}

impl MockEntryProcessor {
    pub fn new() -> Self {
        Self {
            changes: EntryChanges {
                new_count: 1,
                has_changes: true,
                ..Default::default()
            },
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_changes(mut self, changes: EntryChanges) -> Self {
        self.changes = changes;
        self
    }

    pub fn calls(&self) -> Vec<(FeedId, EntryProcessingContext)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockEntryProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseEntryProcessor for MockEntryProcessor {
    async fn process(
        &self,
        feed_id: FeedId,
        _feed: &ParsedFeed,
        context: EntryProcessingContext,
    ) -> Result<EntryChanges> {
        self.calls.lock().unwrap().push((feed_id, context));
        Ok(self.changes)
    }
}

// =============================================================================
// Mock WebSub Renewer
// =============================================================================

#[derive(Default)]
pub struct MockWebSubRenewer {
    summary: RenewalSummary,
    calls: Arc<Mutex<Vec<i64>>>,
}

impl MockWebSubRenewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, summary: RenewalSummary) -> Self {
        self.summary = summary;
        self
    }

    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseWebSubRenewer for MockWebSubRenewer {
    async fn renew_expiring_subscriptions(&self, hours_before_expiry: i64) -> Result<RenewalSummary> {
        self.calls.lock().unwrap().push(hours_before_expiry);
        Ok(self.summary.clone())
    }
}

// =============================================================================
// Mock Import Processor
// =============================================================================

#[derive(Default)]
pub struct MockImportProcessor {
    feed_ids: Vec<FeedId>,
    fail_with: Option<String>,
    calls: Arc<Mutex<Vec<ImportId>>>,
}

impl MockImportProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds every import reports as subscribed
    pub fn with_feeds(mut self, feed_ids: Vec<FeedId>) -> Self {
        self.feed_ids = feed_ids;
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ImportId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseImportProcessor for MockImportProcessor {
    async fn process(&self, import_id: ImportId) -> Result<ImportSummary> {
        self.calls.lock().unwrap().push(import_id);
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }
        Ok(ImportSummary {
            feed_ids: self.feed_ids.clone(),
            skipped: 0,
        })
    }
}

// =============================================================================
// Mock Score Trainer
// =============================================================================

#[derive(Default)]
pub struct MockScoreTrainer {
    calls: Arc<Mutex<Vec<UserId>>>,
}

impl MockScoreTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<UserId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseScoreTrainer for MockScoreTrainer {
    async fn train(&self, user_id: UserId) -> Result<TrainingSummary> {
        self.calls.lock().unwrap().push(user_id);
        Ok(TrainingSummary { signal_count: 20 })
    }
}

// =============================================================================
// Recording Error Reporter
// =============================================================================

#[derive(Default)]
pub struct RecordingErrorReporter {
    reports: Arc<Mutex<Vec<(String, JobErrorContext)>>>,
}

impl RecordingErrorReporter {
    /// Reported errors, formatted with their cause chain
    pub fn reports(&self) -> Vec<(String, JobErrorContext)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseErrorReporter for RecordingErrorReporter {
    async fn report(&self, error: &anyhow::Error, context: JobErrorContext) {
        self.reports
            .lock()
            .unwrap()
            .push((format!("{:#}", error), context));
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

pub struct TestDependencies {
    pub fetcher: Arc<MockFeedFetcher>,
    pub parser: Arc<MockFeedParser>,
    pub entry_processor: Arc<MockEntryProcessor>,
    pub websub_renewer: Arc<MockWebSubRenewer>,
    pub import_processor: Arc<MockImportProcessor>,
    pub score_trainer: Arc<MockScoreTrainer>,
    pub error_reporter: Arc<RecordingErrorReporter>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            fetcher: Arc::new(MockFeedFetcher::new()),
            parser: Arc::new(MockFeedParser::new()),
            entry_processor: Arc::new(MockEntryProcessor::new()),
            websub_renewer: Arc::new(MockWebSubRenewer::new()),
            import_processor: Arc::new(MockImportProcessor::new()),
            score_trainer: Arc::new(MockScoreTrainer::new()),
            error_reporter: Arc::new(RecordingErrorReporter::default()),
        }
    }

    /// Set a mock fetcher
    pub fn mock_fetcher(mut self, fetcher: MockFeedFetcher) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Set a mock parser
    pub fn mock_parser(mut self, parser: MockFeedParser) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Set a mock entry processor
    pub fn mock_entry_processor(mut self, processor: MockEntryProcessor) -> Self {
        self.entry_processor = Arc::new(processor);
        self
    }

    /// Set a mock WebSub renewer
    pub fn mock_websub(mut self, renewer: MockWebSubRenewer) -> Self {
        self.websub_renewer = Arc::new(renewer);
        self
    }

    /// Set a mock import processor
    pub fn mock_imports(mut self, processor: MockImportProcessor) -> Self {
        self.import_processor = Arc::new(processor);
        self
    }

    /// Convert into ServerDeps for testing
    pub fn into_deps(&self, db_pool: PgPool) -> ServerDeps {
        ServerDeps::builder()
            .jobs(JobStore::new(db_pool.clone()))
            .db_pool(db_pool)
            .fetcher(self.fetcher.clone())
            .parser(self.parser.clone())
            .entry_processor(self.entry_processor.clone())
            .websub_renewer(self.websub_renewer.clone())
            .import_processor(self.import_processor.clone())
            .score_trainer(self.score_trainer.clone())
            .error_reporter(self.error_reporter.clone())
            .build()
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
