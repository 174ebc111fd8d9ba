//! Stand-ins for collaborators that are not linked into this binary.
//!
//! The feed-format parser, entry diffing, WebSub hub client, OPML import and
//! score training all live outside the scheduling core. These keep the worker
//! runnable on its own: feeds are fetched and scheduled, nothing is stored.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::common::{FeedId, ImportId, UserId};
use crate::domains::feeds::{EntryChanges, EntryProcessingContext, ParsedFeed};
use crate::domains::imports::ImportSummary;
use crate::domains::scoring::TrainingSummary;
use crate::domains::websub::RenewalSummary;
use crate::kernel::{
    BaseEntryProcessor, BaseFeedParser, BaseImportProcessor, BaseScoreTrainer, BaseWebSubRenewer,
};

pub struct NoopFeedParser;

impl BaseFeedParser for NoopFeedParser {
    fn parse(&self, body: &[u8]) -> Result<ParsedFeed> {
        debug!(bytes = body.len(), "no feed parser linked, treating body as empty feed");
        Ok(ParsedFeed::default())
    }
}

pub struct NoopEntryProcessor;

#[async_trait]
impl BaseEntryProcessor for NoopEntryProcessor {
    async fn process(
        &self,
        feed_id: FeedId,
        feed: &ParsedFeed,
        _context: EntryProcessingContext,
    ) -> Result<EntryChanges> {
        debug!(feed_id = %feed_id, items = feed.items.len(), "no entry processor linked");
        Ok(EntryChanges::default())
    }
}

pub struct NoopWebSubRenewer;

#[async_trait]
impl BaseWebSubRenewer for NoopWebSubRenewer {
    async fn renew_expiring_subscriptions(&self, hours_before_expiry: i64) -> Result<RenewalSummary> {
        debug!(hours_before_expiry, "no websub renewer linked");
        Ok(RenewalSummary::default())
    }
}

pub struct NoopImportProcessor;

#[async_trait]
impl BaseImportProcessor for NoopImportProcessor {
    async fn process(&self, import_id: ImportId) -> Result<ImportSummary> {
        debug!(import_id = %import_id, "no import processor linked");
        Ok(ImportSummary::default())
    }
}

pub struct NoopScoreTrainer;

#[async_trait]
impl BaseScoreTrainer for NoopScoreTrainer {
    async fn train(&self, user_id: UserId) -> Result<TrainingSummary> {
        debug!(user_id = %user_id, "no score trainer linked");
        Ok(TrainingSummary::default())
    }
}
