//! Typed ids for every entity the scheduling core touches.

pub use super::id::Id;

pub struct User;
pub struct Feed;
pub struct Subscription;
pub struct Entry;
pub struct OpmlImport;
pub struct Job;

pub type UserId = Id<User>;
pub type FeedId = Id<Feed>;
pub type SubscriptionId = Id<Subscription>;
pub type EntryId = Id<Entry>;
pub type ImportId = Id<OpmlImport>;
pub type JobId = Id<Job>;
