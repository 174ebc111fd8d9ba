// Infrastructure: collaborator traits, dependency container, HTTP fetcher,
// and the persistent job engine.

pub mod deps;
pub mod error_reporter;
pub mod http_fetcher;
pub mod jobs;
pub mod noop;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use error_reporter::TracingErrorReporter;
pub use http_fetcher::{FetchError, HttpFeedFetcher};
pub use test_dependencies::TestDependencies;
pub use traits::*;
