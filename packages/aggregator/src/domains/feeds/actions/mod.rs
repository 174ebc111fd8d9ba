pub mod apply_redirect;
pub mod fetch_feed;

pub use apply_redirect::*;
pub use fetch_feed::*;
