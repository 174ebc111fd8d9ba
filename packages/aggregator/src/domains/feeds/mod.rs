pub mod actions;
pub mod classifier;
pub mod fetch_outcome;
pub mod models;
pub mod parsed;
pub mod redirect;
pub mod schedule;

pub use fetch_outcome::*;
pub use parsed::*;
