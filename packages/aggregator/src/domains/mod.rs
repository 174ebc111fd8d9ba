pub mod feeds;
pub mod imports;
pub mod scoring;
pub mod websub;
