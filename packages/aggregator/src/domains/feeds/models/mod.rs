pub mod entry;
pub mod feed;
pub mod subscription;

pub use entry::*;
pub use feed::*;
pub use subscription::*;
