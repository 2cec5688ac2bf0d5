pub mod client;
pub mod composer;
pub mod feed;
pub mod session;

pub use client::SyncClient;
pub use composer::Composer;
pub use feed::FeedSubscriber;
pub use session::SessionState;
