pub mod bucket;
pub mod store;

pub use bucket::Bucket;
pub use store::RateLimiterStore;
