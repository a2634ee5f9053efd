pub mod models;
pub mod normalize;

pub use models::{CacheKey, DataKind, DateWindow, NormalizedRows};
pub use normalize::normalize;
