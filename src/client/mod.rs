pub mod http;
pub mod mock;
pub mod traits;
pub mod wire;

pub use http::HttpClient;
pub use mock::{MockClient, RecordedCall};
pub use traits::{Client, ClientError};
pub use wire::{RateLimitAlgorithm, WireDetails, WireRule};
