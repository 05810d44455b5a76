//! `convo-stt`: concrete `SttProvider` implementations for `convo-core`.

pub mod error;
pub mod http;
pub mod mock;
mod wav;

pub use error::SttError;
pub use http::HttpSttProvider;
pub use mock::MockSttProvider;
