mod backends;
mod engine;
mod error;
mod request;
mod response;
mod retry;

#[cfg(feature = "engine-fixture")]
pub use backends::fixture::{FixtureEngine, FixtureText};
pub use engine::{NoopRecognitionEngine, RecognitionEngine};
pub use error::EngineError;
pub use request::RecognitionRequest;
pub use response::{RecognitionResult, RecognizedText};
pub use retry::{RetryPolicy, warm_up_with_retry};
