pub mod http_errors;
pub mod openai;

pub use http_errors::ApiError;
pub use openai::OpenAiClient;
