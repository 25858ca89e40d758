use std::error::Error as StdError;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the hosted API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("failed to initialize HTTP client")]
    Client(#[source] reqwest::Error),

    #[error(
        "request to '{url}' timed out after {timeout_secs}s; increase --timeout or check service responsiveness"
    )]
    Timeout { url: String, timeout_secs: u64 },

    #[error("connection refused by API at '{url}'; ensure OPENAI_BASE_URL is correct")]
    ConnectionRefused { url: String },

    #[error("failed to connect to API at '{url}'; check OPENAI_BASE_URL and network connectivity")]
    Connect { url: String },

    #[error("failed to call API at '{url}'")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API request to '{url}' failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode API response from '{url}'")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read upload file {}", .path.display())]
    UploadRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chat completion returned no choices")]
    EmptyResponse,

    #[error("run {run_id} ended with status '{status}'")]
    RunFailed { run_id: String, status: String },

    #[error("run {run_id} did not finish within {waited_secs}s")]
    RunTimedOut { run_id: String, waited_secs: u64 },
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == ErrorKind::ConnectionRefused
        {
            return true;
        }

        if source
            .to_string()
            .to_ascii_lowercase()
            .contains("connection refused")
        {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == ErrorKind::TimedOut
        {
            return true;
        }

        if source
            .to_string()
            .to_ascii_lowercase()
            .contains("timed out")
        {
            return true;
        }

        current = source.source();
    }

    false
}

pub(crate) fn api_request_error(err: reqwest::Error, url: &str, timeout_secs: u64) -> ApiError {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return ApiError::Timeout {
            url: url.to_string(),
            timeout_secs,
        };
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return ApiError::ConnectionRefused {
                url: url.to_string(),
            };
        }

        return ApiError::Connect {
            url: url.to_string(),
        };
    }

    ApiError::Request {
        url: url.to_string(),
        source: err,
    }
}
