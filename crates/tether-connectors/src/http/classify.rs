use std::error::Error as StdError;
use tether_core::{ExecError, TransferCode};

/// Maps a transport failure to its transfer code and an error object whose
/// message leads with the code's description.
pub fn classify(error: &reqwest::Error) -> ExecError {
    let chain = source_chain(error);
    let code = if error.is_builder() {
        TransferCode::UrlMalformat
    } else if is_resolve_failure(&chain) {
        TransferCode::CouldntResolveHost
    } else if error.is_timeout() {
        TransferCode::OperationTimedOut
    } else if error.is_connect() {
        TransferCode::CouldntConnect
    } else if error.is_redirect() {
        TransferCode::Other(47)
    } else if error.is_decode() {
        TransferCode::Other(61)
    } else {
        TransferCode::Other(56)
    };

    let cause = chain.last().cloned().unwrap_or_else(|| error.to_string());
    ExecError::transfer(code, format!("{code}: {cause}"))
}

pub(crate) fn aborted() -> ExecError {
    let code = TransferCode::AbortedByCallback;
    ExecError::transfer(code, code.to_string())
}

fn source_chain(error: &reqwest::Error) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        chain.push(inner.to_string());
        source = inner.source();
    }
    chain
}

fn is_resolve_failure(chain: &[String]) -> bool {
    chain.iter().any(|message| {
        let message = message.to_ascii_lowercase();
        message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("no such host")
    })
}
