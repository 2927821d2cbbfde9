//! Send one HTTP request

use super::run::run_request;
use crate::cli::OutputFormat;
use crate::error::CliResult;
use crate::utils::parse_header;
use std::time::Duration;
use tether_core::{HttpRequest, Request, Target};

pub struct HttpCommand;

impl HttpCommand {
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        config_file: &str,
        device: &str,
        url: String,
        method: String,
        headers: Vec<String>,
        body: Option<String>,
        timeout_ms: Option<u64>,
        format: OutputFormat,
    ) -> CliResult<()> {
        let request = Self::build_request(url, method, headers, body, timeout_ms)?;
        run_request(config_file, Target::Http, device, Request::http(request), format).await
    }

    fn build_request(
        url: String,
        method: String,
        headers: Vec<String>,
        body: Option<String>,
        timeout_ms: Option<u64>,
    ) -> CliResult<HttpRequest> {
        let mut request = HttpRequest::get(url);
        request.method = method.to_uppercase();
        request.body = body.map(String::into_bytes);
        for raw in &headers {
            let (name, value) = parse_header(raw)?;
            request = request.with_header(name, value);
        }
        if let Some(ms) = timeout_ms {
            request = request.with_timeout(Duration::from_millis(ms));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let request = HttpCommand::build_request(
            "http://localhost/jobs".to_string(),
            "post".to_string(),
            vec!["Accept: application/json".to_string()],
            Some("{}".to_string()),
            Some(250),
        )
        .unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.body.as_deref(), Some(b"{}".as_slice()));
        assert_eq!(request.timeout, Some(Duration::from_millis(250)));
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn test_bad_header_rejected() {
        assert!(HttpCommand::build_request(
            "http://localhost/".to_string(),
            "GET".to_string(),
            vec!["broken".to_string()],
            None,
            None,
        )
        .is_err());
    }
}
