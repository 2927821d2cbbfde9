use crate::error::{ConnectorError, ConnectorResult};
use reqwest::{redirect, Client};
use tether_config::HttpDeviceConfig;

/// Builds the shared multiplexing client for one device.
pub fn build_client(config: &HttpDeviceConfig) -> ConnectorResult<Client> {
    if config.connect_timeout_ms == 0 || config.timeout_ms == 0 {
        return Err(ConnectorError::InvalidConfig(
            "HTTP timeouts must be positive".to_string(),
        ));
    }

    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.timeout())
        .tcp_keepalive(std::time::Duration::from_secs(60));

    builder = if config.follow_redirects {
        builder.redirect(redirect::Policy::limited(10))
    } else {
        builder.redirect(redirect::Policy::none())
    };

    if let Some(agent) = &config.user_agent {
        builder = builder.user_agent(agent.clone());
    }
    if let Some(idle) = config.max_idle_per_host {
        builder = builder.pool_max_idle_per_host(idle);
    }

    Ok(builder.build()?)
}
