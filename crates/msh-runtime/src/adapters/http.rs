//! # HTTP Dispatch Adapter
//!
//! Posts each message to its endpoint over HTTP(S).
//!
//! | Result | Outcome |
//! |--------|---------|
//! | 2xx | delivered, body kept as the response envelope |
//! | 4xx | fatal `Rejected` |
//! | 5xx and other statuses | retryable `Remote` |
//! | connect error | retryable `Connection` |
//! | no answer in time | retryable `Timeout` |
//! | no endpoint | fatal `Configuration` |

use async_trait::async_trait;
use msh_02_leg_configuration::LegConfiguration;
use msh_04_retry_scheduler::{
    DispatchAdapter, DispatchFailure, DispatchOutcome, FailureKind, OutboundMessage,
};
use reqwest::StatusCode;
use shared_types::DomainContext;
use std::time::Duration;
use tracing::debug;

pub const HEADER_MESSAGE_ID: &str = "X-MSH-Message-Id";
pub const HEADER_MPC: &str = "X-MSH-MPC";
pub const HEADER_GROUP_ID: &str = "X-MSH-Group-Id";
pub const HEADER_FRAGMENT_NUMBER: &str = "X-MSH-Fragment-Number";
pub const HEADER_FRAGMENT_COUNT: &str = "X-MSH-Fragment-Count";
pub const HEADER_SOURCE_MESSAGE_ID: &str = "X-MSH-Source-Message-Id";

pub struct HttpDispatchAdapter {
    client: reqwest::Client,
    max_timeout: Duration,
}

impl HttpDispatchAdapter {
    /// `max_timeout` caps every exchange, whatever the leg asks for.
    pub fn new(max_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()?;
        Ok(Self {
            client,
            max_timeout,
        })
    }

    fn request(&self, endpoint: &str, message: &OutboundMessage, timeout: Duration) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, message.content_type.as_str())
            .header(HEADER_MESSAGE_ID, message.message_id.as_str())
            .header(HEADER_MPC, message.mpc.as_str());
        if let Some(fragment) = &message.fragment {
            request = request
                .header(HEADER_GROUP_ID, fragment.group_id.as_str())
                .header(HEADER_FRAGMENT_NUMBER, fragment.fragment_number.to_string())
                .header(HEADER_FRAGMENT_COUNT, fragment.fragment_count.to_string())
                .header(HEADER_SOURCE_MESSAGE_ID, fragment.source_message_id.as_str());
        }
        request.body(message.payload.clone())
    }
}

/// Outcome for a non-success status.
pub fn classify_status(status: StatusCode) -> DispatchFailure {
    let detail = format!("HTTP {}", status);
    if status.is_client_error() {
        DispatchFailure::fatal(FailureKind::Rejected, detail)
    } else {
        DispatchFailure::retryable(FailureKind::Remote, detail)
    }
}

fn classify_error(error: &reqwest::Error, timeout: Duration) -> DispatchFailure {
    if error.is_timeout() {
        DispatchFailure::timeout(timeout)
    } else if error.is_builder() {
        DispatchFailure::fatal(FailureKind::Configuration, error.to_string())
    } else {
        DispatchFailure::retryable(FailureKind::Connection, error.to_string())
    }
}

#[async_trait]
impl DispatchAdapter for HttpDispatchAdapter {
    async fn send(
        &self,
        ctx: &DomainContext,
        message: &OutboundMessage,
        leg: &LegConfiguration,
        timeout: Duration,
    ) -> DispatchOutcome {
        let Some(endpoint) = message.endpoint.as_deref().or(leg.endpoint.as_deref()) else {
            return DispatchOutcome::Failed(DispatchFailure::fatal(
                FailureKind::Configuration,
                format!("no endpoint for leg {}", leg.name),
            ));
        };
        let timeout = timeout.min(self.max_timeout);

        debug!(
            domain = %ctx.domain(),
            message_id = %message.message_id,
            endpoint,
            bytes = message.payload.len(),
            "[msh-runtime] POST"
        );
        let response = match self.request(endpoint, message, timeout).send().await {
            Ok(response) => response,
            Err(e) => return DispatchOutcome::Failed(classify_error(&e, timeout)),
        };

        let status = response.status();
        if !status.is_success() {
            return DispatchOutcome::Failed(classify_status(status));
        }
        match response.bytes().await {
            Ok(body) if body.is_empty() => DispatchOutcome::Delivered { response: None },
            Ok(body) => DispatchOutcome::Delivered {
                response: Some(body.to_vec()),
            },
            Err(e) => DispatchOutcome::Failed(classify_error(&e, timeout)),
        }
    }
}
