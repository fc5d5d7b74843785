use std::time::Duration;

use deskpilot_core::config::{NetworkConfig, ProviderConfig};
use deskpilot_core::{Error, Result};
use reqwest::{Client, Proxy, RequestBuilder, Response, Url};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Whole-request limit for non-streaming calls. Streams are bounded only by
/// the connect timeout and cancellation.
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(120);
const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, PartialEq)]
enum ProxyChoice {
    Use(String),
    Direct,
    Environment,
}

/// Matches exact hosts, `*.suffix` (subdomains only) and `.suffix`
/// (the domain and its subdomains).
fn bypasses_proxy(host: &str, rules: &[String]) -> bool {
    let host = host.to_lowercase();
    rules.iter().any(|rule| {
        let rule = rule.trim().to_lowercase();
        if rule.is_empty() {
            false
        } else if let Some(suffix) = rule.strip_prefix("*.") {
            host.ends_with(&format!(".{}", suffix))
        } else if let Some(suffix) = rule.strip_prefix('.') {
            host == suffix || host.ends_with(&format!(".{}", suffix))
        } else {
            host == rule
        }
    })
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.trim_start_matches('[').trim_end_matches(']').to_string())
}

fn choose_proxy(provider: Option<&ProviderConfig>, network: &NetworkConfig, target: &str) -> ProxyChoice {
    match provider.and_then(|p| p.proxy.as_deref()) {
        Some("") => return ProxyChoice::Direct,
        Some(url) => return ProxyChoice::Use(url.to_string()),
        None => {}
    }
    match network.proxy.as_deref() {
        Some(url) if !url.is_empty() => {
            let bypass = host_of(target)
                .map(|h| bypasses_proxy(&h, &network.no_proxy))
                .unwrap_or(false);
            if bypass {
                ProxyChoice::Direct
            } else {
                ProxyChoice::Use(url.to_string())
            }
        }
        _ => ProxyChoice::Environment,
    }
}

/// Client for one backend, honouring the provider proxy, then the global
/// proxy with its `noProxy` list, then the environment.
pub fn build_http_client(provider: Option<&ProviderConfig>, network: &NetworkConfig, target: &str) -> Client {
    let mut builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);

    match choose_proxy(provider, network, target) {
        ProxyChoice::Use(url) => match Proxy::all(&url) {
            Ok(proxy) => {
                info!(proxy = %url, target = %target, "Backend using proxy");
                builder = builder.proxy(proxy);
            }
            Err(e) => warn!(error = %e, proxy = %url, "Invalid proxy URL, connecting directly"),
        },
        ProxyChoice::Direct => {
            info!(target = %target, "Backend proxy disabled");
            builder = builder.no_proxy();
        }
        ProxyChoice::Environment => {}
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client, using default");
        Client::new()
    })
}

pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}

pub fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transport(format!("request timed out: {}", e))
    } else {
        Error::Transport(e.to_string())
    }
}

/// Sends the request and rejects non-2xx answers. Cancellation while waiting
/// for headers drops the connection.
pub async fn send_checked(request: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        sent = request.send() => sent.map_err(transport_error)?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Backend returned error status");
    Err(Error::HttpStatus {
        status: status.as_u16(),
        body: truncate_body(&body),
    })
}

pub async fn read_json(response: Response, cancel: &CancellationToken) -> Result<serde_json::Value> {
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        body = response.text() => body.map_err(transport_error)?,
    };
    serde_json::from_str(&body)
        .map_err(|e| Error::Protocol(format!("{}: {}", e, truncate_body(&body))))
}
