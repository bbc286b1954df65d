// SPDX-License-Identifier: MIT

//! Executes a single health probe (spec.md §3 `Probe`, §4.E): an HTTP GET
//! expected to return a 2xx status, or a bare TCP connect attempt.

use std::time::Duration;

use zallet_core::Probe;

/// An HTTP probe attempt's timeout, independent of its configured interval
/// — a probe that never responds must not be allowed to stall the next
/// tick. The original's TCP dial uses a 1s timeout (spec.md §4.E); HTTP is
/// left unspecified there, so this uses a more generous budget.
const HTTP_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const TCP_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs one probe attempt, returning whether it was judged healthy.
pub async fn check(probe: &Probe) -> bool {
    match probe {
        Probe::Http { url, .. } => check_http(url).await,
        Probe::Tcp { host, .. } => check_tcp(host).await,
    }
}

async fn check_http(url: &str) -> bool {
    let client = match reqwest::Client::builder().timeout(HTTP_PROBE_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(%err, "failed to build probe http client");
            return false;
        }
    };
    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(err) => {
            tracing::debug!(url, %err, "http probe failed");
            false
        }
    }
}

async fn check_tcp(host: &str) -> bool {
    match tokio::time::timeout(TCP_PROBE_TIMEOUT, tokio::net::TcpStream::connect(host)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(err)) => {
            tracing::debug!(host, %err, "tcp probe failed to connect");
            false
        }
        Err(_elapsed) => {
            tracing::debug!(host, "tcp probe timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn tcp_probe_against_closed_port_fails() {
        let probe = Probe::Tcp {
            host: "127.0.0.1:1".into(),
            delay: None,
            interval: StdDuration::from_secs(1),
            on_fail: None,
        };
        assert!(!check(&probe).await);
    }

    #[tokio::test]
    async fn tcp_probe_against_listening_port_succeeds() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let probe = Probe::Tcp {
            host: addr.to_string(),
            delay: None,
            interval: StdDuration::from_secs(1),
            on_fail: None,
        };
        assert!(check(&probe).await);
    }
}
