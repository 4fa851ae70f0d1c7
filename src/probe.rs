//! Network reachability check, run before anything talks to the service.
//!
//! The tool is often scheduled at login, when the network may not be up yet,
//! so the probe retries a few times with a fixed delay.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens a TCP connection to `endpoint` (`host:port`), retrying up to `attempts` times.
pub async fn verify_reachable(endpoint: &str, attempts: u32, delay: Duration) -> Result<()> {
    verify_reachable_with(endpoint, attempts, delay, |endpoint| async move {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(endpoint.as_str())).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            )),
        }
    })
    .await
}

pub async fn verify_reachable_with<F, Fut>(
    endpoint: &str,
    attempts: u32,
    delay: Duration,
    mut connect: F,
) -> Result<()>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    for attempt in 1..=attempts {
        match connect(endpoint.to_string()).await {
            Ok(()) => {
                debug!(endpoint, attempt, "service reachable");
                return Ok(());
            }
            Err(err) => {
                warn!(endpoint, attempt, "Server unreachable, error: {err}");
                if attempt < attempts {
                    warn!("Retry in {delay:?}");
                    sleep(delay).await;
                }
            }
        }
    }
    Err(Error::Unreachable {
        endpoint: endpoint.to_string(),
        attempts,
    })
}
