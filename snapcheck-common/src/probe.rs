//! HTTP readiness probe for the exported metrics endpoint.
//!
//! A socket being bound does not mean the exporter is serving yet, and a
//! served response does not mean it is healthy. The probe keeps the two
//! failure shapes apart: no HTTP response at all is `EndpointUnreachable`,
//! while an answered request with the wrong status is `UnexpectedStatus`.

use std::time::Duration;

use tracing::debug;

use crate::errors::{HarnessError, HarnessResult};
use crate::retry::RetryPolicy;

/// Per-request timeout. Kept above the endpoint poll interval so a slow
/// response is observed rather than cut off mid-poll.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Issues GET requests against a metrics endpoint.
pub struct EndpointProbe {
    agent: ureq::Agent,
    policy: RetryPolicy,
}

impl EndpointProbe {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT, policy)
    }

    pub fn with_timeout(timeout: Duration, policy: RetryPolicy) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            policy,
        }
    }

    /// One GET against `url`. Any HTTP response at all, success or error
    /// class, comes back as its status code; only the absence of a response
    /// is an error.
    pub fn check(&self, url: &str) -> HarnessResult<u16> {
        match self.agent.get(url).call() {
            Ok(resp) => {
                let status = resp.status().as_u16();
                debug!(url, status, "endpoint answered");
                Ok(status)
            }
            Err(ureq::Error::StatusCode(status)) => {
                debug!(url, status, "endpoint answered");
                Ok(status)
            }
            Err(err) => Err(HarnessError::EndpointUnreachable {
                url: url.to_string(),
                detail: err.to_string(),
            }),
        }
    }

    /// Polls until `url` answers 200 OK.
    pub fn await_ok(&self, url: &str) -> HarnessResult<()> {
        self.policy.run("endpoint ready", || {
            let status = self.check(url)?;
            if status == 200 {
                Ok(())
            } else {
                Err(HarnessError::UnexpectedStatus {
                    url: url.to_string(),
                    status,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Minimal HTTP server. Queued statuses are served in order; the last
    /// one repeats for every further request, so a polling probe keeps
    /// observing the terminal state however often it retries.
    fn serve_statuses(statuses: Vec<u16>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        thread::spawn(move || {
            let mut queue = statuses.into_iter();
            let mut status = queue.next().unwrap_or(200);
            loop {
                let (mut stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    503 => "Service Unavailable",
                    _ => "Status",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                );
                let _ = stream.write_all(response.as_bytes());
                if let Some(next) = queue.next() {
                    status = next;
                }
            }
        });
        format!("http://{addr}/metrics")
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1), Duration::from_secs(5))
    }

    #[test]
    fn test_check_reports_success_status() {
        let url = serve_statuses(vec![200]);
        let probe = EndpointProbe::new(fast_policy());
        assert_eq!(probe.check(&url).unwrap(), 200);
    }

    #[test]
    fn test_check_reports_error_status_as_a_status() {
        let url = serve_statuses(vec![503]);
        let probe = EndpointProbe::new(fast_policy());
        // An answered 5xx is an observation, not a transport failure.
        assert_eq!(probe.check(&url).unwrap(), 503);
    }

    #[test]
    fn test_unreachable_endpoint_is_distinct_from_bad_status() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("local addr").port()
        };
        let url = format!("http://127.0.0.1:{port}/metrics");
        let probe = EndpointProbe::new(fast_policy());
        let err = probe.check(&url).unwrap_err();
        assert!(matches!(err, HarnessError::EndpointUnreachable { .. }));
    }

    #[test]
    fn test_await_ok_polls_through_warmup() {
        let url = serve_statuses(vec![503, 503, 200]);
        let probe = EndpointProbe::new(fast_policy());
        probe.await_ok(&url).unwrap();
    }

    #[test]
    fn test_await_ok_exhaustion_keeps_last_status() {
        let url = serve_statuses(vec![404]);
        let policy = RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(30));
        let probe = EndpointProbe::new(policy);
        let err = probe.await_ok(&url).unwrap_err();
        assert!(err.is_exhausted());
        assert!(matches!(
            err.root(),
            HarnessError::UnexpectedStatus { status: 404, .. }
        ));
    }
}
