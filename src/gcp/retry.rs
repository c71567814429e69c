//! Retrying transport
//!
//! Wraps any [`HttpSend`] and re-issues a request while the server keeps
//! answering with a 5xx status. Delays grow exponentially from
//! [`RETRY_DELAY`] and at most [`RETRY_MAX`] attempts are made. The last
//! response is handed back unchanged, so callers see the final 5xx exactly
//! as if no retry had happened.
//!
//! Transport errors are not retried: the first one is returned as is.

use super::transport::HttpSend;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Request, Response, StatusCode};
use std::time::Duration;

/// Maximum number of attempts for a single request
pub const RETRY_MAX: u32 = 5;

/// Delay before the first retry, doubled for every following one
pub const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Delay before retry number `attempt + 1`, where `attempt` is the index of
/// the attempt that just failed (200ms, 400ms, 800ms, 1600ms)
pub fn backoff_delay(attempt: u32) -> Duration {
    RETRY_DELAY * (1u32 << attempt)
}

/// Whether a status code is worth retrying
pub fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
}

/// Something that can wait for a duration
#[async_trait]
pub trait Sleep: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer, yielding the task while waiting
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleep;

#[async_trait]
impl Sleep for TokioSleep {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// [`HttpSend`] decorator retrying server errors with exponential backoff.
///
/// Holds no state between calls: every request starts a fresh attempt
/// sequence, so concurrent callers never share counters or timers.
#[derive(Debug, Clone)]
pub struct RetryTransport<S, Z = TokioSleep> {
    inner: S,
    sleeper: Z,
}

impl<S: HttpSend> RetryTransport<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            sleeper: TokioSleep,
        }
    }
}

impl<S: HttpSend, Z: Sleep> RetryTransport<S, Z> {
    /// Use a custom sleeper instead of the tokio timer
    pub fn with_sleeper(inner: S, sleeper: Z) -> Self {
        Self { inner, sleeper }
    }

    /// The wrapped sender
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: HttpSend, Z: Sleep> HttpSend for RetryTransport<S, Z> {
    async fn send(&self, request: Request) -> Result<Response> {
        let mut request = request;
        let mut attempt = 0;

        loop {
            // Keep a copy for the next attempt; the body is consumed by this one
            let replay = request.try_clone();
            let method = request.method().clone();
            let url = request.url().clone();

            let response = self.inner.send(request).await?;
            let status = response.status();

            if !is_retryable(status) || attempt + 1 >= RETRY_MAX {
                return Ok(response);
            }

            let Some(next) = replay else {
                tracing::warn!("{} {} returned {} but its body cannot be replayed", method, url, status);
                return Ok(response);
            };

            let delay = backoff_delay(attempt);
            tracing::debug!(
                "{} {} returned {}, retrying in {:?} (attempt {}/{})",
                method,
                url,
                status,
                delay,
                attempt + 2,
                RETRY_MAX
            );
            drop(response);
            self.sleeper.sleep(delay).await;

            attempt += 1;
            request = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays a fixed sequence of outcomes, counting sends
    struct Scripted {
        outcomes: Mutex<VecDeque<std::result::Result<u16, &'static str>>>,
        sends: AtomicUsize,
    }

    impl Scripted {
        fn new(outcomes: Vec<std::result::Result<u16, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                sends: AtomicUsize::new(0),
            })
        }

        fn sends(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpSend for Scripted {
        async fn send(&self, _request: Request) -> Result<Response> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            let next = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted");
            match next {
                Ok(status) => Ok(Response::from(
                    http::Response::builder()
                        .status(status)
                        .body(format!("status {status}"))
                        .unwrap(),
                )),
                Err(msg) => Err(anyhow::anyhow!(msg)),
            }
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    impl Recorder {
        fn delays(&self) -> Vec<Duration> {
            self.delays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleep for Recorder {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn get_request() -> Request {
        Request::new(
            reqwest::Method::GET,
            "https://compute.googleapis.com/compute/v1/projects/p".parse().unwrap(),
        )
    }

    #[test]
    fn test_backoff_schedule() {
        let delays: Vec<u128> = (0..RETRY_MAX - 1).map(|a| backoff_delay(a).as_millis()).collect();
        assert_eq!(delays, vec![200, 400, 800, 1600]);
    }

    #[tokio::test]
    async fn test_success_is_sent_once_without_sleeping() {
        let sender = Scripted::new(vec![Ok(200)]);
        let recorder = Recorder::default();
        let transport = RetryTransport::with_sleeper(sender.clone(), recorder.clone());

        let response = transport.send(get_request()).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(sender.sends(), 1);
        assert!(recorder.delays().is_empty());
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let sender = Scripted::new(vec![Ok(404)]);
        let recorder = Recorder::default();
        let transport = RetryTransport::with_sleeper(sender.clone(), recorder.clone());

        let response = transport.send(get_request()).await.unwrap();

        assert_eq!(response.status(), 404);
        assert_eq!(sender.sends(), 1);
        assert!(recorder.delays().is_empty());
    }

    #[tokio::test]
    async fn test_recovers_after_four_unavailable() {
        let sender = Scripted::new(vec![Ok(503), Ok(503), Ok(503), Ok(503), Ok(200)]);
        let recorder = Recorder::default();
        let transport = RetryTransport::with_sleeper(sender.clone(), recorder.clone());

        let response = transport.send(get_request()).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(sender.sends(), 5);
        assert_eq!(
            recorder.delays(),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_last_response() {
        let sender = Scripted::new(vec![Ok(500), Ok(500), Ok(500), Ok(500), Ok(500)]);
        let recorder = Recorder::default();
        let transport = RetryTransport::with_sleeper(sender.clone(), recorder.clone());

        let response = transport.send(get_request()).await.unwrap();

        assert_eq!(response.status(), 500);
        assert_eq!(response.text().await.unwrap(), "status 500");
        assert_eq!(sender.sends(), 5);
        assert_eq!(recorder.delays().len(), 4);
    }

    #[tokio::test]
    async fn test_transport_error_stops_immediately() {
        let sender = Scripted::new(vec![Err("connection reset by peer"), Ok(200)]);
        let recorder = Recorder::default();
        let transport = RetryTransport::with_sleeper(sender.clone(), recorder.clone());

        let err = transport.send(get_request()).await.unwrap_err();

        assert_eq!(err.to_string(), "connection reset by peer");
        assert_eq!(sender.sends(), 1);
        assert!(recorder.delays().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_after_server_error() {
        let sender = Scripted::new(vec![Ok(502), Err("connection refused")]);
        let recorder = Recorder::default();
        let transport = RetryTransport::with_sleeper(sender.clone(), recorder.clone());

        let err = transport.send(get_request()).await.unwrap_err();

        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(sender.sends(), 2);
        assert_eq!(recorder.delays(), vec![Duration::from_millis(200)]);
    }

    #[tokio::test]
    async fn test_buffered_body_is_replayed() {
        struct EchoBody {
            bodies: Mutex<Vec<Vec<u8>>>,
        }

        #[async_trait]
        impl HttpSend for EchoBody {
            async fn send(&self, request: Request) -> Result<Response> {
                let body = request
                    .body()
                    .and_then(|b| b.as_bytes())
                    .map(|b| b.to_vec())
                    .unwrap_or_default();
                let mut bodies = self.bodies.lock().unwrap();
                bodies.push(body);
                let status = if bodies.len() < 3 { 503 } else { 201 };
                Ok(Response::from(http::Response::builder().status(status).body("").unwrap()))
            }
        }

        let sender = Arc::new(EchoBody {
            bodies: Mutex::new(Vec::new()),
        });
        let recorder = Recorder::default();
        let transport = RetryTransport::with_sleeper(sender.clone(), recorder.clone());

        let mut request = Request::new(
            reqwest::Method::POST,
            "https://storage.googleapis.com/storage/v1/b".parse().unwrap(),
        );
        *request.body_mut() = Some(reqwest::Body::from(r#"{"name":"stemcells"}"#));

        let response = transport.send(request).await.unwrap();

        assert_eq!(response.status(), 201);
        let bodies = sender.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 3);
        assert!(bodies.iter().all(|b| b == br#"{"name":"stemcells"}"#));
    }
}
