//! # intercept
//!
//! why: observe every outbound request exactly once without changing its result
//! relations: wraps a host Transport; records through CaptureHandle (session.rs)
//! what: Request, Response, Transport trait, Interceptor

use crate::session::CaptureHandle;
use netlog_core::{Body, Headers, Outcome};
use std::time::{Instant, SystemTime};

/// An outbound request as handed to the transport.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    /// set once an interceptor has taken responsibility for this attempt;
    /// never sent anywhere
    observed: bool,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: None,
            observed: false,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// true when an interceptor further up the call chain is already
    /// recording this attempt
    pub fn is_observed(&self) -> bool {
        self.observed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// The host's request-execution capability. Never implemented here.
pub trait Transport {
    type Error: std::error::Error;

    fn execute(&self, request: &Request) -> Result<Response, Self::Error>;

    /// whether `error` means the attempt was abandoned rather than failed
    fn is_cancellation(_error: &Self::Error) -> bool {
        false
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    type Error = T::Error;

    fn execute(&self, request: &Request) -> Result<Response, Self::Error> {
        (**self).execute(request)
    }

    fn is_cancellation(error: &Self::Error) -> bool {
        T::is_cancellation(error)
    }
}

/// Transparent recording wrapper around a [`Transport`].
///
/// Results are handed back untouched. Completed attempts (responses and
/// failures) become one entry each; cancelled attempts and panics inside
/// the transport produce none.
pub struct Interceptor<T> {
    transport: T,
    capture: Option<CaptureHandle>,
}

impl<T: Transport> Interceptor<T> {
    pub fn new(transport: T, capture: Option<CaptureHandle>) -> Self {
        Self { transport, capture }
    }

    /// an interceptor that never records
    pub fn passthrough(transport: T) -> Self {
        Self::new(transport, None)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn execute(&self, mut request: Request) -> Result<Response, T::Error> {
        let capture = match &self.capture {
            Some(capture) if capture.is_enabled() && !request.observed => capture,
            _ => return self.transport.execute(&request),
        };

        request.observed = true;
        let started_at = SystemTime::now();
        let clock = Instant::now();
        let result = self.transport.execute(&request);
        let duration = clock.elapsed();

        let outcome = match &result {
            // only the part of the body that will be kept is copied
            Ok(response) => Some(Outcome::Response {
                code: response.status,
                headers: response.headers.clone(),
                body: Some(Body::capped(&response.body, capture.limits().max_body_bytes)),
            }),
            Err(err) if T::is_cancellation(err) => None,
            Err(err) => Some(Outcome::Failure { error: err.to_string() }),
        };
        if let Some(outcome) = outcome {
            capture.record(request, outcome, started_at, duration);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Refused;

    impl fmt::Display for Refused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "refused")
        }
    }

    impl std::error::Error for Refused {}

    struct Echo;

    impl Transport for Echo {
        type Error = Refused;

        fn execute(&self, request: &Request) -> Result<Response, Refused> {
            Ok(Response {
                status: 200,
                headers: request.headers.clone(),
                body: request.body.clone().unwrap_or_default(),
            })
        }
    }

    #[test]
    fn builder_sets_fields() {
        let request = Request::new("PUT", "https://example.com/a")
            .header("X-One", "1")
            .body("payload");
        assert_eq!(request.method, "PUT");
        assert_eq!(request.headers.get("x-one"), Some("1"));
        assert_eq!(request.body.as_deref(), Some(&b"payload"[..]));
        assert!(!request.is_observed());
    }

    #[test]
    fn passthrough_returns_transport_result() {
        let interceptor = Interceptor::passthrough(Echo);
        let request = Request::new("POST", "https://example.com").body("hi");
        let response = interceptor.execute(request.clone()).unwrap();
        assert_eq!(response, Echo.execute(&request).unwrap());
    }

    #[test]
    fn transport_by_reference() {
        let echo = Echo;
        let interceptor = Interceptor::passthrough(&echo);
        assert_eq!(interceptor.execute(Request::new("GET", "x")).unwrap().status, 200);
    }
}
