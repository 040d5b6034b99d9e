//! Request correlation IDs.
//!
//! Every outgoing request gets an `X-Request-ID` (UUID v4) unless the caller
//! supplied one. Retries reuse the ID already on the builder, so all attempts
//! of one logical request share it.

use http::header::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::http::request::{BasicBuilder, HttpRequest};
use crate::interceptor::Interceptor;

pub const X_REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdInterceptor;

impl RequestIdInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for RequestIdInterceptor {
    fn before(&self, builder: &mut dyn BasicBuilder, request: &HttpRequest) {
        let name = HeaderName::from_static(X_REQUEST_ID);
        if builder.has_header(&name) {
            return;
        }
        let id = Uuid::new_v4();
        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            tracing::trace!(request_id = %id, uri = %request.uri(), "Assigned request ID");
            builder.set_header(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_once() {
        let request = HttpRequest::builder().url("http://localhost/").build().unwrap();
        let mut builder = request.new_builder();
        RequestIdInterceptor.before(&mut builder, &request);
        let first = builder.build().unwrap();
        let id = first.header_values(X_REQUEST_ID)[0].to_string();
        assert!(Uuid::parse_str(&id).is_ok());

        RequestIdInterceptor.before(&mut builder, &first);
        assert_eq!(builder.build().unwrap().header_values(X_REQUEST_ID), vec![id.as_str()]);
    }
}
