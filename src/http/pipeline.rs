//! The send pipeline: before hooks, transport call, after-failure passes.
//!
//! # Data Flow
//! ```text
//! request ─▶ new_builder()
//!         ─▶ for each interceptor: before(builder, snapshot); snapshot = build()
//!         ─▶ transport.send(snapshot)                         (attempt 1)
//!         ─▶ for each interceptor:
//!                response 2xx?            → skip
//!                after_failure → false    → keep response
//!                after_failure → true     → send builder.build() (attempt n+1),
//!                                           previous = replaced response
//!         ─▶ last attempt
//! ```
//!
//! # Design Decisions
//! - One pass per interceptor per call, never an open-ended loop
//! - The builder is shared across passes, so mutations made by one hook are
//!   visible to every later resend
//! - Transport errors end the call at once; interceptors only ever see
//!   HTTP responses

use std::time::{Duration, Instant};

use crate::http::error::{ClientError, ClientResult};
use crate::http::request::{HttpRequest, HttpRequestBuilder};
use crate::http::response::ResponseHead;
use crate::interceptor::request_id::X_REQUEST_ID;
use crate::interceptor::Interceptors;
use crate::observability::metrics;
use crate::resilience::timeouts::effective_timeout;
use crate::transport::{ByteStream, Transport};

/// State of the in-flight response: what was sent, what came back, and
/// which attempt it was.
pub(crate) struct Attempt {
    pub(crate) head: ResponseHead,
    pub(crate) body: ByteStream,
    pub(crate) number: u32,
}

pub(crate) struct Pipeline<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) interceptors: &'a Interceptors,
    pub(crate) read_timeout: Option<Duration>,
}

impl Pipeline<'_> {
    pub(crate) async fn execute(&self, request: &HttpRequest) -> ClientResult<Attempt> {
        let mut builder = request.new_builder();
        let snapshot = self.run_before(&mut builder, request.clone())?;

        let mut attempt = self.issue(snapshot, 1, None).await?;

        for (name, interceptor) in self.interceptors.iter() {
            if attempt.head.is_successful() {
                continue;
            }
            if !interceptor.after_failure(&mut builder, &attempt.head).await {
                continue;
            }
            let resend = builder.build()?;
            tracing::debug!(
                interceptor = name,
                status = attempt.head.code(),
                attempt = attempt.number + 1,
                "Interceptor requested resend"
            );
            let Attempt { head, body, number } = attempt;
            // replaced attempts keep their head only
            drop(body);
            attempt = self.issue(resend, number + 1, Some(head)).await?;
        }

        Ok(attempt)
    }

    fn run_before(
        &self,
        builder: &mut HttpRequestBuilder,
        mut snapshot: HttpRequest,
    ) -> ClientResult<HttpRequest> {
        for (_, interceptor) in self.interceptors.iter() {
            interceptor.before(builder, &snapshot);
            snapshot = builder.build()?;
        }
        Ok(snapshot)
    }

    async fn issue(
        &self,
        request: HttpRequest,
        number: u32,
        previous: Option<ResponseHead>,
    ) -> ClientResult<Attempt> {
        let timeout = effective_timeout(request.timeout(), self.read_timeout);
        let request_id = request
            .header_values(X_REQUEST_ID)
            .first()
            .map(|id| id.to_string())
            .unwrap_or_default();
        tracing::debug!(
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
            attempt = number,
            timeout = ?timeout,
            "Sending request"
        );

        let start = Instant::now();
        let response = match self.transport.send(&request, timeout).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_transport_error(e.kind());
                tracing::warn!(
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    attempt = number,
                    error = %e,
                    "Transport error"
                );
                return Err(ClientError::Transport(e));
            }
        };

        metrics::record_request(request.method().as_str(), response.status.as_u16(), start);
        tracing::debug!(
            request_id = %request_id,
            status = response.status.as_u16(),
            attempt = number,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Received response"
        );

        let mut head = ResponseHead::new(response.status, response.headers, request);
        if let Some(previous) = previous {
            head = head.with_previous(previous);
        }
        Ok(Attempt {
            head,
            body: response.body,
            number,
        })
    }
}
