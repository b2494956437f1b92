//! Rate limiting middleware for HTTP requests.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::body::Body;
use engine::{CheckRequest, Decision, RateLimitEngine, Tier};
use http::{HeaderValue, Request, Response, StatusCode, header};
use tower::Layer;

#[derive(Clone)]
pub(crate) struct RateLimitLayer(Arc<RateLimitEngine>);

impl RateLimitLayer {
    pub fn new(engine: Arc<RateLimitEngine>) -> Self {
        Self(engine)
    }
}

impl<Service> Layer<Service> for RateLimitLayer
where
    Service: Send + Clone,
{
    type Service = RateLimitService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RateLimitService {
            next,
            engine: self.0.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct RateLimitService<Service> {
    next: Service,
    engine: Arc<RateLimitEngine>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RateLimitService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let engine = self.engine.clone();

        Box::pin(async move {
            let check = check_request(&req);
            let decision = engine.check_limit(check).await;

            if decision.allowed {
                let mut response = next.call(req).await?;
                stamp_rate_limit_headers(&mut response, &decision);
                return Ok(response);
            }

            log::debug!(
                "Request denied for {}, retry after {}s",
                req.uri().path(),
                decision.retry_after_seconds
            );

            let body = serde_json::json!({
                "error": "Rate limit exceeded",
                "retryAfter": decision.retry_after_seconds,
                "remaining": decision.remaining,
            });

            let mut response = Response::builder()
                .status(StatusCode::TOO_MANY_REQUESTS)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();

            stamp_rate_limit_headers(&mut response, &decision);

            Ok(response)
        })
    }
}

/// Map the request headers onto a check request. Absent or unreadable
/// headers fall back to an anonymous free-tier US caller paying one token.
fn check_request<B>(req: &Request<B>) -> CheckRequest {
    let mut builder = CheckRequest::builder().endpoint(req.uri().path());

    if let Some(identity) = header_str(req, "x-user-id") {
        builder = builder.identity(identity);
    }

    if let Some(tier) = header_str(req, "x-user-tier") {
        builder = builder.tier(Tier::parse_lossy(tier));
    }

    if let Some(region) = header_str(req, "x-region") {
        builder = builder.region(region);
    }

    if let Some(cost) = header_str(req, "x-cost").and_then(|cost| cost.parse().ok()) {
        builder = builder.cost(cost);
    }

    builder.build()
}

fn header_str<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name)?.to_str().ok()
}

fn stamp_rate_limit_headers(response: &mut Response<Body>, decision: &Decision) {
    let headers = response.headers_mut();

    if let Ok(remaining) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", remaining);
    }

    headers.insert(
        "x-ratelimit-allowed",
        HeaderValue::from_static(if decision.allowed { "true" } else { "false" }),
    );

    if let Ok(retry) = HeaderValue::from_str(&decision.retry_after_seconds.to_string()) {
        headers.insert("x-ratelimit-retryafter", retry);
    }
}
