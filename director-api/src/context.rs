use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use director_core::context::Headers;
use director_core::RequestContext;

/// Header carrying the tenant a request acts on behalf of.
pub const TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");

/// Correlation ID header, generated by the request-id layer when absent.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Builds the [`RequestContext`] every handler runs with.
///
/// Tenant and correlation ID are taken from their headers. All headers are
/// kept so asynchronous operations can forward them to webhooks.
pub async fn request_context_middleware(mut req: Request, next: Next) -> Response {
    let ctx = request_context(req.headers());
    req.extensions_mut().insert(ctx);

    next.run(req).await
}

pub fn request_context(headers: &HeaderMap) -> RequestContext {
    let mut ctx = RequestContext::new().with_headers(collect_headers(headers));

    if let Some(tenant) = header_value(headers, &TENANT_HEADER) {
        ctx = ctx.with_tenant(tenant);
    }
    if let Some(correlation_id) = header_value(headers, &REQUEST_ID_HEADER) {
        ctx = ctx.with_correlation_id(correlation_id);
    }

    ctx
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Non-UTF-8 values are dropped.
fn collect_headers(headers: &HeaderMap) -> Headers {
    let mut collected = Headers::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            collected
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    collected
}
