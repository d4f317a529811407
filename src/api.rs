//! Dashboard API client.
//!
//! Provides authenticated HTTP communication with the restaurant dashboard:
//! order list fetches (active / admin / deleted / archived), status and
//! payment updates, the soft-delete family, and the stats/export endpoints.
//!
//! [`RemoteOrderStore`] is the seam the dispatcher and polling loader are
//! written against; [`HttpOrderStore`] is the production implementation.
//! Updates are sent as an ordered list of request shapes (verb + body
//! variants) because deployed backends disagree about which one they accept;
//! a shape is only skipped when it fails retriably.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::Session;
use crate::config::Config;
use crate::error::ApiError;
use crate::orders::{decode_orders, DeletedFrom, Order, OrderStatus};
use crate::view::DateGrouping;

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the dashboard base URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment (paths below include it)
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "session token is invalid or expired".to_string(),
        403 => "not authorized for this dashboard".to_string(),
        404 => "dashboard endpoint not found".to_string(),
        s if s >= 500 => format!("dashboard server error (HTTP {s})"),
        s => format!("unexpected response from dashboard (HTTP {s})"),
    }
}

/// Pull the most useful message out of an error response body.
///
/// The dashboard reports validation failures as `{"error": ...}` or
/// `{"message": ...}`, sometimes with a `details`/`errors` payload worth
/// preserving for diagnostics.
fn extract_error_message(status: StatusCode, body_text: &str) -> String {
    if let Ok(body) = serde_json::from_str::<Value>(body_text) {
        let message = body
            .get("error")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| status_error(status));
        if let Some(details) = body.get("details").or_else(|| body.get("errors")) {
            return format!("{message}: {details}");
        }
        return message;
    }
    let trimmed = body_text.trim();
    if trimmed.is_empty() {
        status_error(status)
    } else {
        format!("{}: {trimmed}", status_error(status))
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded retry with linear backoff, applied by the dispatcher around each
/// remote call. Attempt N sleeps `N * base_delay` before the next try.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: config.retry_delay,
        }
    }

}

/// Run `op` until it succeeds, fails terminally, or the policy is exhausted.
/// Only retriable errors (timeout, connection, 5xx) are retried.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retriable() && attempt < policy.max_attempts => {
                let delay = policy.base_delay * attempt;
                warn!(attempt, %error, "retriable failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote order store seam
// ---------------------------------------------------------------------------

/// The dashboard operations the reconciliation core consumes. Implemented
/// over HTTP in production and by scripted mocks in dispatcher tests.
pub trait RemoteOrderStore: Send + Sync {
    fn fetch_orders(
        &self,
        exclude_card_deleted: bool,
    ) -> impl Future<Output = Result<Vec<Order>, ApiError>> + Send;
    fn fetch_admin_orders(&self) -> impl Future<Output = Result<Vec<Order>, ApiError>> + Send;
    fn fetch_deleted_orders(&self) -> impl Future<Output = Result<Vec<Order>, ApiError>> + Send;
    fn fetch_archived_orders(&self) -> impl Future<Output = Result<Vec<Order>, ApiError>> + Send;
    fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn mark_paid(&self, order_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn update_order(
        &self,
        order_id: &str,
        order: &Order,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn soft_delete(
        &self,
        order_id: &str,
        deleted_from: DeletedFrom,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn restore(&self, order_id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn permanently_delete(
        &self,
        order_id: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn empty_trash(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// Request shapes
// ---------------------------------------------------------------------------

/// One way of expressing a mutation on the wire. Shapes for the same
/// operation are tried in order until one succeeds.
#[derive(Debug, Clone)]
pub(crate) struct RequestShape {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Partial-update shapes: `PUT /api/orders/{id}`, then `PATCH` with the same
/// body for backends that reject full-resource PUT semantics.
pub(crate) fn update_shapes(order_id: &str, body: Value) -> Vec<RequestShape> {
    vec![
        RequestShape {
            method: Method::PUT,
            path: format!("/api/orders/{order_id}"),
            body: Some(body.clone()),
        },
        RequestShape {
            method: Method::PATCH,
            path: format!("/api/orders/{order_id}"),
            body: Some(body),
        },
    ]
}

/// Soft-delete shapes: DELETE with a JSON body first, then the origin tag as
/// a query parameter for proxies that strip DELETE bodies.
pub(crate) fn soft_delete_shapes(order_id: &str, deleted_from: DeletedFrom) -> Vec<RequestShape> {
    let tag = match deleted_from {
        DeletedFrom::Admin => "admin",
        DeletedFrom::OrderCard => "orderCard",
    };
    vec![
        RequestShape {
            method: Method::DELETE,
            path: format!("/api/orders/{order_id}"),
            body: Some(json!({ "deletedFrom": tag })),
        },
        RequestShape {
            method: Method::DELETE,
            path: format!("/api/orders/{order_id}?deletedFrom={tag}"),
            body: None,
        },
    ]
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct HttpOrderStore {
    client: Client,
    base_url: String,
    session: Arc<Session>,
}

impl HttpOrderStore {
    pub fn new(config: &Config, session: Arc<Session>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.base_url),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one request. `path` includes the leading `/api` segment.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        idempotency_key: Option<&str>,
    ) -> Result<Value, ApiError> {
        let full_url = format!("{}{}", self.base_url, path);
        debug!(%method, %full_url, "dashboard request");

        let mut req = self
            .client
            .request(method, &full_url)
            .header(CONTENT_TYPE, "application/json");

        // Absence of a token is tolerated: dev/mock mode runs unauthenticated.
        if let Some(bearer) = self.session.bearer() {
            req = req.header(AUTHORIZATION, bearer);
        }
        if let Some(key) = idempotency_key {
            req = req.header("X-Idempotency-Key", key);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_error_message(status, &body_text),
            });
        }

        if body_text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text)
            .map_err(|e| ApiError::BadPayload(format!("invalid JSON from dashboard: {e}")))
    }

    /// Try each shape in order. Non-retriable failures (validation, auth)
    /// abort immediately; retriable ones fall through to the next shape.
    async fn send_shapes(&self, shapes: &[RequestShape]) -> Result<Value, ApiError> {
        let key = Uuid::new_v4().to_string();
        let mut last_err = None;
        for shape in shapes {
            match self
                .request(
                    shape.method.clone(),
                    &shape.path,
                    shape.body.as_ref(),
                    Some(&key),
                )
                .await
            {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retriable() => {
                    warn!(path = %shape.path, %error, "request shape failed, trying next");
                    last_err = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_err.unwrap_or_else(|| ApiError::Network("no request shapes".into())))
    }

    async fn fetch_list(&self, path: &str) -> Result<Vec<Order>, ApiError> {
        let value = self.request(Method::GET, path, None, None).await?;
        Ok(decode_orders(value))
    }

    /// Aggregated sales figures computed server-side.
    pub async fn fetch_stats(&self, grouping: DateGrouping) -> Result<Value, ApiError> {
        self.request(
            Method::GET,
            &format!("/api/stats?viewMode={}", grouping.as_query()),
            None,
            None,
        )
        .await
    }

    /// Server-side order export payload.
    pub async fn export_orders(&self) -> Result<Value, ApiError> {
        self.request(Method::GET, "/api/orders/export", None, None)
            .await
    }
}

impl RemoteOrderStore for HttpOrderStore {
    async fn fetch_orders(&self, exclude_card_deleted: bool) -> Result<Vec<Order>, ApiError> {
        self.fetch_list(&format!(
            "/api/orders?excludeOrderCardDeleted={exclude_card_deleted}"
        ))
        .await
    }

    async fn fetch_admin_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.fetch_list("/api/orders/admin").await
    }

    async fn fetch_deleted_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.fetch_list("/api/orders/deleted").await
    }

    async fn fetch_archived_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.fetch_list("/api/orders/archived").await
    }

    async fn update_status(&self, order_id: &str, status: OrderStatus) -> Result<(), ApiError> {
        let status = serde_json::to_value(status)
            .map_err(|e| ApiError::BadPayload(format!("encode status: {e}")))?;
        self.send_shapes(&update_shapes(order_id, json!({ "status": status })))
            .await?;
        Ok(())
    }

    async fn mark_paid(&self, order_id: &str) -> Result<(), ApiError> {
        self.send_shapes(&update_shapes(
            order_id,
            json!({ "paymentStatus": "paid" }),
        ))
        .await?;
        Ok(())
    }

    async fn update_order(&self, order_id: &str, order: &Order) -> Result<(), ApiError> {
        let body = serde_json::to_value(order)
            .map_err(|e| ApiError::BadPayload(format!("encode order: {e}")))?;
        self.send_shapes(&update_shapes(order_id, body)).await?;
        Ok(())
    }

    async fn soft_delete(&self, order_id: &str, deleted_from: DeletedFrom) -> Result<(), ApiError> {
        self.send_shapes(&soft_delete_shapes(order_id, deleted_from))
            .await?;
        Ok(())
    }

    async fn restore(&self, order_id: &str) -> Result<(), ApiError> {
        self.request(
            Method::PUT,
            &format!("/api/orders/{order_id}/restore"),
            None,
            Some(&Uuid::new_v4().to_string()),
        )
        .await?;
        Ok(())
    }

    async fn permanently_delete(&self, order_id: &str) -> Result<(), ApiError> {
        self.request(
            Method::DELETE,
            &format!("/api/orders/{order_id}?permanent=true"),
            None,
            Some(&Uuid::new_v4().to_string()),
        )
        .await?;
        Ok(())
    }

    async fn empty_trash(&self) -> Result<(), ApiError> {
        self.request(
            Method::DELETE,
            "/api/orders/empty-trash",
            None,
            Some(&Uuid::new_v4().to_string()),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://dash.brewline.app/"),
            "https://dash.brewline.app"
        );
        assert_eq!(
            normalize_base_url("dash.brewline.app/api/"),
            "https://dash.brewline.app"
        );
        assert_eq!(
            normalize_base_url("localhost:3000"),
            "http://localhost:3000"
        );
        assert_eq!(
            normalize_base_url("  https://dash.brewline.app/api  "),
            "https://dash.brewline.app"
        );
    }

    #[test]
    fn test_status_error_messages() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED),
            "session token is invalid or expired"
        );
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE).contains("503"));
        assert!(status_error(StatusCode::IM_A_TEAPOT).contains("unexpected"));
    }

    #[test]
    fn test_extract_error_message_prefers_server_text() {
        let msg = extract_error_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message": "customer phone is required"}"#,
        );
        assert_eq!(msg, "customer phone is required");

        let with_details = extract_error_message(
            StatusCode::BAD_REQUEST,
            r#"{"error": "validation failed", "details": {"field": "items"}}"#,
        );
        assert!(with_details.starts_with("validation failed:"));
        assert!(with_details.contains("items"));

        let plain = extract_error_message(StatusCode::BAD_GATEWAY, "upstream exploded");
        assert!(plain.contains("upstream exploded"));

        let empty = extract_error_message(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(empty.contains("server error"));
    }

    #[test]
    fn test_update_shapes_order_put_then_patch() {
        let shapes = update_shapes("ord-1", json!({ "status": "confirmed" }));
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].method, Method::PUT);
        assert_eq!(shapes[1].method, Method::PATCH);
        assert_eq!(shapes[0].path, "/api/orders/ord-1");
        assert_eq!(shapes[0].body, shapes[1].body);
    }

    #[test]
    fn test_soft_delete_shapes_body_then_query() {
        let shapes = soft_delete_shapes("ord-7", DeletedFrom::OrderCard);
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].method, Method::DELETE);
        assert_eq!(shapes[0].body, Some(json!({ "deletedFrom": "orderCard" })));
        assert!(shapes[1].path.contains("deletedFrom=orderCard"));
        assert!(shapes[1].body.is_none());
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_on_retriable_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = with_retry(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ApiError::Status {
                    status: 503,
                    message: "dashboard server error".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_terminal_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = with_retry(&fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ApiError::Status {
                    status: 422,
                    message: "bad payload".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_mid_policy() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 1 {
                    Err(ApiError::Timeout {
                        url: "https://dash.example".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
