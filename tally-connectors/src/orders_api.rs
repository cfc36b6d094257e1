//! Order-management REST API client.
//!
//! Pulls shipped orders for a trailing lookback window, paginated until the
//! upstream returns an empty page. The fetch is all-or-nothing: any failed
//! page aborts the whole cycle so the reconciler never sees a partial order
//! set. Authentication is a static `x-api-key` header.

use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use tally_domain::{OrderLine, Serial, ShippedOrder};

// =============================================================================
// Constants
// =============================================================================

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default page size for order listing
const DEFAULT_PAGE_SIZE: u32 = 100;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in the order API client.
#[derive(Debug, Clone, Error)]
pub enum OrdersApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// API returned a non-success status
    #[error("Order API error: HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

// =============================================================================
// Client
// =============================================================================

/// REST client for the external order-management API.
pub struct OrdersClient {
    /// HTTP client
    client: Client,
    /// API base URL (no trailing slash)
    base_url: String,
    /// Static API key sent as `x-api-key`
    api_key: String,
    /// Page size for the order listing
    page_size: u32,
}

impl OrdersClient {
    /// Create a new order API client.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the listing page size (mainly for tests).
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Fetch every order shipped between local midnight today and now.
    ///
    /// The upstream filter (`updated_at_min`) trails `lookback_days` behind
    /// the window so late-updated orders still page in; the shipped-at
    /// window itself is enforced client-side.
    ///
    /// # Errors
    /// Any failed or unparsable page fails the whole fetch; partial results
    /// are never returned.
    pub async fn fetch_shipped(&self, lookback_days: i64) -> Result<Vec<ShippedOrder>, OrdersApiError> {
        let window_start = local_midnight_today();
        let updated_at_min = (window_start - Duration::days(lookback_days)).to_rfc3339();

        let mut orders = Vec::new();
        let mut page = 1u32;
        loop {
            let raw = self.fetch_page(&updated_at_min, page).await?;
            if raw.is_empty() {
                break;
            }
            collect_in_window(raw, window_start, &mut orders)?;
            page += 1;
        }

        debug!(count = orders.len(), pages = page - 1, "Fetched shipped orders");
        Ok(orders)
    }

    /// Fetch one page of the shipped-order listing.
    async fn fetch_page(&self, updated_at_min: &str, page: u32) -> Result<Vec<WireOrder>, OrdersApiError> {
        let url = format!("{}/orders", self.base_url);
        let page_size = self.page_size.to_string();
        let page = page.to_string();

        let response = timeout(
            std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.client
                .get(&url)
                .header("x-api-key", &self.api_key)
                .header("accept", "application/json")
                .query(&[
                    ("status", "shipped"),
                    ("updated_at_min", updated_at_min),
                    ("page_size", page_size.as_str()),
                    ("page", page.as_str()),
                ])
                .send(),
        )
        .await
        .map_err(|_| OrdersApiError::Timeout)?
        .map_err(|e| OrdersApiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OrdersApiError::ParseError(e.to_string()))?;

        if !status.is_success() {
            return Err(OrdersApiError::ApiError { status: status.as_u16(), body });
        }

        serde_json::from_str(&body).map_err(|e| OrdersApiError::ParseError(e.to_string()))
    }
}

/// Local midnight today, in UTC.
fn local_midnight_today() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        // Midnight squeezed out by a DST jump; the current instant is the
        // earliest the window can start.
        .unwrap_or(now)
        .with_timezone(&Utc)
}

/// Convert a fetched page, keeping orders shipped at/after the window start.
/// Orders without a shipped timestamp are skipped; a malformed timestamp
/// fails the page (and with it the cycle).
fn collect_in_window(
    raw: Vec<WireOrder>,
    window_start: DateTime<Utc>,
    out: &mut Vec<ShippedOrder>,
) -> Result<(), OrdersApiError> {
    for order in raw {
        let Some(shipped_at) = order.shipped_at_utc()? else {
            continue;
        };
        if shipped_at >= window_start {
            out.push(order.into_domain(shipped_at));
        }
    }
    Ok(())
}

// =============================================================================
// Wire types (from API responses)
// =============================================================================

/// One order object as the upstream API returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct WireOrder {
    /// Order number (the reconciler's order id)
    pub number: String,
    /// Shipment timestamp, ISO-8601 with UTC suffix
    pub shipped_at: Option<String>,
    /// Free-text operator notes; each non-empty text is a candidate serial
    #[serde(default)]
    pub employee_notes: Vec<WireNote>,
    /// Warehouse allocations, each carrying line items
    #[serde(default)]
    pub allocations: Vec<WireAllocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireNote {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAllocation {
    #[serde(default)]
    pub line_items: Vec<WireLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireLineItem {
    pub sellable: Option<WireSellable>,
    #[serde(default)]
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireSellable {
    #[serde(default)]
    pub sku_code: String,
}

impl WireOrder {
    /// Parse the shipped timestamp, if present.
    fn shipped_at_utc(&self) -> Result<Option<DateTime<Utc>>, OrdersApiError> {
        match &self.shipped_at {
            None => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| {
                    OrdersApiError::ParseError(format!("Invalid shipped_at {raw:?}: {e}"))
                }),
        }
    }

    /// Normalize into the domain form: notes become trimmed candidate
    /// serials (empties dropped), line items flatten across allocations.
    /// Both keep the upstream order, which the binding walk relies on.
    fn into_domain(self, shipped_at: DateTime<Utc>) -> ShippedOrder {
        let serials = self
            .employee_notes
            .iter()
            .filter_map(|note| Serial::new(&note.text).ok())
            .collect();

        let lines = self
            .allocations
            .into_iter()
            .flat_map(|allocation| allocation.line_items)
            .map(|item| OrderLine {
                sku: item.sellable.map(|s| s.sku_code).unwrap_or_default(),
                quantity: item.quantity,
            })
            .collect();

        ShippedOrder { order_id: self.number, shipped_at, serials, lines }
    }
}

// =============================================================================
// Tests
// =============================================================================
