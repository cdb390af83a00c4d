//! Plugins shipped with the interceptor
//!
//! - `rate_limit`: rejects calls once a customer exceeds its sliding window
//! - `usage`: emits one usage event per call for an external billing consumer

pub mod rate_limit;
pub mod usage;

pub use rate_limit::RateLimitPlugin;
pub use usage::{UsageEvent, UsageTrackingPlugin};

use crate::context::ExecutionContext;

/// Metadata key hosts may set to identify the calling customer
pub const CUSTOMER_KEY_METADATA: &str = "customerKey";

pub(crate) const ANONYMOUS_CUSTOMER: &str = "anonymous";

/// Resolve the customer key of a call.
///
/// Looks at the `key_field` argument first, then the `customerKey`
/// metadata entry, and falls back to `"anonymous"`.
pub async fn customer_key(ctx: &ExecutionContext, key_field: &str) -> String {
    if let Some(value) = ctx.arg(key_field).await {
        if let Some(key) = value.as_str().filter(|k| !k.is_empty()) {
            return key.to_string();
        }
    }

    ctx.metadata()
        .get(CUSTOMER_KEY_METADATA)
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| ANONYMOUS_CUSTOMER.to_string())
}
