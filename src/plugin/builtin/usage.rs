use super::customer_key;
use crate::config::UsageConfig;
use crate::context::{ExecutionContext, ToolResult};
use crate::plugin::config::PluginSettings;
use crate::plugin::hook::ToolPlugin;
use crate::plugin::schema::PluginDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// One tool call as seen by billing; persistence is up to the consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub tool_name: String,
    pub customer_key: String,
    pub cost: f64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

/// Emits a [`UsageEvent`] after every call, including failed and
/// short-circuited ones. Never changes the result.
pub struct UsageTrackingPlugin {
    sender: mpsc::Sender<UsageEvent>,
    usage: UsageConfig,
    key_field: String,
}

impl UsageTrackingPlugin {
    pub const NAME: &'static str = "usage-tracking";
    pub const DEFAULT_PRIORITY: i32 = 0;

    /// Create the plugin and the receiving end of its event channel
    pub fn channel(
        usage: UsageConfig,
        key_field: impl Into<String>,
    ) -> (Self, mpsc::Receiver<UsageEvent>) {
        let (sender, receiver) = mpsc::channel(usage.channel_capacity.max(1));
        (
            Self {
                sender,
                usage,
                key_field: key_field.into(),
            },
            receiver,
        )
    }

    /// Default registration: runs last in the after phase, fails open
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(
            Self::NAME,
            env!("CARGO_PKG_VERSION"),
            Self::DEFAULT_PRIORITY,
            PluginSettings::fail_open(),
        )
    }
}

#[async_trait]
impl ToolPlugin for UsageTrackingPlugin {
    async fn after_tool_call(
        &self,
        ctx: &ExecutionContext,
        result: ToolResult,
    ) -> anyhow::Result<ToolResult> {
        let event = UsageEvent {
            tool_name: ctx.tool_name().to_string(),
            customer_key: customer_key(ctx, &self.key_field).await,
            cost: self.usage.cost_for(ctx.tool_name()),
            success: !result.is_error,
            timestamp: ctx.metadata().timestamp(),
            request_id: ctx.request_id().to_string(),
        };

        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    tool = %event.tool_name,
                    request_id = %event.request_id,
                    "Usage channel full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                debug!(request_id = %event.request_id, "Usage consumer gone, dropping event");
            }
        }

        Ok(result)
    }
}
