use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber for a host process.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to this crate. Fails
/// if a global subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("mcp_tool_interceptor={level}")))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
