use super::schema::InterceptorConfig;
use crate::error::{ConfigError, Result};
use crate::plugin::config::validate_timeout;
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use std::collections::HashSet;
use std::path::Path;

const ENV_PREFIX: &str = "MCP_INTERCEPTOR_";

pub fn load_from_env_or_file() -> Result<InterceptorConfig> {
    let config: InterceptorConfig = Figment::new()
        // Try to load from various config files
        .merge(Toml::file("mcp-interceptor.toml"))
        .merge(Json::file("mcp-interceptor.json"))
        .merge(Yaml::file("mcp-interceptor.yaml"))
        .merge(Yaml::file("mcp-interceptor.yml"))
        // Override with environment variables (MCP_INTERCEPTOR_ prefix, "__" for nesting)
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    let config = apply_env_substitutions(config)?;
    validate(&config)?;

    Ok(config)
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<InterceptorConfig> {
    let path = path.as_ref();

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    let config: InterceptorConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    let config = apply_env_substitutions(config)?;
    validate(&config)?;

    Ok(config)
}

pub fn validate(config: &InterceptorConfig) -> Result<()> {
    validate_timeout("defaultTimeoutMs", config.default_timeout_ms).map_err(ConfigError::Validation)?;

    for (name, settings) in &config.plugins {
        settings.validate(name).map_err(ConfigError::Validation)?;
    }

    if let Some(rate_limit) = &config.rate_limit {
        if rate_limit.window_ms == 0 {
            return Err(ConfigError::Validation("rateLimit.windowMs must be greater than 0".into()).into());
        }
        if rate_limit.max_requests == 0 {
            return Err(
                ConfigError::Validation("rateLimit.maxRequests must be greater than 0".into()).into(),
            );
        }
        if rate_limit.sweep_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "rateLimit.sweepIntervalMs must be greater than 0".into(),
            )
            .into());
        }
        if rate_limit.key_field.is_empty() {
            return Err(ConfigError::Validation("rateLimit.keyField cannot be empty".into()).into());
        }
        if let Some(burst) = &rate_limit.burst {
            if burst.window_ms == 0 || burst.max_requests == 0 {
                return Err(ConfigError::Validation(
                    "rateLimit.burst windowMs and maxRequests must be greater than 0".into(),
                )
                .into());
            }
            if burst.window_ms >= rate_limit.window_ms {
                return Err(ConfigError::Validation(format!(
                    "rateLimit.burst.windowMs ({}) must be shorter than rateLimit.windowMs ({})",
                    burst.window_ms, rate_limit.window_ms
                ))
                .into());
            }
        }
    }

    if config.usage.default_cost < 0.0 || config.usage.tool_costs.values().any(|c| *c < 0.0) {
        return Err(ConfigError::Validation("usage costs cannot be negative".into()).into());
    }
    if config.usage.channel_capacity == 0 {
        return Err(ConfigError::Validation("usage.channelCapacity must be greater than 0".into()).into());
    }

    Ok(())
}

fn apply_env_substitutions(mut config: InterceptorConfig) -> Result<InterceptorConfig> {
    // Tool filters and dependency names
    for settings in config.plugins.values_mut() {
        if let Some(include) = settings.include_tools.take() {
            settings.include_tools = Some(substitute_set(include)?);
        }
        if let Some(exclude) = settings.exclude_tools.take() {
            settings.exclude_tools = Some(substitute_set(exclude)?);
        }
        for dep in &mut settings.depends_on {
            *dep = substitute_env_vars(dep)?;
        }
    }

    if let Some(rate_limit) = &mut config.rate_limit {
        rate_limit.key_field = substitute_env_vars(&rate_limit.key_field)?;
    }

    Ok(config)
}

fn substitute_set(values: HashSet<String>) -> Result<HashSet<String>> {
    values.iter().map(|v| substitute_env_vars(v)).collect()
}

fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                // ${VAR:-default}
                if let Some((name, default)) = var_name.split_once(":-") {
                    match std::env::var(name) {
                        Ok(value) => result = result.replace(&cap[0], &value),
                        Err(_) => result = result.replace(&cap[0], default),
                    }
                } else {
                    return Err(ConfigError::EnvVar(format!(
                        "Environment variable '{var_name}' not found"
                    ))
                    .into());
                }
            }
        }
    }

    Ok(result)
}
