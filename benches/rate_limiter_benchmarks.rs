/// Performance benchmarks for the rate limiter and the hook pipeline
///
/// - Sliding-window checks for a hot key and for many distinct keys
/// - Burst overlay cost
/// - Full intercepted call with a small plugin chain
use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mcp_tool_interceptor::config::RateLimitConfig;
use mcp_tool_interceptor::context::{handler_fn, ExecutionContext, ToolArgs, ToolHandler, ToolResult};
use mcp_tool_interceptor::interceptor::intercept;
use mcp_tool_interceptor::plugin::{
    ExecutionMode, HookChain, HookOutcome, PluginDescriptor, PluginManager, PluginSettings,
    ToolPlugin,
};
use mcp_tool_interceptor::ratelimit::SlidingWindowRateLimiter;
use serde_json::json;
use std::sync::Arc;

fn bench_sliding_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("SlidingWindow");

    // Short windows keep the hot key's retained events bounded
    let limiter = SlidingWindowRateLimiter::new(&RateLimitConfig::new(100, u32::MAX));
    group.bench_function("hot_key", |b| {
        b.iter(|| black_box(limiter.is_allowed(black_box("customer-1"))))
    });

    for keys in [100usize, 10_000] {
        let limiter = SlidingWindowRateLimiter::new(&RateLimitConfig::new(60_000, 1_000));
        let names: Vec<String> = (0..keys).map(|i| format!("customer-{i}")).collect();
        group.bench_with_input(BenchmarkId::new("distinct_keys", keys), &names, |b, names| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % names.len();
                black_box(limiter.is_allowed(&names[i]))
            })
        });
    }

    let burst = SlidingWindowRateLimiter::new(
        &RateLimitConfig::new(100, u32::MAX).with_burst(10, u32::MAX),
    );
    group.bench_function("with_burst", |b| {
        b.iter(|| black_box(burst.is_allowed(black_box("customer-1"))))
    });

    group.bench_function("get_status", |b| {
        b.iter(|| black_box(limiter.get_status(black_box("customer-1"))))
    });

    group.finish();
}

struct Tagger;

#[async_trait]
impl ToolPlugin for Tagger {
    async fn before_tool_call(&self, ctx: &ExecutionContext) -> anyhow::Result<HookOutcome> {
        ctx.set_plugin_data("tagger", json!(true));
        Ok(HookOutcome::Continue)
    }

    async fn after_tool_call(
        &self,
        _ctx: &ExecutionContext,
        result: ToolResult,
    ) -> anyhow::Result<ToolResult> {
        Ok(result)
    }
}

fn chain_for(mode: ExecutionMode, plugins: usize, rt: &tokio::runtime::Runtime) -> HookChain {
    let manager = Arc::new(PluginManager::new(1_000));
    for i in 0..plugins {
        manager
            .register(
                PluginDescriptor::new(
                    format!("tagger-{i}"),
                    "1.0.0",
                    i as i32,
                    PluginSettings::fail_open(),
                ),
                Arc::new(Tagger),
            )
            .unwrap();
    }
    rt.block_on(manager.initialize_all());
    HookChain::new(manager, mode)
}

fn bench_intercepted_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("InterceptedCall");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let handler: ToolHandler = handler_fn(|_args: ToolArgs| async { Ok(ToolResult::text("ok")) });

    for mode in [ExecutionMode::Serial, ExecutionMode::Parallel] {
        let chain = chain_for(mode, 5, &rt);
        group.bench_function(format!("{mode:?}_5_plugins"), |b| {
            b.to_async(&rt).iter(|| async {
                let (result, _) = intercept(&chain, "bench", &handler, ToolArgs::new()).await;
                black_box(result)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sliding_window, bench_intercepted_call);
criterion_main!(benches);
