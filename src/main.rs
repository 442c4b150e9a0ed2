//! Quill 命令行入口
//!
//! 用法：`quill [--config <path>] [request...]`。带参数时处理一个请求；否则从 stdin 逐行读取请求。
//! 事件输出到 stderr，响应输出到 stdout；Ctrl-C 取消正在处理的请求，空闲等待输入时则退出。

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use quill::config::load_config;
use quill::deps::DependencyResolver;
use quill::events::EventBus;
use quill::llm::{create_llm_from_config, LlmClient};
use quill::observability;
use quill::policy::SafetyPolicy;
use quill::storage::open_storage;
use quill::{Pipeline, StateManager};

struct Args {
    config: Option<PathBuf>,
    request: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            _ => words.push(arg),
        }
    }
    let request = (!words.is_empty()).then(|| words.join(" "));
    Ok(Args { config, request })
}

async fn handle(pipeline: &mut Pipeline, request: &str) -> anyhow::Result<bool> {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, cancelling request");
            watcher.cancel();
        }
    });

    let response = pipeline.process(request, &cancel).await;
    ctrl_c.abort();

    let (prompt, completion, total) = pipeline.llm().token_usage();
    tracing::info!(prompt, completion, total, "Token usage so far");

    println!("{}", response.content);
    if !response.changed_files.is_empty() {
        println!("\nChanged files:");
        for path in &response.changed_files {
            println!("  {}", path);
        }
    }
    Ok(response.success)
}

/// 读取下一条非空请求；EOF 或 shutdown 先完成时返回 None
async fn next_request<R, S, T>(lines: &mut Lines<R>, shutdown: S) -> anyhow::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = T>,
{
    tokio::pin!(shutdown);
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = &mut shutdown => {
                tracing::info!("Ctrl-C received, exiting");
                return Ok(None);
            }
        };
        match line {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(Some(line.trim().to_string())),
            None => return Ok(None),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config).context("Failed to load config")?;

    let storage = open_storage(&cfg.app).context("Failed to open state storage")?;
    let mut state = StateManager::new(storage, cfg.state_config());
    state.initialize(None).context("Failed to initialize state")?;

    let events = Arc::new(EventBus::new());
    let (_listener, mut rx) = events.subscribe_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => eprintln!("{}", line),
                Err(e) => tracing::warn!("Failed to serialize event: {}", e),
            }
        }
    });

    let mut pipeline = Pipeline::new(state, create_llm_from_config(&cfg))
        .with_events(events)
        .with_policy(Arc::new(SafetyPolicy::new(cfg.policy_config())))
        .with_resolver(DependencyResolver::new(cfg.resolver_config()))
        .with_config(cfg.pipeline_config());

    let mut all_ok = true;
    if let Some(request) = args.request {
        all_ok = handle(&mut pipeline, &request).await?;
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = next_request(&mut lines, tokio::signal::ctrl_c()).await? {
            all_ok &= handle(&mut pipeline, &line).await?;
        }
    }

    // 释放事件总线后打印任务自然结束
    drop(pipeline);
    let _ = printer.await;

    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}
