//! Nectar - 自然语言到 SQL 的阶段化智能体
//!
//! 入口：加载配置、连接 PostgreSQL、装配工具注册表与编排器，
//! 跑一个命令行问题到终止并打印最终报告。

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use nectar::config::load_config;
use nectar::core::{Agent, AgentEvent, Termination};
use nectar::db::{DatabaseExecutor, PostgresExecutor};
use nectar::execute::{ColumnRepairEngine, ResultCache};
use nectar::llm::{OpenAiTurnExecutor, TurnExecutor};
use nectar::semantic::YamlCatalog;
use nectar::tools::{build_registry, ToolExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nectar::observability::init();

    let question: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        anyhow::bail!("usage: nectar <question>");
    }

    let config = load_config(None).context("Failed to load config")?;

    let database_url = config
        .database
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("database.url or DATABASE_URL must be set")?;
    let db: Arc<dyn DatabaseExecutor> = Arc::new(
        PostgresExecutor::connect(&database_url, config.database.max_connections)
            .await
            .context("Failed to connect to PostgreSQL")?,
    );
    if !db.test_connection().await {
        tracing::warn!("connection test failed, continuing anyway");
    }

    let catalog_root = config
        .catalog
        .root
        .clone()
        .unwrap_or_else(|| "entities".into());
    let catalog = Arc::new(YamlCatalog::new(catalog_root));

    let cache = Arc::new(ResultCache::with_settings(
        std::time::Duration::from_secs(config.cache.ttl_secs),
        config.cache.capacity,
    ));
    let repair = Arc::new(ColumnRepairEngine::new());
    let registry = build_registry(db, catalog.clone(), cache, repair);
    let tools = ToolExecutor::new(registry, config.agent.tool_timeout_secs);

    let turn_executor = Arc::new(OpenAiTurnExecutor::new(
        config.llm.base_url.as_deref(),
        &config.llm.model,
        config.llm.api_key.as_deref(),
    ));

    let agent = Agent::new(turn_executor.clone(), tools, catalog)
        .with_max_steps(config.agent.max_steps);

    // 过程事件打印到 stderr，最终报告打印到 stdout
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<AgentEvent>();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match &ev {
                AgentEvent::PhaseChanged { phase } => eprintln!("== phase: {} ==", phase),
                AgentEvent::MessageText { text } => eprintln!("{}", text),
                AgentEvent::ToolCall { tool, .. } => eprintln!("-> {}", tool),
                AgentEvent::Observation { tool, preview } => {
                    eprintln!("<- {}: {}", tool, preview)
                }
                AgentEvent::Error { text } => eprintln!("error: {}", text),
                _ => {}
            }
        }
    });

    let result = agent
        .run(&question, CancellationToken::new(), Some(&event_tx))
        .await;
    drop(event_tx);
    let _ = printer.await;

    let result = result.context("Agent run failed")?;
    let (prompt_tokens, completion_tokens, total_tokens) = turn_executor.token_usage();
    tracing::info!(
        prompt_tokens,
        completion_tokens,
        total_tokens,
        steps = result.steps.len(),
        "run complete"
    );

    match result.termination {
        Termination::Report => {
            let report = result
                .final_report
                .context("terminated with Report but no payload")?;
            println!("SQL: {}", report.sql);
            println!("Confidence: {:.2}", report.confidence);
            println!();
            println!("{}", report.narrative);
            if !report.preview.is_empty() {
                println!();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report.preview)
                        .unwrap_or_else(|_| "[]".to_string())
                );
            }
        }
        Termination::NoData => {
            println!("No answerable data found for this question.");
        }
        Termination::Clarify => {
            println!("The question needs clarification; see the log above.");
        }
        Termination::BudgetExceeded => {
            anyhow::bail!("step budget exceeded after {} steps", result.steps.len());
        }
    }

    Ok(())
}
