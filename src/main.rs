use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use arr_router::context::Deps;
use arr_router::coordinator::dispatch_name;
use arr_router::llm::{AnthropicClient, LlmClient};
use arr_router::registry::{PromptOverrides, ServiceProfile};
use arr_router::runner::AgentRunner;
use arr_router::service::RouterService;
use arr_router::tools::{ToolCatalog, filter};
use arr_router::{Answer, RouterError};

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::{RouterConfig, build_catalogs};

fn setup_logging(verbose: bool) -> Result<PathBuf> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("arr-router")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("arr-router.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(log_file)
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Everything the subcommands share
struct Setup {
    config: RouterConfig,
    profile: &'static ServiceProfile,
    prompts: PromptOverrides,
    catalogs: Vec<Arc<dyn ToolCatalog>>,
}

fn prepare(cli: &Cli) -> Result<Setup> {
    let mut config = config::load_config(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(service) = &cli.service {
        config.router.service = service.clone();
    }
    let profile = config.profile()?;
    let prompts = config.prompt_overrides(profile, env_lookup);
    let catalogs = build_catalogs(
        &config.catalogs,
        Duration::from_millis(config.router.tool_timeout_ms),
        env_lookup,
    )
    .context("Failed to build catalogs")?;

    info!(
        "Service {} with {} capability tags and {} catalog(s)",
        profile.display_name,
        profile.tags.len(),
        catalogs.len()
    );
    Ok(Setup {
        config,
        profile,
        prompts,
        catalogs,
    })
}

async fn run_application(cli: &Cli) -> Result<()> {
    let setup = prepare(cli)?;

    match &cli.command {
        Commands::Ask { text, deps } => handle_ask_command(text, deps.as_deref(), &setup, cli.is_verbose()).await,
        Commands::Registry => handle_registry_command(&setup),
        Commands::Tools { tag } => handle_tools_command(tag.as_deref(), &setup),
    }
}

async fn handle_ask_command(text: &str, deps: Option<&str>, setup: &Setup, verbose: bool) -> Result<()> {
    let deps = match deps {
        Some(raw) => Deps::new(serde_json::from_str(raw).context("--deps is not valid JSON")?),
        None => Deps::default(),
    };

    let llm = AnthropicClient::new(setup.config.llm.anthropic_config()).context("Failed to create LLM client")?;
    if !llm.is_ready() {
        eyre::bail!("{} is set but empty", setup.config.llm.api_key_env);
    }
    let runner = Arc::new(AgentRunner::with_config(
        Arc::new(llm),
        setup.config.llm.model_settings(),
        setup.config.runner_config(),
    ));
    let service = RouterService::from_profile(
        setup.profile,
        &setup.prompts,
        setup.catalogs.clone(),
        runner,
        &setup.config.service_options(),
    )?;
    if let Some(warning) = service.warnings().first() {
        eprintln!(
            "{} {} ({} capability domain(s) affected)",
            "Warning:".yellow(),
            warning,
            service.warnings().len()
        );
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            on_interrupt.cancel();
        }
    });

    let answer = settle_answer(service.ask_with_cancel(text, deps, cancel).await)?;

    println!("{}", answer.text);
    if verbose {
        println!();
        println!("{} {}", "Request:".cyan(), answer.request_id);
        println!(
            "{} {} (~${:.4})",
            "Usage:".cyan(),
            answer.usage,
            answer.usage.cost_usd(&setup.config.llm.model)
        );
        for record in &answer.trace.dispatches {
            let status = match record.outcome.reason() {
                None => "ok".green(),
                Some(reason) => reason.red(),
            };
            println!(
                "  #{} {} [{}] {:?} {}",
                record.index,
                dispatch_name(&record.tag),
                status,
                record.duration(),
                record.usage
            );
        }
    }
    Ok(())
}

/// An interrupted request is an error too, so the exit status tells it apart
fn settle_answer(result: arr_router::Result<Answer>) -> Result<Answer> {
    match result {
        Ok(answer) => Ok(answer),
        Err(RouterError::Cancelled) => {
            eprintln!("{}", "Request cancelled".red());
            eyre::bail!("Request cancelled before an answer was produced")
        }
        Err(e) => Err(e).context("Request failed"),
    }
}

fn handle_registry_command(setup: &Setup) -> Result<()> {
    let registry = setup.profile.registry(&setup.prompts)?;
    println!(
        "{} {} ({} entries)",
        "Registry:".green(),
        setup.profile.display_name,
        registry.len()
    );
    for entry in registry.iter() {
        let tools: usize = setup
            .catalogs
            .iter()
            .map(|c| filter(c.as_ref(), entry.tag().as_str()).toolset.len())
            .sum();
        println!(
            "  {:<36} {:<44} {} tool(s)",
            dispatch_name(entry.tag().as_str()),
            entry.identity(),
            tools
        );
    }
    Ok(())
}

fn handle_tools_command(tag: Option<&str>, setup: &Setup) -> Result<()> {
    if setup.catalogs.is_empty() {
        println!("{}", "No catalogs configured".yellow());
        return Ok(());
    }
    for catalog in &setup.catalogs {
        let tools = match catalog.enumerate() {
            Ok(tools) => tools,
            Err(e) => {
                println!("{} {}", "Warning:".yellow(), e);
                continue;
            }
        };
        println!("{} {}", "Catalog:".green(), catalog.name());
        for tool in tools.iter().filter(|t| tag.is_none_or(|tag| t.has_tag(tag))) {
            let tags: Vec<&str> = tool.tags().iter().map(String::as_str).collect();
            println!("  {:<40} [{}] {}", tool.name(), tags.join(", ").cyan(), tool.description());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli).await.context("Application failed")?;

    Ok(())
}
