//! localai-router - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use localai_router::{
    cli::{Args, Commands, SnapshotCommand},
    config::Config,
    health::HealthStatus,
    router::{AiRequest, AiResponse, Provenance, RequestKind},
    snapshot::BackupRecord,
    telemetry, AppContext,
};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Commands::Config { init } = &args.command {
        return show_config(args.config.clone(), *init);
    }

    let config = Config::load(args.config.clone())?;
    localai_router::logging::init(&config.logging.filter, args.verbose);

    let context = AppContext::build(config)?;

    match &args.command {
        Commands::Detect => run_detect(&context).await?,
        Commands::Health => run_health(&context).await?,
        Commands::Ask { prompt, model, stream } => {
            run_ask(&context, prompt, model.as_deref(), *stream).await?
        }
        Commands::Embed { texts } => {
            let request = AiRequest::new(RequestKind::Embedding, texts.clone());
            route_and_print(&context, request).await?;
        }
        Commands::Search {
            query,
            collection,
            limit,
            documents,
        } => {
            let mut request = AiRequest::new(RequestKind::VectorSearch, query.as_str());
            if let Some(collection) = collection {
                request = request.with_option("collection", collection.as_str());
            }
            if let Some(limit) = limit {
                request = request.with_option("limit", *limit);
            }
            if let Some(path) = documents {
                request = request.with_option("documents", read_json(path)?);
            }
            route_and_print(&context, request).await?;
        }
        Commands::Analyze { text } => {
            let request = AiRequest::new(RequestKind::SemanticAnalysis, text.as_str());
            route_and_print(&context, request).await?;
        }
        Commands::Route { kind, input } => {
            route_and_print(&context, AiRequest::new(*kind, input.as_str())).await?;
        }
        Commands::Snapshot(command) => run_snapshot(&context, command).await?,
        Commands::Run => run_service(&context).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn mark(flag: bool) -> colored::ColoredString {
    if flag {
        "yes".green()
    } else {
        "no".red()
    }
}

async fn run_detect(context: &AppContext) -> Result<()> {
    let pb = spinner("Detecting local capabilities...");
    let capabilities = context.detector.detect().await;
    let profile = capabilities.deployment_profile();
    pb.finish_and_clear();

    println!("{}", "Capabilities".bold());
    println!("  Accelerated compute:   {}", mark(capabilities.has_accelerated_compute));
    println!("  Local inference:       {}", mark(capabilities.has_local_inference_server));
    println!("  Vector store:          {}", mark(capabilities.has_vector_store));
    println!("  Embedding server:      {}", mark(capabilities.has_embedding_server));
    println!("  Memory:                {:.1} GB", capabilities.memory_gb);
    println!("  CPU cores:             {}", capabilities.cpu_cores);
    println!("  Local deployment:      {}", mark(capabilities.is_local_deployment));

    if !capabilities.local_model_names.is_empty() {
        println!("\n{}", "Models".bold());
        for model in &capabilities.local_model_names {
            println!("  • {}", model);
        }
    }

    println!("\n{}", "Deployment profile".bold());
    println!("  Fallback mode:         {}", profile.fallback_mode);
    println!("  Vector search:         {}", mark(profile.vector_search_enabled));
    println!("  Semantic intelligence: {}", mark(profile.semantic_intelligence_enabled));
    println!("  Layout mutation:       {}", mark(profile.layout_mutation_enabled));
    println!("  Max concurrent:        {}", profile.max_concurrent_requests);

    Ok(())
}

async fn run_health(context: &AppContext) -> Result<()> {
    let pb = spinner("Probing services...");
    let summary = context.monitor.poll_once().await;
    pb.finish_and_clear();

    let Some(summary) = summary else {
        println!("{}", "Hosted deployment: health checks are skipped".yellow());
        return Ok(());
    };

    for record in context.monitor.records() {
        let status = match record.status {
            HealthStatus::Healthy => record.status.to_string().green(),
            HealthStatus::Degraded => record.status.to_string().yellow(),
            HealthStatus::Offline => record.status.to_string().red(),
        };
        print!(
            "  {:<14} {:<9} {:>5}ms  {}",
            record.name, status, record.last_response_time_ms, record.endpoint_url
        );
        match &record.last_error {
            Some(error) => println!("  ({})", error.dimmed()),
            None => println!(),
        }
    }

    println!(
        "\n{}/{} services healthy ({:.0}%)",
        summary.healthy, summary.total, summary.percentage
    );

    Ok(())
}

async fn run_ask(context: &AppContext, prompt: &str, model: Option<&str>, stream: bool) -> Result<()> {
    context.warm_up().await;

    let mut request = AiRequest::new(RequestKind::Generation, prompt);
    if let Some(model) = model {
        request = request.with_option("model", model);
    }

    let response = if stream {
        let mut streamed = false;
        let response = context
            .router
            .process_stream(request, &mut |token: &str| {
                streamed = true;
                print!("{}", token);
                let _ = std::io::stdout().flush();
            })
            .await;
        if streamed {
            println!();
        }
        if response.provenance() == Provenance::Local {
            print_provenance(&response);
            return Ok(());
        }
        response
    } else {
        let pb = spinner("Generating...");
        let response = context.router.process(request).await;
        pb.finish_and_clear();
        response
    };

    match response.payload().and_then(|p| p.get("text")).and_then(Value::as_str) {
        Some(text) if response.success() => {
            println!("{}", text);
            print_provenance(&response);
            Ok(())
        }
        _ => print_response(&response),
    }
}

async fn route_and_print(context: &AppContext, request: AiRequest) -> Result<()> {
    context.warm_up().await;

    let pb = spinner(&format!("Routing {} request...", request.kind));
    let response = context.router.process(request).await;
    pb.finish_and_clear();

    print_response(&response)
}

fn print_provenance(response: &AiResponse) {
    let label = match response.provenance() {
        Provenance::Local => "local".green(),
        Provenance::Fallback => "fallback".yellow(),
    };
    eprintln!("{} {}ms", label, response.processing_time_ms());
}

fn print_response(response: &AiResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    print_provenance(response);

    if let Some(error) = response.error_message() {
        anyhow::bail!("Request failed: {}", error);
    }
    Ok(())
}

async fn run_snapshot(context: &AppContext, command: &SnapshotCommand) -> Result<()> {
    match command {
        SnapshotCommand::Capture => {
            context.warm_up().await;
            match context.scheduler.run_once().await? {
                Some(record) => print_record(&record),
                None => println!("{}", "State unchanged, no snapshot written".yellow()),
            }
        }
        SnapshotCommand::Manual {
            reason,
            file,
            pre_migration,
        } => {
            let state = match file {
                Some(path) => read_json(path)?,
                None => {
                    context.warm_up().await;
                    context.runtime_state().await?
                }
            };
            let record = if *pre_migration {
                context.snapshots.create_pre_migration(&state, reason)?
            } else {
                context.snapshots.create_manual(&state, reason)?
            };
            print_record(&record);
        }
        SnapshotCommand::List => {
            let records = context.snapshots.list();
            if records.is_empty() {
                println!("No snapshots stored.");
                return Ok(());
            }
            for record in &records {
                print_record(record);
            }
            println!(
                "\n{} of {} snapshots, {} bytes",
                records.len(),
                context.snapshots.max_backup_files(),
                context.snapshots.total_size_bytes()
            );
        }
        SnapshotCommand::Delete { id } => {
            context.snapshots.delete(id)?;
            println!("{} Deleted snapshot {}", "✓".green(), id);
        }
        SnapshotCommand::Restore { id, output } => {
            let state = context.snapshots.restore(id)?;
            let rendered = serde_json::to_string_pretty(&state)?;
            match output {
                Some(path) => {
                    std::fs::write(path, rendered)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} Restored {} to {}", "✓".green(), id, path.display());
                }
                None => println!("{}", rendered),
            }
        }
    }

    Ok(())
}

fn print_record(record: &BackupRecord) {
    println!(
        "  {}  {}  {:<13} {:>7}B  {}  {}",
        record.id.bold(),
        record.captured_at.format("%Y-%m-%d %H:%M:%S"),
        record.triggered_by.to_string(),
        record.size_bytes,
        &record.state_hash[..record.state_hash.len().min(12)],
        record.reason.as_deref().unwrap_or("")
    );
}

async fn run_service(context: &AppContext) -> Result<()> {
    context.start().await;
    println!(
        "{} Router running, press Ctrl-C to stop",
        "●".green()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    context.shutdown();
    telemetry::display_summary(&context.telemetry);
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn show_config(path: Option<PathBuf>, init: bool) -> Result<()> {
    if init {
        let target = path
            .clone()
            .or_else(Config::default_path)
            .context("No home directory for the default config path")?;
        if target.exists() {
            println!("Config already exists: {}", target.display());
        } else {
            Config::default().save(&target)?;
            println!("{} Wrote {}", "✓".green(), target.display());
        }
    }

    let config = Config::load(path)?;
    println!("{}", "Configuration".bold());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
