use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;

use lipsync_pipeline::pipeline::{Dispatcher, SubmitRequest, WorkerContext};
use lipsync_pipeline::progress::PipelineStage;
use lipsync_pipeline::text::{self, dialogue};
use lipsync_pipeline::utils::logger::init_logger;
use lipsync_pipeline::utils::process::SystemRunner;
use lipsync_pipeline::utils::tools::check_media_tools;
use lipsync_pipeline::PipelineConfig;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Register { speaker_id, video, text, lang } => {
            let request = SubmitRequest::register(speaker_id, video, text, lang);
            run_task(config, request, cli.quiet).await
        }
        Commands::Speak { speaker_id, text, lang, converse } => {
            let mut request = SubmitRequest::speak(speaker_id, text, lang);
            if converse {
                request = request.conversational();
            }
            run_task(config, request, cli.quiet).await
        }
        Commands::Ask { question } => {
            let engine = dialogue::engine_for(&config).ok_or_else(dialogue::disabled)?;
            let answer = text::answer_only(engine.as_ref(), &question).await?;
            println!("{}", answer);
            Ok(())
        }
        Commands::Tools => {
            let tools = check_media_tools(&SystemRunner, &config).await?;
            println!("{}", serde_json::to_string_pretty(&tools)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    PipelineConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })
}

/// Submit one request, print its progress and wait for the outcome
async fn run_task(config: PipelineConfig, request: SubmitRequest, quiet: bool) -> Result<()> {
    let dispatcher = Dispatcher::new(WorkerContext::from_config(config));
    let mut events = dispatcher.status_store().subscribe();

    let task_id = dispatcher.submit(request)?;
    if !quiet {
        eprintln!("Task {} accepted", task_id);
        let id = task_id.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if event.task_id != id {
                    continue;
                }
                eprintln!("[{:>5.1}%] {}: {}", event.progress, event.stage, event.message);
                if event.stage.is_terminal() {
                    break;
                }
            }
        });
    }

    let Some(status) = dispatcher.wait(&task_id).await else {
        bail!("Task {} disappeared from the status store", task_id);
    };
    println!("{}", serde_json::to_string_pretty(&status)?);

    if status.stage == PipelineStage::Failed {
        std::process::exit(1);
    }
    Ok(())
}
