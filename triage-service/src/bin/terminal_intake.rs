use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use triage_flow::{
    ChatRequest, ControllerConfig, HistoryEntry, InMemoryAssessmentStore, MessageRole,
    RigInference, conversation::DEFAULT_MAX_TURNS, rig_bridge::DEFAULT_MODEL,
};
use triage_service::build_intake_runner;

/// Console symptom intake: chat with the assistant, then print the triage result
#[derive(Parser, Debug)]
#[command(name = "terminal_intake")]
struct Args {
    /// Model id passed to OpenRouter
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value_t = DEFAULT_MAX_TURNS)]
    max_turns: usize,

    #[arg(long, default_value = "Console Patient")]
    name: String,

    #[arg(long, default_value = "console@localhost")]
    email: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let args = Args::parse();

    let Ok(api_key) = std::env::var("OPENROUTER_API_KEY") else {
        error!("OPENROUTER_API_KEY environment variable not set");
        return Ok(());
    };

    let inference = Arc::new(RigInference::openrouter(&api_key, &args.model));
    let runner = build_intake_runner(
        inference,
        Arc::new(InMemoryAssessmentStore::new()),
        ControllerConfig {
            max_turns: args.max_turns,
            ..ControllerConfig::default()
        },
    );

    let mut history: Vec<HistoryEntry> = Vec::new();
    let mut message = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let reply = runner
            .handle(ChatRequest {
                message: message.clone(),
                history: history.clone(),
                patient_name: args.name.clone(),
                patient_email: args.email.clone(),
            })
            .await?;

        if !message.is_empty() {
            history.push(HistoryEntry {
                role: MessageRole::User,
                content: message.clone(),
            });
        }
        history.push(HistoryEntry {
            role: MessageRole::Assistant,
            content: reply.response.clone(),
        });
        println!("Assistant: {}", reply.response);

        if reply.finished {
            info!(notes = ?reply.notes, "Intake finished");
            if let Some(level) = reply.esi_level {
                println!("\nRecorded notes: {}", reply.notes.join("; "));
                println!("ESI level: {level}");
            }
            break;
        }

        message = loop {
            print!("User: ");
            std::io::stdout().flush()?;
            match stdin.next_line().await? {
                Some(line) if !line.trim().is_empty() => break line.trim().to_string(),
                Some(_) => continue,
                None => return Ok(()),
            }
        };
    }

    Ok(())
}
