//! Chatterbox CLI: typed chat and push-to-talk against the configured agent.
//!
//! Usage:
//!   cargo run -p chatterbox-cli
//!
//! Commands at the prompt:
//!   <text>          send a message
//!   /talk           start recording; press Enter to stop (auto-stops after 30s)
//!   /voice <name>   alloy, echo, fable, onyx, nova or shimmer
//!   /history        print the conversation so far
//!   /quit           exit
//!
//! Settings: config/chatterbox.toml (or CHATTERBOX_CONFIG) and CHATTERBOX__* env vars.

use anyhow::Context;
use chatterbox_voice::{Message, Sender, Settings, TurnOutcome, Voice, VoiceOrchestrator};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().context("loading settings")?;
    info!("Loaded settings: {:?}", settings);
    let orchestrator =
        VoiceOrchestrator::from_settings(&settings).context("building voice orchestrator")?;

    spawn_status_printer(&orchestrator);
    for message in orchestrator.messages() {
        print_message(&message);
    }
    println!("Type a message, /talk to speak, /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut recording = false;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        if recording {
            recording = false;
            let outcome = orchestrator.stop_recording().await;
            report(&orchestrator, outcome);
            if line.is_empty() {
                continue;
            }
        }

        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("", _) => {}
            ("/quit", _) | ("/exit", _) => break,
            ("/talk", _) => {
                if orchestrator.start_recording().await {
                    println!("🎤 Recording... press Enter to stop.");
                    recording = true;
                }
            }
            ("/voice", name) => match name.parse::<Voice>() {
                Ok(voice) => orchestrator.set_voice(voice),
                Err(e) => println!("{} (current: {})", e, orchestrator.voice()),
            },
            ("/history", _) => {
                for message in orchestrator.messages() {
                    print_message(&message);
                }
            }
            _ => {
                let outcome = orchestrator.send_message(line).await;
                report(&orchestrator, outcome);
            }
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

fn spawn_status_printer(orchestrator: &Arc<VoiceOrchestrator>) {
    let mut states = orchestrator.subscribe_state();
    tokio::spawn(async move {
        while let Ok(state) = states.recv().await {
            eprintln!("[{}]", state);
        }
    });
}

fn report(orchestrator: &VoiceOrchestrator, outcome: TurnOutcome) {
    match outcome {
        TurnOutcome::Ignored => {}
        TurnOutcome::NoSpeech | TurnOutcome::Failed(_) => {
            if let Some(message) = orchestrator.session().last_user_message() {
                print_message(&message);
            }
        }
        TurnOutcome::Replied(_) => {
            let messages = orchestrator.messages();
            let start = messages.len().saturating_sub(2);
            for message in &messages[start..] {
                print_message(message);
            }
        }
    }
}

fn print_message(message: &Message) {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Assistant => "assistant",
    };
    println!("{:>9}: {}", who, message.content);
}
