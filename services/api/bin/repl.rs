//! Terminal REPL over the tutoring core.
//!
//! Uses the same configuration and store as the API service, with the session
//! context held in this process. Type `/tree` to see progress, `/reset` to
//! start over, `quit` to leave.

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;
use tutor_api::{
    config::Config,
    setup::{build_machine, init_tracing},
};
use tutor_core::{
    linearize::{prune_mastered, render_tree},
    session::{SessionContext, TurnResponse},
};

#[derive(Parser, Debug)]
#[command(version, about = "Learn a topic one prerequisite at a time")]
struct Args {
    /// Learner whose mastery records are read and written.
    #[arg(long, default_value = "default")]
    learner: String,
    /// Topic to start learning right away.
    #[arg(long)]
    topic: Option<String>,
}

fn show(response: &TurnResponse) {
    println!("\n{}\n", response.text);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    // Keep the terminal for the conversation unless logging was asked for.
    let level = if std::env::var("RUST_LOG").is_ok() {
        config.log_level
    } else {
        Level::WARN
    };
    init_tracing(level);

    let (machine, _db) = build_machine(&config).await?;
    let machine = machine.for_learner(args.learner);
    let mut context = SessionContext::default();

    if let Some(topic) = args.topic.as_deref() {
        let (response, updated) = machine.start_learning(topic).await;
        show(&response);
        context = updated;
    } else {
        println!("What would you like to learn? Try 'Learn: Photosynthesis'.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "quit" | "exit" => break,
            "/reset" => {
                context = SessionContext::default();
                println!("Starting fresh.");
            }
            "/tree" => match &context.tree {
                Some(tree) => {
                    let mastered = machine.mastered_concepts().await;
                    println!("\n{}\n", render_tree(&prune_mastered(tree, &mastered)));
                    println!(
                        "Concept {} of {}",
                        (context.current_index + 1).min(context.teaching_order.len()),
                        context.teaching_order.len()
                    );
                }
                None => println!("Nothing to show yet."),
            },
            message => {
                let (response, updated) = machine.handle_turn(message, context).await;
                show(&response);
                context = updated;
            }
        }
    }
    Ok(())
}
