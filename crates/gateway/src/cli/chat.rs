//! `psytrainer chat`: train against a simulated patient in the terminal.
//!
//! Each line is classified by [`actions::parse`], run through the
//! [`Dispatcher`](crate::dispatch::Dispatcher) and printed by the
//! [`ConsoleOutbox`], which plays the patient's typing delay.

use std::sync::Arc;

use pt_domain::config::Config;

use crate::actions::{self, Input};
use crate::bootstrap;
use crate::delivery::{self, ConsoleOutbox};
use crate::dispatch::Reply;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: Arc<Config>, user_id: String) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".psytrainer")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("psytrainer {}", env!("CARGO_PKG_VERSION"));
    eprintln!("Trainee: {user_id}  |  /new to meet a patient, /help for commands, Ctrl+D to exit");
    eprintln!();

    let outbox = ConsoleOutbox::new();
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                let reply = match actions::parse(trimmed) {
                    Input::Exit => break,
                    Input::Help => Reply::notice(actions::HELP),
                    Input::Cache => Reply::notice(state.dispatcher.cache_report()),
                    Input::Invalid(hint) => Reply::notice(hint),
                    Input::Unknown(cmd) => {
                        Reply::notice(format!("Unknown command {cmd}. Type /help for the list."))
                    }
                    Input::Confirm => state.dispatcher.confirm(&user_id).await,
                    Input::Action(action) => state.dispatcher.handle(&user_id, action).await,
                };
                show(&state, &outbox, &user_id, &reply).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    bootstrap::shutdown(&state);
    eprintln!("Goodbye!");
    Ok(())
}

async fn show(state: &AppState, outbox: &ConsoleOutbox, user_id: &str, reply: &Reply) {
    if let Err(e) = delivery::deliver(outbox, user_id, reply, &state.config.dialog).await {
        eprintln!("\x1B[31merror: {e}\x1B[0m");
    }
}
