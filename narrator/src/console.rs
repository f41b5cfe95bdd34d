//! Line-oriented console protocol.
//!
//! - Lines starting with `/` are commands (roll, check, state, reset, genre,
//!   lang, quit, help)
//! - Every other line is a player action
//! - Side-channel events are printed on their own `[EVENT]` line

use narrator_core::{Action, Genre, Language, Pipeline, PipelineError, SessionId};
use std::io;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Who is typing.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub session: SessionId,
    pub player: String,
    pub language: Language,
}

impl ConsoleConfig {
    /// Parse `--session`, `--player` and `--lang` from the command line.
    pub fn from_args(args: &[String]) -> Self {
        let value = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };
        Self {
            session: SessionId::new(value("--session").unwrap_or_else(|| "local".to_string())),
            player: value("--player").unwrap_or_else(|| "player".to_string()),
            language: value("--lang")
                .map(|l| Language::from_tag(&l))
                .unwrap_or_default(),
        }
    }
}

pub async fn run(pipeline: &Pipeline, mut config: ConsoleConfig) -> io::Result<()> {
    println!("=== Narrator ===");
    println!("Session: {}  Player: {}", config.session, config.player);
    print_commands();
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => {
                    println!("Goodbye!");
                    break;
                }
                Some("roll") => match parts.get(1).and_then(|n| pipeline.roll(n)) {
                    Some(result) => println!("[ROLL] {result}"),
                    None => println!("[ERROR] Usage: /roll <dice>, e.g. /roll 2d6+1"),
                },
                Some("check") => {
                    let label = parts.get(1).copied().unwrap_or("check");
                    match parts.get(2).map_or(Ok(0), |m| m.parse::<i32>()) {
                        Ok(modifier) => println!("[CHECK] {}", pipeline.ability_check(label, modifier)),
                        Err(_) => println!("[ERROR] Usage: /check <label> [modifier]"),
                    }
                }
                Some("state") => match pipeline.narrative_snapshot(&config.session).await {
                    Ok(s) => {
                        println!(
                            "[STATE] stage: {} ({} significant events), theme: {}, mood: {} {}, avg emotion: {:.2}",
                            s.stage,
                            s.counter,
                            s.recurrent_theme,
                            s.mood.genre,
                            s.mood.mood.name(),
                            s.average_emotion
                        );
                        if let Some(event) = s.last_event {
                            println!("[STATE] last event: {}", event.description);
                        }
                    }
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("reset") => match pipeline.reset_session(&config.session).await {
                    Ok(saved) => println!("[RESET] Dramatic curve reset (saved: {saved})"),
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("genre") => match parts.get(1).map(|g| g.parse::<Genre>()) {
                    Some(Ok(genre)) => match pipeline.set_genre(&config.session, genre).await {
                        Ok(_) => println!("[GENRE] {genre}"),
                        Err(e) => println!("[ERROR] {e}"),
                    },
                    _ => println!("[ERROR] Usage: /genre <fantasy|horror|intrigue>"),
                },
                Some("lang") => {
                    config.language = parts
                        .get(1)
                        .map(|l| Language::from_tag(l))
                        .unwrap_or_default();
                    println!("[LANG] {}", config.language.tag());
                }
                Some("help") => print_commands(),
                _ => println!("[ERROR] Unknown command. Type /help for commands."),
            }
            continue;
        }

        let action = Action::new(config.session.clone(), config.player.as_str(), line)
            .with_language(config.language);
        match pipeline.handle(action).await {
            Ok(turn) => {
                println!("{}", turn.message.text);
                if let Some(event) = turn.event {
                    println!("[EVENT] {}: {}", event.event_title, event.event_narration);
                }
            }
            Err(e @ PipelineError::UnidentifiedActor(_)) => println!("[ERROR] {e}"),
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("[ERROR] {e}");
            }
        }
    }

    Ok(())
}

fn print_commands() {
    println!("Commands:");
    println!("  /roll <dice>              - Roll dice, e.g. /roll 2d6+1");
    println!("  /check <label> [modifier] - Ability check");
    println!("  /state                    - Show the session's narrative state");
    println!("  /reset                    - Reset the dramatic curve");
    println!("  /genre <name>             - fantasy, horror or intrigue");
    println!("  /lang <es|en>             - Switch input language");
    println!("  /quit                     - Exit");
    println!("Anything else is played as an action.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_console_args() {
        let config = ConsoleConfig::from_args(&args(&[
            "narrator", "--player", "Aria", "--lang", "en", "--session", "mesa-1",
        ]));
        assert_eq!(config.session.as_str(), "mesa-1");
        assert_eq!(config.player, "Aria");
        assert_eq!(config.language, Language::En);

        let defaults = ConsoleConfig::from_args(&args(&["narrator"]));
        assert_eq!(defaults.session.as_str(), "local");
        assert_eq!(defaults.language, Language::Es);
    }
}
