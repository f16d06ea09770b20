use anyhow::Result;
use chrono::NaiveDateTime;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use winterpeak::config::load_config;
use winterpeak::prelude::*;
use winterpeak::time::localize;
use winterpeak::{ENGINE_NAME, VERSION as LIB_VERSION};

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");
const REFERENCE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(72).dimmed());
    println!("{}", version_string);
    println!("{}", "-".repeat(72).dimmed());
}

fn print_state(state: &ScheduleState) {
    let composite = state.composite_state();
    let label = if state.critical {
        composite.red().bold()
    } else {
        composite.green().bold()
    };
    println!("--> {} (as of {})", label, state.last_update);
    for (key, value) in state.to_flat_map() {
        if let Some(field) = key.strip_prefix("state/") {
            println!("  {:<28} {}", field, value);
        }
    }
    println!(
        "  {:<28} {} -> {}",
        "next peak",
        state.next_peak.window().start_display(),
        state.next_peak.window().end_display()
    );
    println!(
        "  {:<28} {} -> {}",
        "next anchor",
        state.next_anchor.window().start_display(),
        state.next_anchor.window().end_display()
    );
}

fn print_event(event: &Event) {
    let window = event.window();
    let pre_heat = match event.pre_heat() {
        Some(_) => {
            let map = event.to_flat_map();
            format!(
                " (pre-heat {} -> {})",
                map.get("pre_heat_start").map(String::as_str).unwrap_or("?"),
                map.get("pre_heat_end").map(String::as_str).unwrap_or("?")
            )
        }
        None => String::new(),
    };
    println!(
        "  {} -> {}{}",
        window.start_display(),
        window.end_display(),
        pre_heat.dimmed()
    );
}

fn print_events(title: &str, events: &[Event]) {
    println!("{} ({}):", title, events.len());
    for event in events {
        print_event(event);
    }
}

fn parse_reference(words: &[&str], tz: &chrono_tz::Tz) -> Option<chrono::DateTime<chrono_tz::Tz>> {
    let text = words.join(" ");
    let local = NaiveDateTime::parse_from_str(&text, REFERENCE_FORMAT).ok()?;
    localize(tz, local).ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config_path = args.first().map(String::as_str).unwrap_or("config.toml");
    let payload_path = args.get(1).map(String::as_str).unwrap_or("winter_credit.json");

    tracing::debug!(config = config_path, payload = payload_path, "peakshell starting");
    let config = Arc::new(load_config(config_path)?);
    let tz = config.timezone;
    let clock = Arc::new(SystemClock::new(tz));
    let controller = RefreshController::new(JsonFileSource::new(payload_path), config, clock);

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!("{} shell is ready. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "state" => {
                            let result = match args.get(1) {
                                Some(&"at") => match parse_reference(&args[2..], &tz) {
                                    Some(reference) => controller.state_at(reference).await,
                                    None => {
                                        println!("Usage: state at <YYYY-MM-DD HH:MM:SS>");
                                        continue;
                                    }
                                },
                                Some(_) => {
                                    println!("Unknown 'state' command. Try 'state' or 'state at'.");
                                    continue;
                                }
                                None => controller.current_state().await,
                            };
                            match result {
                                Ok(state) => print_state(&state),
                                Err(e) => println!("Error: {}", e),
                            }
                        }
                        "next" => match controller.next_event().await {
                            Ok(Some(event)) => {
                                println!("Next event:");
                                print_event(&event);
                            }
                            Ok(None) => println!("--> No upcoming event this season."),
                            Err(e) => println!("Error: {}", e),
                        },
                        "future" => match controller.future_events().await {
                            Ok(events) => print_events("Future events", &events),
                            Err(e) => println!("Error: {}", e),
                        },
                        "events" => match controller.all_events().await {
                            Ok(events) => print_events("Current season events", &events),
                            Err(e) => println!("Error: {}", e),
                        },
                        "refresh" => match controller.force_refresh().await {
                            Ok(RefreshOutcome::Refreshed { events }) => {
                                println!("--> Refreshed, {} events loaded.", events)
                            }
                            Ok(RefreshOutcome::ServedStale { reason }) => {
                                println!("--> {} {}", "Refresh failed, keeping old data:".yellow(), reason)
                            }
                            Ok(RefreshOutcome::Cached) => println!("--> Data is up to date."),
                            Err(e) => println!("Error: {}", e),
                        },
                        "status" => {
                            let status = controller.status().await;
                            println!("  state         {:?}", status.state);
                            match status.last_refresh {
                                Some(at) => println!("  last refresh  {}", at.format(REFERENCE_FORMAT)),
                                None => println!("  last refresh  never"),
                            }
                            if let Some(error) = status.last_error {
                                println!("  last error    {}", error.red());
                            }
                        }
                        "help" => {
                            println!("Available commands:");
                            println!("  state                 - Shows the current schedule state.");
                            println!("  state at <DATE TIME>  - Replays the state at 'YYYY-MM-DD HH:MM:SS'.");
                            println!("  next                  - Shows the next actionable event.");
                            println!("  future                - Lists future events of the current season.");
                            println!("  events                - Lists all events of the current season.");
                            println!("  refresh               - Fetches the payload again, ignoring the TTL.");
                            println!("  status                - Shows cache freshness and the last error.");
                            println!("  exit                  - Quits the shell.");
                        }
                        "exit" => break,
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting peakshell...");
                break;
            }
        }
    }

    Ok(())
}
