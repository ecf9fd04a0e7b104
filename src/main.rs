//! tmenu - An interactive menu picker for pipelines
//!
//! Reads options from arguments or stdin, runs an interactive menu on
//! the controlling terminal, and prints the selection to stdout. The UI
//! goes to /dev/tty, so stdout stays clean for the next pipeline stage.

use std::io::{BufRead, IsTerminal};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use tmenu_ui::{callback, Flow, Menu, Selection};

/// tmenu - pick one or more lines interactively
#[derive(Parser, Debug)]
#[command(name = "tmenu")]
#[command(about = "Pick one or more lines interactively")]
#[command(version)]
struct Cli {
    /// Menu title shown above the options
    #[arg(short = 't', long = "title", default_value = "")]
    title: String,

    /// Allow selecting multiple options
    #[arg(short = 'm', long = "multi")]
    multi: bool,

    /// Status line shown below the options
    #[arg(long = "message")]
    message: Option<String>,

    /// Limit the menu to this many screen lines
    #[arg(long = "height")]
    height: Option<usize>,

    /// Wrap cursor motion at the ends of the list
    #[arg(short = 'w', long = "wrap")]
    wrap: bool,

    /// Log level
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,

    /// Options to choose from; read from stdin when omitted
    options: Vec<String>,
}

fn read_options(cli: &Cli) -> Result<Vec<String>> {
    if !cli.options.is_empty() {
        return Ok(cli.options.clone());
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        bail!("no options given and stdin is a terminal");
    }

    let mut options = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read options from stdin")?;
        if !line.is_empty() {
            options.push(line);
        }
    }
    if options.is_empty() {
        bail!("no options to choose from");
    }
    Ok(options)
}

fn build_menu(cli: &Cli, options: Vec<String>) -> Menu {
    let menu = Menu::new(cli.title.clone());
    menu.extend(options);
    menu.set_wrap(cli.wrap);
    menu.set_max_height(cli.height);
    if cli.multi {
        menu.set_checkbox("[]");
    }
    if let Some(message) = &cli.message {
        menu.set_message(message.clone());
    } else if cli.multi {
        menu.set_message("space toggles, enter accepts, q quits");
    } else {
        menu.set_message("enter accepts, q quits");
    }

    menu.bind(
        &["up", "k"],
        callback(|menu, _event| {
            menu.cursor_up(1);
            Flow::Handled
        }),
    );
    menu.bind(
        &["down", "j"],
        callback(|menu, _event| {
            menu.cursor_down(1);
            Flow::Handled
        }),
    );
    menu.bind(
        &["pgup"],
        callback(|menu, _event| {
            menu.scroll(-5);
            Flow::Handled
        }),
    );
    menu.bind(
        &["pgdn"],
        callback(|menu, _event| {
            menu.scroll(5);
            Flow::Handled
        }),
    );
    menu.bind(
        &["home"],
        callback(|menu, _event| {
            let _ = menu.cursor_to(0.into());
            Flow::Handled
        }),
    );
    menu.bind(
        &["end"],
        callback(|menu, _event| {
            let last = menu.len().saturating_sub(1);
            let _ = menu.cursor_to(last.into());
            Flow::Handled
        }),
    );
    if cli.multi {
        menu.bind(
            &["space"],
            callback(|menu, _event| {
                if let Some(item) = menu.cursor_item() {
                    item.toggle();
                }
                Flow::Handled
            }),
        );
    }
    menu.bind(&["enter"], callback(|_menu, _event| Flow::Done));
    menu.bind(&["q", "esc"], callback(|_menu, _event| Flow::Quit));

    menu
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .parse_filters(&cli.log_level)
        .init();

    let options = read_options(&cli)?;
    let menu = build_menu(&cli, options);

    let selection = menu.interact().context("interactive menu failed")?;
    match selection {
        Some(Selection::One(item)) => {
            println!("{}", item.text());
            Ok(ExitCode::SUCCESS)
        }
        Some(Selection::Many(items)) if !items.is_empty() => {
            for item in items {
                println!("{}", item.text());
            }
            Ok(ExitCode::SUCCESS)
        }
        _ => Ok(ExitCode::FAILURE),
    }
}
