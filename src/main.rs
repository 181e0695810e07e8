//! Interactive front end for the simulator
//!
//! Prints the full runtime state before every prompt, reads one action per
//! line, and keeps going until EOF. An optional file argument is replayed
//! line-by-line first, echoing each action the way the prompt would.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use stealsim::{parse_action, Action, Rts};

const NUM_WORKERS: usize = 4;

/// Interactive step-driven simulator of a work-stealing runtime with
/// splitter hyperobjects
#[derive(Debug, Parser)]
#[command(name = "stealsim", version, about)]
struct Cli {
    /// File of actions to replay before reading interactive input
    file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    if cli.no_color {
        colored::control::set_override(false);
    }

    println!("stealsim {}", env!("CARGO_PKG_VERSION"));
    println!("An interactive work-stealing runtime simulator with splitters");
    println!();
    print_help();

    let mut rts = Rts::new(NUM_WORKERS);

    if let Some(path) = &cli.file {
        let script = std::fs::read_to_string(path)?;
        for line in script.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            println!("{}", rts.render_state());
            println!("{}", format!("> {line}").red());
            process_line(&mut rts, line);
        }
    }

    let stdin = io::stdin();
    loop {
        println!("{}", rts.render_state());
        print!("{}", "> ".red());
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF ends the session
        }
        println!();
        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        process_line(&mut rts, line);
    }
    Ok(())
}

fn process_line(rts: &mut Rts, line: &str) {
    match parse_action(line) {
        Err(_) => println!("{}", ">> Unable to parse action\n".red()),
        Ok(Action::Help) => print_help(),
        Ok(action) => {
            if let Err(err) = rts.do_action(&action) {
                println!("{}", format!(">> Invalid action: {err}\n").red());
            }
        }
    }
}

fn print_help() {
    println!("Actions:");
    println!("  call <worker>                    push a called frame onto the current stacklet");
    println!("  spawn <worker>                   start a new stacklet with a spawned frame");
    println!("  return <worker>                  return from the current call or spawn frame");
    println!("  steal <thief> <victim>           steal the victim's oldest stacklet");
    println!("  sync <worker>                    join: no-op, or suspend the current frame");
    println!("  push <worker> <splitter>         push a fresh view for a splitter");
    println!("  set <worker> <splitter> <value>  overwrite the current view's value");
    println!("  pop <worker> <splitter>          pop the current view");
    println!("  access <worker> <splitter>       look up (and memoize) the current view");
    println!("  undo                             revert the most recent action");
    println!("  help                             print this message");
    println!(
        "Workers are numbered 0 through {}. Splitters x and y exist from startup.",
        NUM_WORKERS - 1
    );
    println!();
}
