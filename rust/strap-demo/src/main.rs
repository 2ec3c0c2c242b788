use std::path::PathBuf;
use std::process;

use clap::Parser as ClapParser;
use strap_bind::strap_rt::StrapConfig;
use strap_demo::scenarios;
use tracing_subscriber::EnvFilter;

// ANSI color helpers
fn green(s: &str) -> String {
    format!("\x1b[32m{}\x1b[0m", s)
}
fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}
fn gray(s: &str) -> String {
    format!("\x1b[90m{}\x1b[0m", s)
}
fn status_label(label: &str) -> String {
    format!("\x1b[1;32m{:>12}\x1b[0m", label)
}

#[derive(ClapParser)]
#[command(
    name = "strap-demo",
    version,
    about = "Walk through the strap binding engine"
)]
struct Cli {
    /// Path to a strap.toml (default: search upwards from the current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scenario to run, or `all`
    #[arg(long, default_value = "all")]
    scenario: String,

    /// List the available scenarios and exit
    #[arg(long)]
    list: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list {
        for scenario in scenarios::all() {
            println!("{} {}", bold(&format!("{:<12}", scenario.name)), gray(scenario.about));
        }
        return;
    }

    let config = match &cli.config {
        Some(path) => match StrapConfig::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{} {}", red("error:"), e);
                process::exit(1);
            }
        },
        None => StrapConfig::load(),
    };

    let selected = match scenarios::select(&cli.scenario) {
        Ok(selected) => selected,
        Err(e) => {
            eprintln!("{} {}", red("error:"), e);
            process::exit(1);
        }
    };

    for scenario in &selected {
        println!("{} {}", status_label("Running"), bold(scenario.name));
        match scenario.run(&config) {
            Ok(lines) => {
                for line in lines {
                    println!("  {}", line);
                }
            }
            Err(e) => {
                eprintln!("{} {}: {}", red("error:"), scenario.name, e);
                process::exit(1);
            }
        }
    }
    println!("{} {} scenario(s)", green("ok"), selected.len());
}
