pub mod commands;
pub mod util;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use util::CliResult;
use xjoin_engine::Engine;

#[derive(Parser, Debug)]
#[command(name = "xjoin", version, about = "Evaluate, optimize and format XPath/XQuery subset queries")]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Directory that `doc("...")` names are resolved against.
    #[arg(long = "base-dir", value_name = "DIR", default_value = ".", global = true)]
    pub base_dir: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate an absolute XPath expression.
    Xpath(commands::xpath::XpathArgs),
    /// Evaluate an XQuery, optionally through the join optimizer.
    Xquery(commands::xquery::XqueryArgs),
    /// Print the renamed and join-rewritten form of an XQuery.
    Optimize(commands::optimize::OptimizeArgs),
    /// Pretty print an XQuery.
    Format(commands::format::FormatArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = execute(&cli)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Runs the parsed command and returns what goes to stdout.
pub fn execute(cli: &Cli) -> CliResult<String> {
    let engine = Engine::builder().with_base_dir(&cli.base_dir).build();
    match &cli.command {
        Command::Xpath(args) => commands::xpath::run(&engine, args),
        Command::Xquery(args) => commands::xquery::run(&engine, args),
        Command::Optimize(args) => commands::optimize::run(&engine, args),
        Command::Format(args) => commands::format::run(args),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // a second initialization (tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
