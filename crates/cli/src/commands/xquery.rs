use super::xpath::render_nodes;
use crate::OutputFormat;
use crate::util::{CliResult, SourceArgs, render_phase};
use clap::Args;
use xjoin_engine::{Engine, format_query};

#[derive(Args, Debug, Clone)]
pub struct XqueryArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Rewrite eligible FLWR expressions into joins before evaluating.
    #[arg(long = "optimize")]
    pub optimize: bool,
    /// Print the renamed and optimized query to stderr (implies --optimize).
    #[arg(long = "show-phases")]
    pub show_phases: bool,
    #[arg(long = "verbose-output")]
    pub verbose_output: bool,
    #[arg(long = "compact")]
    pub compact: bool,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub fn run(engine: &Engine, args: &XqueryArgs) -> CliResult<String> {
    let source = args.source.read()?;
    let nodes = if args.optimize || args.show_phases {
        let report = engine.optimize(&source, false)?;
        if args.show_phases {
            eprintln!("{}", render_phase("Phase 1 - Variable Renamer", &format_query(&report.renamed)));
            eprintln!("{}", render_phase("Phase 2 - Optimizer", &format_query(&report.optimized)));
        }
        tracing::debug!(rewritten = report.rewritten, "evaluating optimized query");
        engine.evaluate_query(&report.optimized)?
    } else {
        engine.evaluate_xquery(&source)?
    };
    render_nodes(&nodes, args.verbose_output, args.compact, args.format)
}
