use crate::OutputFormat;
use crate::util::{CliResult, SourceArgs, render_phase};
use clap::Args;
use serde::Serialize;
use xjoin_engine::{Engine, format_query};

#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Also print the renamed query to stderr.
    #[arg(long = "show-phases")]
    pub show_phases: bool,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
struct OptimizeSummary {
    renamed: String,
    optimized: String,
    rewritten: usize,
}

pub fn run(engine: &Engine, args: &OptimizeArgs) -> CliResult<String> {
    let source = args.source.read()?;
    let report = engine.optimize(&source, false)?;
    let summary = OptimizeSummary {
        renamed: format_query(&report.renamed),
        optimized: format_query(&report.optimized),
        rewritten: report.rewritten,
    };
    if args.show_phases {
        eprintln!("{}", render_phase("Phase 1 - Variable Renamer", &summary.renamed));
    }
    Ok(match args.format {
        OutputFormat::Text => summary.optimized,
        OutputFormat::Json => serde_json::to_string_pretty(&summary)?,
    })
}
