use crate::OutputFormat;
use crate::util::{CliResult, SourceArgs, dimmed};
use clap::Args;
use serde::Serialize;
use xjoin_engine::{Engine, Node, SerializeOptions, serialize};

#[derive(Args, Debug, Clone)]
pub struct XpathArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Prefix the output with node count and per-node marker comments.
    #[arg(long = "verbose-output")]
    pub verbose_output: bool,
    /// Print every result on a single line.
    #[arg(long = "compact")]
    pub compact: bool,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResultSummary {
    count: usize,
    items: Vec<String>,
}

pub fn run(engine: &Engine, args: &XpathArgs) -> CliResult<String> {
    let source = args.source.read()?;
    let nodes = engine.evaluate_xpath(&source)?;
    render_nodes(&nodes, args.verbose_output, args.compact, args.format)
}

pub(crate) fn render_nodes(
    nodes: &[Node],
    verbose: bool,
    compact: bool,
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Text => {
            let text = serialize(nodes, &SerializeOptions { verbose, indent: !compact });
            Ok(text.lines().map(colorize_line).collect::<Vec<_>>().join("\n"))
        }
        OutputFormat::Json => {
            let options = SerializeOptions { verbose: false, indent: false };
            let items = nodes.iter().map(|n| serialize(std::slice::from_ref(n), &options).trim_end().to_owned());
            let summary = ResultSummary { count: nodes.len(), items: items.collect() };
            Ok(serde_json::to_string_pretty(&summary)?)
        }
    }
}

fn colorize_line(line: &str) -> String {
    if line.trim_start().starts_with("<!--") { dimmed(line) } else { line.to_owned() }
}
