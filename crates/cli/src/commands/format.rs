use crate::util::{CliResult, SourceArgs};
use clap::Args;
use xjoin_engine::format_source;

#[derive(Args, Debug, Clone)]
pub struct FormatArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

pub fn run(args: &FormatArgs) -> CliResult<String> {
    Ok(format_source(&args.source.read()?)?)
}
