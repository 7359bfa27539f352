use anyhow::Context;
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use std::error::Error;
use std::path::PathBuf;

pub type CliResult<T> = Result<T, Box<dyn Error>>;

/// Query text given inline or read from a file.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    #[arg(value_name = "QUERY", required_unless_present = "file", conflicts_with = "file")]
    pub query: Option<String>,
    /// Read the query from FILE instead of the command line.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: Option<PathBuf>,
}

impl SourceArgs {
    pub fn inline(query: impl Into<String>) -> Self {
        Self { query: Some(query.into()), file: None }
    }

    pub fn read(&self) -> CliResult<String> {
        match (&self.query, &self.file) {
            (_, Some(path)) => Ok(std::fs::read_to_string(path)
                .with_context(|| format!("cannot read query file {}", path.display()))?),
            (Some(query), None) => Ok(query.clone()),
            (None, None) => Err("no query given".into()),
        }
    }
}

/// Heading plus indented body, written to stderr by `--show-phases`.
pub fn render_phase(title: &str, body: &str) -> String {
    let heading = title.if_supports_color(Stream::Stderr, |t| t.bold().cyan().to_string()).to_string();
    let body: Vec<String> = body.lines().map(|line| format!("  {line}")).collect();
    format!("{heading}\n{}", body.join("\n"))
}

pub fn dimmed(text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.dimmed().to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::strip_ansi;
    use rstest::rstest;

    #[rstest]
    fn file_source_wins_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.xq");
        std::fs::write(&path, "doc(\"f\")/a").unwrap();
        let args = SourceArgs { query: None, file: Some(path) };
        assert_eq!(args.read().unwrap(), "doc(\"f\")/a");

        let missing = SourceArgs { query: None, file: Some(dir.path().join("none.xq")) };
        let err = missing.read().unwrap_err().to_string();
        assert!(err.starts_with("cannot read query file"), "{err}");
    }

    #[rstest]
    fn phases_indent_their_body() {
        let out = render_phase("Phase 1 - Variable Renamer", "for $v1 in doc(\"f\")/a\nreturn\n  $v1");
        assert_eq!(
            strip_ansi(&out),
            "Phase 1 - Variable Renamer\n  for $v1 in doc(\"f\")/a\n  return\n    $v1"
        );
    }
}
