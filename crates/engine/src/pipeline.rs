//! End-to-end entry points: parse, rename, optimize, evaluate.
use crate::ast::Xq;
use crate::engine::Evaluator;
use crate::format::format_query;
use crate::model::Node;
use crate::parser::{parse_xpath, parse_xquery};
use crate::rewrite::{Renamer, optimize};
use crate::runtime::{DocumentResolver, FsResolver, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Log target of the diagnostic phase listings.
pub const PHASE_TARGET: &str = "xjoin::phase";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Rewrite FLWR expressions into joins before evaluating XQuery.
    pub optimize: bool,
    /// Fail on unbound variables while renaming instead of mapping them to
    /// the `Undefined` sentinel.
    pub strict_variables: bool,
}

/// Intermediate and final trees of one optimizer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeReport {
    pub renamed: Xq,
    pub optimized: Xq,
    pub rewritten: usize,
}

pub struct Engine {
    resolver: Arc<dyn DocumentResolver>,
    options: EngineOptions,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn resolver(&self) -> &dyn DocumentResolver {
        self.resolver.as_ref()
    }

    pub fn evaluate_xpath(&self, source: &str) -> Result<Vec<Node>> {
        let path = parse_xpath(source)?;
        Evaluator::new(self.resolver()).evaluate_absolute(&path)
    }

    /// Evaluates an XQuery, through the optimizer when it is enabled.
    pub fn evaluate_xquery(&self, source: &str) -> Result<Vec<Node>> {
        if self.options.optimize {
            return self.evaluate_optimized(source);
        }
        self.evaluate_query(&parse_xquery(source)?)
    }

    pub fn evaluate_optimized(&self, source: &str) -> Result<Vec<Node>> {
        let report = self.optimize(source, false)?;
        self.evaluate_query(&report.optimized)
    }

    /// Evaluates a parsed query with a fresh construction arena.
    pub fn evaluate_query(&self, query: &Xq) -> Result<Vec<Node>> {
        Evaluator::new(self.resolver()).evaluate_query(query)
    }

    /// Renames and optimizes `source`. With `verbose`, both phases are logged
    /// at INFO under [`PHASE_TARGET`].
    pub fn optimize(&self, source: &str, verbose: bool) -> Result<OptimizeReport> {
        let parsed = parse_xquery(source)?;
        let renamed = self.rename(&parsed)?;
        if verbose {
            tracing::info!(target: PHASE_TARGET, "Phase 1 - Variable Renamer\n{}", format_query(&renamed));
        }
        let outcome = optimize(&renamed);
        if verbose {
            tracing::info!(
                target: PHASE_TARGET,
                rewritten = outcome.rewritten,
                "Phase 2 - Optimizer\n{}",
                format_query(&outcome.query)
            );
        }
        Ok(OptimizeReport { renamed, optimized: outcome.query, rewritten: outcome.rewritten })
    }

    fn rename(&self, query: &Xq) -> Result<Xq> {
        let mut renamer = if self.options.strict_variables { Renamer::strict() } else { Renamer::new() };
        renamer.rename(query)
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    resolver: Option<Arc<dyn DocumentResolver>>,
    options: EngineOptions,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DocumentResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Resolves `doc(...)` names as files below `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resolver = Some(Arc::new(FsResolver::new(dir)));
        self
    }

    pub fn optimize(mut self, enabled: bool) -> Self {
        self.options.optimize = enabled;
        self
    }

    pub fn strict_variables(mut self, enabled: bool) -> Self {
        self.options.strict_variables = enabled;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            resolver: self.resolver.unwrap_or_else(|| Arc::new(FsResolver::default())),
            options: self.options,
        }
    }
}

/// Parses and pretty prints an XQuery.
pub fn format_source(source: &str) -> Result<String> {
    Ok(format_query(&parse_xquery(source)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Error, MemoryResolver};
    use crate::xml::{SerializeOptions, serialize};
    use rstest::{fixture, rstest};

    #[fixture]
    fn engine() -> Engine {
        let resolver = MemoryResolver::new()
            .with_text("f", "<r><a><k>1</k></a><a><k>2</k></a></r>")
            .with_text("g", "<s><b><j>2</j></b><b><j>1</j></b></s>");
        Engine::builder().with_resolver(Arc::new(resolver)).build()
    }

    fn compact(nodes: &[Node]) -> String {
        serialize(nodes, &SerializeOptions { verbose: false, indent: false })
    }

    #[rstest]
    fn optimized_and_plain_evaluation_agree(engine: Engine) {
        let src = r#"for $x in doc("f")/r/a, $y in doc("g")/s/b where $x/k/text() = $y/j/text() return <pair>{$x, $y}</pair>"#;
        let plain = engine.evaluate_xquery(src).unwrap();
        let optimized = engine.evaluate_optimized(src).unwrap();
        assert_eq!(compact(&plain), compact(&optimized));
        assert_eq!(plain.len(), 2);
    }

    #[rstest]
    fn report_carries_every_phase(engine: Engine) {
        let report = engine
            .optimize(r#"for $x in doc("f")/r/a, $y in doc("g")/s/b where $x/k = $y/j return $y"#, true)
            .unwrap();
        assert_eq!(report.rewritten, 1);
        assert!(crate::format::format_inline(&report.renamed).starts_with("for $v1 in"));
        assert!(matches!(report.optimized, Xq::Flwr(ref f) if f.bindings[0].var == "tuple"));
    }

    #[rstest]
    fn strict_renaming_reports_the_original_name() {
        let engine = Engine::builder().with_resolver(Arc::new(MemoryResolver::new())).strict_variables(true).build();
        assert_eq!(engine.optimize("<r>{$free}</r>", false), Err(Error::UnboundVariable("free".into())));
        let permissive = Engine::builder().with_resolver(Arc::new(MemoryResolver::new())).optimize(true).build();
        assert_eq!(
            permissive.evaluate_xquery("<r>{$free}</r>"),
            Err(Error::UnboundVariable("Undefined".into()))
        );
    }

    #[rstest]
    fn formatting_round_trips() {
        let once = format_source(r#"for $a in doc("f")/r/a where $a/k = "1" return <v>{$a}</v>"#).unwrap();
        assert_eq!(format_source(&once).unwrap(), once);
    }
}
