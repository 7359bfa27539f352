pub mod ast;
pub mod engine;
pub mod format;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod rewrite;
pub mod runtime;
pub mod xml;

pub use ast::{AbsolutePath, Axis, Binding, Cond, Filter, Flwr, Join, RelPath, Xq};
pub use engine::Evaluator;
pub use format::{format_inline, format_query, format_xpath};
pub use model::{Document, Node, NodeKind, NodeSpec, doc, elem, text};
pub use parser::{parse_xpath, parse_xquery};
pub use pipeline::{Engine, EngineBuilder, EngineOptions, OptimizeReport, PHASE_TARGET, format_source};
pub use rewrite::{OptimizeOutcome, Phase, Rejection, Renamer, optimize, rename};
pub use runtime::{DocumentResolver, Error, ErrorCode, FsResolver, MemoryResolver, Result};
pub use xml::{SerializeOptions, load_file, load_str, serialize};
