use crate::model::Document;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Error codes reported alongside every [`Error`], modelled on the W3C
/// `err:` code space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    XPST0003, // syntax error
    XPST0008, // undeclared variable
    XQST0118, // constructor end tag does not match start tag
    XPTY0004, // join key lists of different length
    FODC0002, // document retrieval failure
    FODC0006, // document is not well-formed
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::XPST0003 => "err:XPST0003",
            ErrorCode::XPST0008 => "err:XPST0008",
            ErrorCode::XQST0118 => "err:XQST0118",
            ErrorCode::XPTY0004 => "err:XPTY0004",
            ErrorCode::FODC0002 => "err:FODC0002",
            ErrorCode::FODC0006 => "err:FODC0006",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax { line: usize, column: usize, message: String },
    #[error("cannot load document '{path}': {message}")]
    Resource { path: String, message: String },
    #[error("document '{uri}' is not well-formed: {message}")]
    Xml { uri: String, message: String },
    #[error("variable ${0} is not bound")]
    UnboundVariable(String),
    #[error("closing tag </{close}> does not match <{open}>")]
    TagMismatch { open: String, close: String },
    #[error("join key lists differ in length ({left} vs {right})")]
    JoinArity { left: usize, right: usize },
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Syntax { .. } => ErrorCode::XPST0003,
            Error::Resource { .. } => ErrorCode::FODC0002,
            Error::Xml { .. } => ErrorCode::FODC0006,
            Error::UnboundVariable(_) => ErrorCode::XPST0008,
            Error::TagMismatch { .. } => ErrorCode::XQST0118,
            Error::JoinArity { .. } => ErrorCode::XPTY0004,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps the argument of `doc("...")` to a document.
pub trait DocumentResolver: Send + Sync {
    fn resolve(&self, uri: &str) -> Result<Document>;
}

/// Resolves document names as file paths relative to a base directory.
#[derive(Debug, Clone)]
pub struct FsResolver {
    base: PathBuf,
}

impl FsResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl Default for FsResolver {
    fn default() -> Self {
        Self::new(".")
    }
}

impl DocumentResolver for FsResolver {
    fn resolve(&self, uri: &str) -> Result<Document> {
        let path = self.base.join(uri);
        tracing::debug!(path = %path.display(), "loading document");
        let text = std::fs::read_to_string(&path).map_err(|e| Error::Resource {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        crate::xml::load_str(Some(uri), &text)
    }
}

enum Source {
    Text(String),
    Parsed(Document),
}

/// In-memory document table, used by tests and embedders.
#[derive(Default)]
pub struct MemoryResolver {
    documents: RwLock<HashMap<String, Source>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers XML text; it is parsed on every resolution.
    pub fn with_text(self, uri: impl Into<String>, xml: impl Into<String>) -> Self {
        self.insert(uri.into(), Source::Text(xml.into()));
        self
    }

    /// Registers an already built document; every resolution yields the same
    /// node identities.
    pub fn with_document(self, uri: impl Into<String>, document: Document) -> Self {
        self.insert(uri.into(), Source::Parsed(document));
        self
    }

    fn insert(&self, uri: String, source: Source) {
        self.documents.write().unwrap_or_else(PoisonError::into_inner).insert(uri, source);
    }
}

impl DocumentResolver for MemoryResolver {
    fn resolve(&self, uri: &str) -> Result<Document> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        match documents.get(uri) {
            Some(Source::Parsed(document)) => Ok(document.clone()),
            Some(Source::Text(xml)) => crate::xml::load_str(Some(uri), xml),
            None => Err(Error::Resource { path: uri.to_owned(), message: "unknown document".into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[rstest]
    fn fs_resolver_reads_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("d.xml")).unwrap();
        write!(file, "<r><a>1</a></r>").unwrap();
        let resolver = FsResolver::new(dir.path());
        let d = resolver.resolve("d.xml").unwrap();
        assert_eq!(d.root().string_value(), "1");
    }

    #[rstest]
    fn missing_file_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsResolver::new(dir.path()).resolve("nope.xml").unwrap_err();
        assert_eq!(err.code(), ErrorCode::FODC0002);
    }

    #[rstest]
    fn memory_resolver_rejects_unknown_names() {
        let resolver = MemoryResolver::new().with_text("a.xml", "<a/>");
        assert!(resolver.resolve("a.xml").is_ok());
        assert!(matches!(resolver.resolve("b.xml"), Err(Error::Resource { .. })));
    }
}
