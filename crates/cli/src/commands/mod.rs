pub mod format;
pub mod optimize;
pub mod xpath;
pub mod xquery;
