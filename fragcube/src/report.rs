use crate::errors::Result;

/// Sink for human-readable task output, like dry-run plan summaries
///
pub trait ResultReporter: Send + Sync {
    fn report(&self, title: &str, body: &str) -> Result<()>;
}
