//! Root logger construction, shared by every crate in the workspace.

use slog::{Drain, Logger};

/// Build the root logger: async, terminal-decorated, compact format.
///
/// Each component clones this with `log.new(o!("component" => "..."))` so
/// that every line carries its own context without re-deriving the drain.
pub fn get_root_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}
