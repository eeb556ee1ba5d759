//! Subcommand implementations. Each `cmd_*` prints its result and exits
//! non-zero on failure.

pub(crate) mod remote;
pub(crate) mod report;
pub(crate) mod watch;
