//! CLI command handlers. Each command is in its own file.

mod completions;
mod policies;
mod send;

pub use completions::run_completions;
pub use policies::run_policies;
pub use send::{run_send, SendArgs};

#[cfg(test)]
pub(crate) use policies::{delay_schedule, policy_rows, retry_classes};
#[cfg(test)]
pub(crate) use send::build_request;
