//! shift-action: where cluster scores end up.
//!
//! - **`http_sink`**: POSTs `{"cluster", "score"}` to a control-plane endpoint.
//! - **`dry_run`**: logs the score and remembers it; never fails.

pub mod dry_run;
pub mod http_sink;

pub use dry_run::DryRunAction;
pub use http_sink::{HttpAction, HttpActionConfig, ScoreUpdate};
