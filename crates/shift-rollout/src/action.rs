//! Action sink seam: enacts a cluster's target score.

use std::future::Future;
use std::pin::Pin;

use crate::error::ActionError;

/// Boxed future returned by [`RolloutAction::update_score`].
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>>;

/// Applies a target score (0..=100) to a single cluster, e.g. through a
/// load-balancer control plane.
///
/// Implementations must tolerate the same score being pushed repeatedly:
/// the controller retries a failed push implicitly on its next tick.
pub trait RolloutAction: Send + Sync {
    fn update_score<'a>(&'a self, cluster: &'a str, score: u32) -> ActionFuture<'a>;
}
