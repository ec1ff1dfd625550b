//! Two-phase command replies.
//!
//! Every command is acknowledged first (deferred, ephemeral) and resolved
//! later with its outcome. `ReplyObligation::resolve` consumes the
//! obligation, so a handler can resolve at most once; dropping an
//! unresolved obligation is logged as a bug.

use super::traits::{GuildResult, Responder};
use tracing::{error, warn};

/// Pending reply owed to a requester.
#[must_use = "a reply obligation must be resolved"]
pub struct ReplyObligation<'a, R: Responder + ?Sized> {
    responder: &'a R,
    acknowledged: bool,
    resolved: bool,
}

impl<'a, R: Responder + ?Sized> ReplyObligation<'a, R> {
    /// Acknowledge the invocation and take on the reply obligation.
    ///
    /// A failed acknowledgement is not fatal: the obligation remembers it
    /// and `resolve` sends a fresh reply instead of editing.
    pub async fn acknowledge(responder: &'a R) -> Self {
        let acknowledged = match responder.acknowledge().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to defer reply, will reply directly");
                false
            }
        };

        Self {
            responder,
            acknowledged,
            resolved: false,
        }
    }

    /// Whether the deferral reached Discord
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Deliver the single reply for this invocation.
    pub async fn resolve(mut self, content: &str) -> GuildResult<()> {
        self.resolved = true;

        if self.acknowledged {
            self.responder.edit(content).await
        } else {
            self.responder.send(content).await
        }
    }
}

impl<R: Responder + ?Sized> Drop for ReplyObligation<'_, R> {
    fn drop(&mut self) {
        if !self.resolved {
            error!("Reply obligation dropped without a reply");
        }
    }
}
