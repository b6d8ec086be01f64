//! Idle detection
//!
//! Asks the screensaver extension how long the user has been inactive
//! and compares against the configured threshold.

use tracing::warn;
use x11rb::errors::ReplyError;
use x11rb::protocol::screensaver::ConnectionExt as _;

use crate::surface::XContext;

/// Decide idleness from a reported idle duration.
///
/// A zero threshold disables idle detection entirely.
fn is_idle_given(threshold_secs: u64, idle_ms: u64) -> bool {
    threshold_secs != 0 && idle_ms / 1000 > threshold_secs
}

/// Queries whether the user has been away longer than the configured
/// threshold.
#[derive(Debug, Clone, Copy)]
pub struct IdleProbe {
    threshold_secs: u64,
}

impl IdleProbe {
    pub const fn new(threshold_secs: u64) -> Self {
        Self { threshold_secs }
    }

    /// Is the user currently idle?
    ///
    /// Unconditionally false when disabled. A failing query is reported
    /// once per call and reads as "not idle".
    pub fn is_idle(&self, ctx: &XContext) -> bool {
        if self.threshold_secs == 0 {
            return false;
        }
        match query_idle_ms(ctx) {
            Ok(idle_ms) => is_idle_given(self.threshold_secs, u64::from(idle_ms)),
            Err(err) => {
                warn!("idle query failed: {err}");
                false
            }
        }
    }
}

fn query_idle_ms(ctx: &XContext) -> Result<u32, ReplyError> {
    let reply = ctx.conn.screensaver_query_info(ctx.root)?.reply()?;
    Ok(reply.ms_since_user_input)
}
