//! Screen topology seam
//!
//! The active screen region is owned by an external follow-mode policy
//! (which monitor, which workspace). This module defines the seam the
//! core talks through plus a root-screen-backed default.

use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt;
use x11rb::protocol::Event;

use crate::surface::XContext;

/// Usable area of the currently active output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenRegion {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Supplier of the active screen region.
///
/// `active_region` is consulted fresh on every placement computation so
/// monitor layout or follow-mode changes take effect without replumbing.
/// Events the dispatcher does not recognize are handed to `check_event`
/// for topology-change detection.
pub trait ScreenTopology {
    fn active_region(&mut self, ctx: &XContext) -> ScreenRegion;

    fn check_event(&mut self, event: &Event);
}

/// Topology backed by the root window of the connected screen.
///
/// Queries the root geometry live, so RandR resizes are picked up even
/// without tracking the extension's notify events.
#[derive(Debug, Default)]
pub struct RootScreen;

impl ScreenTopology for RootScreen {
    fn active_region(&mut self, ctx: &XContext) -> ScreenRegion {
        match query_root(ctx) {
            Ok(reply) => ScreenRegion {
                x: i32::from(reply.x),
                y: i32::from(reply.y),
                w: i32::from(reply.width),
                h: i32::from(reply.height),
            },
            Err(err) => {
                warn!("root geometry query failed, falling back to setup: {err}");
                setup_region(ctx)
            }
        }
    }

    fn check_event(&mut self, event: &Event) {
        // Root screen has no per-output state to refresh.
        debug!(?event, "event forwarded to screen topology");
    }
}

fn query_root(ctx: &XContext) -> Result<x11rb::protocol::xproto::GetGeometryReply, x11rb::errors::ReplyError> {
    Ok(ctx.conn.get_geometry(ctx.root)?.reply()?)
}

fn setup_region(ctx: &XContext) -> ScreenRegion {
    let screen = &ctx.conn.setup().roots[ctx.screen_num];
    ScreenRegion {
        x: 0,
        y: 0,
        w: i32::from(screen.width_in_pixels),
        h: i32::from(screen.height_in_pixels),
    }
}
