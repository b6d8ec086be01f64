//! Display surface
//!
//! Owns the connection to the X server and the notification window:
//! placement against the active screen region, visibility, transparency,
//! and the WM metadata that keeps the window border-less and on top.

use std::env;

use thiserror::Error;
use tracing::{debug, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::screensaver;
use x11rb::protocol::xproto::{
    AtomEnum, BackPixmap, ButtonIndex, ChangeWindowAttributesAux, ConfigureWindowAux,
    ConnectionExt, CreateWindowAux, EventMask, GrabMode, ModMask, PropMode, StackMode, Window,
    WindowClass,
};
use x11rb::protocol::ErrorKind;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::config::{Config, Follow};
use crate::geometry::{Geometry, PlacementPlan, WindowDim};
use crate::screen::{ScreenRegion, ScreenTopology};
use crate::shortcut::{ShortcutError, ShortcutTable};

/// Surface subsystem errors.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("cannot open display: {0}")]
    Connect(#[from] ConnectError),
    #[error("display connection failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("display server request failed: {0}")]
    Reply(#[from] ReplyError),
    #[error("resource id allocation failed: {0}")]
    Id(#[from] ReplyOrIdError),
    #[error(transparent)]
    Shortcut(#[from] ShortcutError),
}

x11rb::atom_manager! {
    /// Atoms the surface needs, interned in one round-trip.
    pub Atoms: AtomsCookie {
        UTF8_STRING,
        _NET_WM_NAME,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NOTIFICATION,
        _NET_WM_WINDOW_TYPE_UTILITY,
        _NET_WM_STATE,
        _NET_WM_STATE_ABOVE,
        _NET_WM_WINDOW_OPACITY,
    }
}

/// The one explicitly owned display context.
///
/// Passed by reference to every component that talks to the server;
/// nothing here is a global, so multiple contexts (e.g. in tests against
/// a nested server) can coexist. Dropping the context closes the
/// connection, which is also how "stop" is expressed: no in-flight call
/// is cancellable, the server just observes the disconnect.
pub struct XContext {
    pub conn: RustConnection,
    pub screen_num: usize,
    pub root: Window,
    pub atoms: Atoms,
}

impl XContext {
    /// Open the display connection.
    ///
    /// This process cannot run headless: a connection failure is fatal
    /// and propagates to a non-zero exit. Missing locale or screensaver
    /// support only degrades behavior and is logged.
    pub fn connect() -> Result<Self, SurfaceError> {
        check_locale();

        let (conn, screen_num) = x11rb::connect(None)?;
        let root = conn.setup().roots[screen_num].root;
        let atoms = Atoms::new(&conn)?.reply()?;

        if conn
            .extension_information(screensaver::X11_EXTENSION_NAME)?
            .is_none()
        {
            warn!("screensaver extension missing, idle detection disabled");
        }

        Ok(Self {
            conn,
            screen_num,
            root,
            atoms,
        })
    }
}

/// Warn when the environment does not announce a UTF-8 locale; text
/// handling continues in a degraded mode.
fn check_locale() {
    let locale = env::var("LC_ALL")
        .or_else(|_| env::var("LC_CTYPE"))
        .or_else(|_| env::var("LANG"))
        .unwrap_or_default();
    if !locale.to_ascii_lowercase().replace('-', "").contains("utf8") {
        warn!("no UTF-8 locale support");
    }
}

/// Server-side opacity for a 0-100 transparency setting.
///
/// Clamped to 100 and mapped linearly onto the full CARDINAL range.
fn opacity_value(transparency: u8) -> u32 {
    let transparency = u32::from(transparency.min(100));
    (100 - transparency) * (0xffff_ffff / 100)
}

/// The notification window and its last known placement.
pub struct DisplaySurface {
    window: Window,
    dim: WindowDim,
    visible: bool,
    geometry: Geometry,
}

impl DisplaySurface {
    /// Create the window: unmapped, override-redirect, border-less,
    /// sized to the active region's width and a placeholder height.
    pub fn create(
        ctx: &XContext,
        config: &Config,
        region: ScreenRegion,
    ) -> Result<Self, SurfaceError> {
        let geometry = Geometry::parse(&config.window.geometry);
        let window = ctx.conn.generate_id()?;

        let aux = CreateWindowAux::new()
            .override_redirect(1)
            .background_pixmap(u32::from(BackPixmap::PARENT_RELATIVE))
            .event_mask(
                EventMask::EXPOSURE
                    | EventMask::KEY_PRESS
                    | EventMask::VISIBILITY_CHANGE
                    | EventMask::BUTTON_RELEASE
                    | EventMask::FOCUS_CHANGE
                    | EventMask::STRUCTURE_NOTIFY,
            );
        ctx.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            ctx.root,
            region.x as i16,
            region.y as i16,
            region.w.max(1) as u16,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &aux,
        )?;

        let surface = Self {
            window,
            dim: WindowDim::default(),
            visible: false,
            geometry,
        };
        surface.apply_wm_metadata(ctx, config)?;
        surface.apply_opacity(ctx, config.window.transparency)?;

        if config.window.follow != Follow::None {
            // Follow mode needs focus/property changes from the root to
            // know when the active output switches.
            ctx.conn.change_window_attributes(
                ctx.root,
                &ChangeWindowAttributesAux::new()
                    .event_mask(EventMask::FOCUS_CHANGE | EventMask::PROPERTY_CHANGE),
            )?;
        }

        ctx.conn.flush()?;
        Ok(surface)
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Title, class, window type and always-on-top state hints.
    fn apply_wm_metadata(&self, ctx: &XContext, config: &Config) -> Result<(), SurfaceError> {
        let title = config.window.title.as_bytes();
        ctx.conn.change_property8(
            PropMode::REPLACE,
            self.window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title,
        )?;
        ctx.conn.change_property8(
            PropMode::REPLACE,
            self.window,
            ctx.atoms._NET_WM_NAME,
            ctx.atoms.UTF8_STRING,
            title,
        )?;

        let class = format!("{}\0Toastd\0", config.window.class);
        ctx.conn.change_property8(
            PropMode::REPLACE,
            self.window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            class.as_bytes(),
        )?;

        ctx.conn.change_property32(
            PropMode::REPLACE,
            self.window,
            ctx.atoms._NET_WM_WINDOW_TYPE,
            AtomEnum::ATOM,
            &[
                ctx.atoms._NET_WM_WINDOW_TYPE_NOTIFICATION,
                ctx.atoms._NET_WM_WINDOW_TYPE_UTILITY,
            ],
        )?;
        ctx.conn.change_property32(
            PropMode::REPLACE,
            self.window,
            ctx.atoms._NET_WM_STATE,
            AtomEnum::ATOM,
            &[ctx.atoms._NET_WM_STATE_ABOVE],
        )?;
        Ok(())
    }

    fn apply_opacity(&self, ctx: &XContext, transparency: u8) -> Result<(), SurfaceError> {
        ctx.conn.change_property32(
            PropMode::REPLACE,
            self.window,
            ctx.atoms._NET_WM_WINDOW_OPACITY,
            AtomEnum::CARDINAL,
            &[opacity_value(transparency)],
        )?;
        Ok(())
    }

    /// Re-place the window for the given extent against the current
    /// active region.
    ///
    /// Only issues the move and/or resize the placement actually
    /// requires; the recorded dimensions are updated either way.
    pub fn move_resize(
        &mut self,
        ctx: &XContext,
        topology: &mut dyn ScreenTopology,
        width: u16,
        height: u16,
    ) -> Result<(), SurfaceError> {
        let region = topology.active_region(ctx);
        let (x, y) = self.geometry.place(&region, width, height);
        let target = WindowDim {
            x,
            y,
            w: width,
            h: height,
        };

        let plan = PlacementPlan::new(self.dim, target);
        if let Some((x, y)) = plan.move_to {
            ctx.conn
                .configure_window(self.window, &ConfigureWindowAux::new().x(x).y(y))?;
        }
        if let Some((w, h)) = plan.resize_to {
            ctx.conn.configure_window(
                self.window,
                &ConfigureWindowAux::new()
                    .width(u32::from(w))
                    .height(u32::from(h)),
            )?;
        }

        self.dim = target;
        Ok(())
    }

    /// Map and raise the window, re-acquiring the visible-only
    /// shortcuts and the button grab.
    ///
    /// A no-op when already visible or when there is nothing to show.
    /// The button grab uses a synchronous keyboard mode so clicks are
    /// captured deterministically; a refused button grab is only a
    /// warning, while key-grab errors follow the fallible-grab protocol.
    pub fn show(
        &mut self,
        ctx: &XContext,
        shortcuts: &mut ShortcutTable,
        stack_empty: bool,
    ) -> Result<(), SurfaceError> {
        if self.visible || stack_empty {
            return Ok(());
        }

        shortcuts.grab_visible(ctx)?;

        let cookie = ctx.conn.grab_button(
            false,
            self.window,
            EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
            GrabMode::ASYNC,
            GrabMode::SYNC,
            x11rb::NONE,
            x11rb::NONE,
            ButtonIndex::ANY,
            ModMask::ANY,
        )?;
        match cookie.check() {
            Ok(()) => {}
            Err(ReplyError::X11Error(ref error)) if error.error_kind == ErrorKind::Access => {
                warn!("unable to grab mouse button(s)");
            }
            Err(error) => return Err(error.into()),
        }

        ctx.conn.configure_window(
            self.window,
            &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
        )?;
        ctx.conn.map_window(self.window)?;
        self.visible = true;
        debug!("surface mapped");
        Ok(())
    }

    /// Unmap the window and release the grabs that only matter while
    /// visible.
    ///
    /// Flushes before returning: when this comes back the window is
    /// gone as far as the server is concerned.
    pub fn hide(
        &mut self,
        ctx: &XContext,
        shortcuts: &mut ShortcutTable,
    ) -> Result<(), SurfaceError> {
        shortcuts.ungrab_visible(ctx)?;
        ctx.conn
            .ungrab_button(ButtonIndex::ANY, self.window, ModMask::ANY)?;
        ctx.conn.unmap_window(self.window)?;
        ctx.conn.flush()?;
        self.visible = false;
        debug!("surface hidden");
        Ok(())
    }

    /// Tear the window down. The connection itself is released when the
    /// owning `XContext` drops; calling this without a successful
    /// `create` is safe because no surface exists to call it on.
    pub fn destroy(&mut self, ctx: &XContext) {
        let _ = ctx.conn.destroy_window(self.window);
        let _ = ctx.conn.flush();
        self.visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_maps_linearly() {
        assert_eq!(opacity_value(0), 100 * (0xffff_ffff / 100));
        assert_eq!(opacity_value(100), 0);
        assert_eq!(opacity_value(50), 50 * (0xffff_ffff / 100));
    }

    #[test]
    fn opacity_clamps_transparency() {
        assert_eq!(opacity_value(255), opacity_value(100));
        assert_eq!(opacity_value(101), 0);
    }
}
