//! Daemon core
//!
//! Wires the display context, surface, shortcuts, dispatcher and
//! notification stack into one cooperative event loop, and applies the
//! actions event routing produces.

use std::os::unix::io::AsRawFd;
use std::process::Command as ProcessCommand;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use calloop::generic::Generic;
use calloop::{EventLoop, Interest, Mode, PostAction};
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt;
use x11rb::protocol::Event;

use crate::config::{Config, StackConfig};
use crate::events::{classify, route, Dispatcher, RouteEnv, SurfaceEvent};
use crate::geometry::Geometry;
use crate::idle::IdleProbe;
use crate::screen::{RootScreen, ScreenTopology};
use crate::shortcut::ShortcutTable;
use crate::stack::{Notification, NotificationStack, StackAction};
use crate::surface::{DisplaySurface, XContext};

/// Rendering collaborator.
///
/// Text layout and pixel painting live outside this core; the daemon
/// only asks for the extent the current stack wants and for repaints.
pub trait Painter {
    /// Desired surface extent for the current stack contents.
    fn measure(
        &mut self,
        stack: &NotificationStack,
        geometry: &Geometry,
        spacing: &StackConfig,
    ) -> (u16, u16);

    /// Repaint the surface.
    fn paint(
        &mut self,
        ctx: &XContext,
        surface: &DisplaySurface,
        stack: &NotificationStack,
    ) -> Result<()>;
}

/// Width used when the geometry asks for content-driven sizing and no
/// renderer supplies one.
const FALLBACK_WIDTH: u16 = 300;

/// Painter that sizes from the stack and clears the surface.
///
/// Stands in until a real renderer is attached through the seam.
#[derive(Debug, Default)]
pub struct BlankPainter;

impl Painter for BlankPainter {
    fn measure(
        &mut self,
        stack: &NotificationStack,
        geometry: &Geometry,
        spacing: &StackConfig,
    ) -> (u16, u16) {
        let width = if geometry.dynamic_width || geometry.width == 0 {
            FALLBACK_WIDTH
        } else {
            geometry.width.min(u32::from(u16::MAX)) as u16
        };
        let height = stack
            .content_height(spacing.separator_height, spacing.frame_width)
            .clamp(1, i32::from(u16::MAX)) as u16;
        (width, height)
    }

    fn paint(
        &mut self,
        ctx: &XContext,
        surface: &DisplaySurface,
        _stack: &NotificationStack,
    ) -> Result<()> {
        ctx.conn.clear_area(false, surface.window(), 0, 0, 0, 0)?;
        Ok(())
    }
}

/// The daemon's component graph.
pub struct Daemon<P: Painter> {
    ctx: XContext,
    config: Config,
    surface: DisplaySurface,
    shortcuts: ShortcutTable,
    dispatcher: Dispatcher,
    topology: Box<dyn ScreenTopology>,
    stack: NotificationStack,
    idle: IdleProbe,
    painter: P,
    user_idle: bool,
    running: bool,
}

impl<P: Painter> Daemon<P> {
    /// Set up every component against a fresh display context.
    ///
    /// Mirrors the startup order the daemon needs: shortcuts are parsed
    /// and probe-grabbed once so contention surfaces immediately, then
    /// the window is created, then the history shortcut (the only one
    /// active while hidden) is grabbed for good.
    pub fn new(ctx: XContext, config: Config, painter: P) -> Result<Self> {
        let mut topology: Box<dyn ScreenTopology> = Box::<RootScreen>::default();

        let mut shortcuts = ShortcutTable::new(&ctx, &config.shortcuts)?;
        shortcuts.probe_all(&ctx)?;

        let region = topology.active_region(&ctx);
        let surface = DisplaySurface::create(&ctx, &config, region)?;
        shortcuts.grab_history(&ctx)?;
        ctx.conn.flush()?;

        let idle = IdleProbe::new(config.general.idle_threshold);

        Ok(Self {
            ctx,
            config,
            surface,
            shortcuts,
            dispatcher: Dispatcher::new(),
            topology,
            stack: NotificationStack::new(),
            idle,
            painter,
            user_idle: false,
            running: true,
        })
    }

    /// Put a notification on screen. This is the seam the daemon's
    /// notification source feeds.
    pub fn notify(&mut self, notification: Notification) -> Result<()> {
        self.stack.push(notification);
        self.update()
    }

    pub fn stack(&self) -> &NotificationStack {
        &self.stack
    }

    pub fn user_idle(&self) -> bool {
        self.user_idle
    }

    /// Drain and handle everything currently queued.
    fn dispatch_pending(&mut self) -> Result<()> {
        let events = self.dispatcher.drain(&self.ctx)?;
        for raw in events {
            if let Event::Error(err) = &raw {
                bail!("fatal display server error: {err:?}");
            }
            match classify(raw) {
                SurfaceEvent::Unhandled(raw) => self.topology.check_event(&raw),
                event => {
                    let heights = self.stack.heights();
                    let actions = route(
                        &event,
                        &RouteEnv {
                            surface_window: self.surface.window(),
                            surface_visible: self.surface.visible(),
                            shortcuts: &self.shortcuts,
                            heights: &heights,
                            separator_height: self.config.stack.separator_height,
                            frame_width: self.config.stack.frame_width,
                        },
                    );
                    for action in actions {
                        self.apply_action(action)?;
                    }
                }
            }
        }
        self.ctx.conn.flush()?;
        Ok(())
    }

    fn apply_action(&mut self, action: StackAction) -> Result<()> {
        match action {
            StackAction::Redraw => self.repaint(),
            StackAction::Wake => self.update(),
            StackAction::OpenContextMenu => {
                self.open_context_menu();
                Ok(())
            }
            other => {
                if self.stack.apply(other) {
                    self.update()
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Re-evaluate idle and visibility state and re-fit the surface to
    /// the stack.
    fn update(&mut self) -> Result<()> {
        let idle = self.idle.is_idle(&self.ctx);
        if idle != self.user_idle {
            self.user_idle = idle;
            debug!(idle, "idle state changed");
        }

        if self.stack.is_empty() {
            if self.surface.visible() {
                self.surface.hide(&self.ctx, &mut self.shortcuts)?;
            }
            return Ok(());
        }

        self.surface
            .show(&self.ctx, &mut self.shortcuts, self.stack.is_empty())?;
        let (width, height) =
            self.painter
                .measure(&self.stack, self.surface.geometry(), &self.config.stack);
        self.surface
            .move_resize(&self.ctx, self.topology.as_mut(), width, height)?;
        self.repaint()
    }

    fn repaint(&mut self) -> Result<()> {
        if !self.surface.visible() {
            return Ok(());
        }
        self.painter
            .paint(&self.ctx, &self.surface, &self.stack)
            .context("repaint failed")
    }

    fn open_context_menu(&mut self) {
        match &self.config.general.context_command {
            Some(command) => {
                debug!(command = %command, "opening context menu");
                if let Err(err) = ProcessCommand::new("sh").arg("-c").arg(command).spawn() {
                    warn!("failed to spawn context menu command: {err}");
                }
            }
            None => debug!("context menu requested but no command configured"),
        }
    }

    /// Run the cooperative event loop until stopped or a fatal error.
    ///
    /// The connection's stream is registered as a level-triggered
    /// readable source; each readiness wakes one bounded drain.
    pub fn run_loop(mut self) -> Result<()> {
        let mut event_loop: EventLoop<Self> =
            EventLoop::try_new().context("failed to create event loop")?;
        let signal = event_loop.get_signal();

        let fd = self.ctx.conn.stream().as_raw_fd();
        event_loop
            .handle()
            .insert_source(
                Generic::from_fd(fd, Interest::READ, Mode::Level),
                |_, _, daemon: &mut Self| {
                    if let Err(err) = daemon.dispatch_pending() {
                        error!("event dispatch failed: {err:#}");
                        daemon.running = false;
                    }
                    Ok(PostAction::Continue)
                },
            )
            .map_err(|err| anyhow!("failed to register display source: {err}"))?;

        self.update()?;
        self.ctx.conn.flush()?;
        info!("entering event loop");

        event_loop
            .run(Some(Duration::from_millis(500)), &mut self, move |daemon| {
                if !daemon.running {
                    signal.stop();
                }
            })
            .context("event loop failed")?;

        self.surface.destroy(&self.ctx);
        Ok(())
    }
}

/// Connect to the display and run the daemon with the built-in painter.
pub fn run(config: Config) -> Result<()> {
    let ctx = XContext::connect().context("cannot open display")?;
    let daemon = Daemon::new(ctx, config, BlankPainter)?;
    daemon.run_loop()
}
