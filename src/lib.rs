//! Windowing and input core of an X11 notification daemon.
//!
//! The daemon proper supplies notification content and scheduling; this
//! crate owns everything that touches the display server: the surface
//! and its placement, global shortcut and button grabs, idle probing,
//! and the event loop that turns X events into stack actions.

pub mod config;
pub mod daemon;
pub mod events;
pub mod geometry;
pub mod hit;
pub mod idle;
pub mod screen;
pub mod shortcut;
pub mod stack;
pub mod surface;

pub use config::Config;
pub use daemon::{Daemon, Painter};
pub use events::{classify, route, Dispatcher, RouteEnv, SurfaceEvent};
pub use geometry::Geometry;
pub use screen::{ScreenRegion, ScreenTopology};
pub use shortcut::{KeyboardShortcut, ShortcutTable};
pub use stack::{CloseReason, Notification, NotificationStack, StackAction};
pub use surface::{DisplaySurface, XContext};
