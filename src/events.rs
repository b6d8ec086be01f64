//! Event dispatch
//!
//! Pulls pending X events off the queue without ever blocking, narrows
//! them to the closed set of events this core reacts to, and routes each
//! one to the stack actions it requests. Everything else is handed to
//! the screen topology collaborator.

use x11rb::connection::Connection;
use x11rb::errors::ConnectionError;
use x11rb::protocol::xproto::{Keycode, Window};
use x11rb::protocol::Event;

use crate::hit;
use crate::shortcut::ShortcutTable;
use crate::stack::{CloseReason, StackAction};
use crate::surface::XContext;

/// The events this core actually handles.
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    /// An exposed region became visible; `last_in_batch` is set on the
    /// final event of a batched sequence.
    Exposed { last_in_batch: bool },
    /// A pointer button was released over `window`.
    ButtonReleased { window: Window, button: u8, y: i16 },
    /// A key went down with the given raw modifier state.
    KeyPressed { keycode: Keycode, state: u16 },
    /// Focus or a property changed somewhere we listen; re-evaluate
    /// idle and visibility.
    Wake,
    /// Not ours; forwarded to the screen topology collaborator.
    Unhandled(Event),
}

/// Narrow a raw X event to the closed set above.
pub fn classify(event: Event) -> SurfaceEvent {
    match event {
        Event::Expose(expose) => SurfaceEvent::Exposed {
            last_in_batch: expose.count == 0,
        },
        Event::ButtonRelease(button) => SurfaceEvent::ButtonReleased {
            window: button.event,
            button: button.detail,
            y: button.event_y,
        },
        Event::KeyPress(key) => SurfaceEvent::KeyPressed {
            keycode: key.detail,
            state: key.state.into(),
        },
        Event::FocusIn(_) | Event::FocusOut(_) | Event::PropertyNotify(_) => SurfaceEvent::Wake,
        other => SurfaceEvent::Unhandled(other),
    }
}

/// Per-dispatch context for routing.
pub struct RouteEnv<'a> {
    /// The surface's own window; clicks elsewhere are not ours.
    pub surface_window: Window,
    /// Whether the surface is currently mapped.
    pub surface_visible: bool,
    pub shortcuts: &'a ShortcutTable,
    /// Visible notification heights, top first.
    pub heights: &'a [i32],
    pub separator_height: i32,
    pub frame_width: i32,
}

/// Route one classified event to the actions it requests.
///
/// Key presses are compared with NumLock stripped from the reported
/// state, since shortcut masks never include it. Each of the four
/// shortcut slots is evaluated on its own; two slots bound to the same
/// key both fire from one event.
pub fn route(event: &SurfaceEvent, env: &RouteEnv<'_>) -> Vec<StackAction> {
    let mut actions = Vec::new();

    match event {
        SurfaceEvent::Exposed { last_in_batch } => {
            if *last_in_batch && env.surface_visible {
                actions.push(StackAction::Redraw);
            }
        }
        SurfaceEvent::ButtonReleased { window, button, y } => {
            if *window == env.surface_window {
                actions.extend(hit::route_click(
                    (*button).into(),
                    i32::from(*y),
                    env.heights,
                    env.separator_height,
                    env.frame_width,
                ));
            }
        }
        SurfaceEvent::KeyPressed { keycode, state } => {
            let state = state & !env.shortcuts.numlock_mask();
            let keysym = env.shortcuts.keymap().keysym(*keycode, 0);

            if env.shortcuts.close.matches(keysym, state) {
                actions.push(StackAction::Dismiss {
                    index: 0,
                    reason: CloseReason::Dismissed,
                });
            }
            if env.shortcuts.history.matches(keysym, state) {
                actions.push(StackAction::PopHistory);
            }
            if env.shortcuts.close_all.matches(keysym, state) {
                actions.push(StackAction::DismissAll);
            }
            if env.shortcuts.context.matches(keysym, state) {
                actions.push(StackAction::OpenContextMenu);
            }
        }
        SurfaceEvent::Wake => actions.push(StackAction::Wake),
        SurfaceEvent::Unhandled(_) => {}
    }

    actions
}

/// Readiness hooks over the connection's event queue.
///
/// `pending` never blocks (it polls at most one event and stashes it);
/// `drain` returns whatever is queued right now and nothing more, so a
/// dispatch pass is always bounded.
#[derive(Debug, Default)]
pub struct Dispatcher {
    queued: Option<Event>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is a native event waiting?
    pub fn pending(&mut self, ctx: &XContext) -> Result<bool, ConnectionError> {
        if self.queued.is_none() {
            self.queued = ctx.conn.poll_for_event()?;
        }
        Ok(self.queued.is_some())
    }

    /// Take every currently queued event.
    pub fn drain(&mut self, ctx: &XContext) -> Result<Vec<Event>, ConnectionError> {
        let mut events = Vec::new();
        if let Some(event) = self.queued.take() {
            events.push(event);
        }
        while let Some(event) = ctx.conn.poll_for_event()? {
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortcut::{Keymap, KeyboardShortcut};
    use x11rb::protocol::xproto::{
        Atom, ButtonReleaseEvent, ExposeEvent, KeyButMask, KeyPressEvent, Property,
        PropertyNotifyEvent,
    };
    use x11rb::protocol::xproto::ModMask;

    const KEY_SPACE: u32 = 0x0020;
    const KEY_GRAVE: u32 = 0x0060;
    const SURFACE: Window = 0x60_0001;

    /// keycode 10 -> space, keycode 11 -> grave; NumLock on mod2.
    fn table() -> ShortcutTable {
        let keymap = Keymap::new(10, 1, vec![KEY_SPACE, KEY_GRAVE]);
        let mut close = KeyboardShortcut::parse("ctrl+space");
        let mut close_all = KeyboardShortcut::parse("ctrl+shift+space");
        let mut history = KeyboardShortcut::parse("ctrl+grave");
        let mut context = KeyboardShortcut::parse("ctrl+shift+period");
        close.resolve(&keymap);
        close_all.resolve(&keymap);
        history.resolve(&keymap);
        context.resolve(&keymap);
        ShortcutTable::from_resolved(
            close,
            close_all,
            history,
            context,
            keymap,
            u16::from(ModMask::M2),
        )
    }

    fn env<'a>(shortcuts: &'a ShortcutTable, heights: &'a [i32], visible: bool) -> RouteEnv<'a> {
        RouteEnv {
            surface_window: SURFACE,
            surface_visible: visible,
            shortcuts,
            heights,
            separator_height: 2,
            frame_width: 1,
        }
    }

    fn key_press(keycode: Keycode, state: u16) -> SurfaceEvent {
        classify(Event::KeyPress(KeyPressEvent {
            response_type: 2,
            detail: keycode,
            sequence: 0,
            time: 0,
            root: 0,
            event: SURFACE,
            child: 0,
            root_x: 0,
            root_y: 0,
            event_x: 0,
            event_y: 0,
            state: KeyButMask::from(state),
            same_screen: true,
        }))
    }

    fn button_release(window: Window, button: u8, y: i16) -> SurfaceEvent {
        classify(Event::ButtonRelease(ButtonReleaseEvent {
            response_type: 5,
            detail: button,
            sequence: 0,
            time: 0,
            root: 0,
            event: window,
            child: 0,
            root_x: 0,
            root_y: 0,
            event_x: 0,
            event_y: y,
            state: KeyButMask::from(0u16),
            same_screen: true,
        }))
    }

    fn expose(count: u16) -> SurfaceEvent {
        classify(Event::Expose(ExposeEvent {
            response_type: 12,
            sequence: 0,
            window: SURFACE,
            x: 0,
            y: 0,
            width: 300,
            height: 40,
            count,
        }))
    }

    fn property_notify() -> SurfaceEvent {
        classify(Event::PropertyNotify(PropertyNotifyEvent {
            response_type: 28,
            sequence: 0,
            window: SURFACE,
            atom: Atom::from(1u8),
            time: 0,
            state: Property::NEW_VALUE,
        }))
    }

    #[test]
    fn classify_narrows_expose_batches() {
        assert!(matches!(
            expose(3),
            SurfaceEvent::Exposed {
                last_in_batch: false
            }
        ));
        assert!(matches!(
            expose(0),
            SurfaceEvent::Exposed {
                last_in_batch: true
            }
        ));
    }

    #[test]
    fn redraw_only_when_visible_and_batch_done() {
        let shortcuts = table();
        let heights = [10];

        let done = SurfaceEvent::Exposed { last_in_batch: true };
        let partial = SurfaceEvent::Exposed { last_in_batch: false };

        assert_eq!(
            route(&done, &env(&shortcuts, &heights, true)),
            vec![StackAction::Redraw]
        );
        assert!(route(&partial, &env(&shortcuts, &heights, true)).is_empty());
        assert!(route(&done, &env(&shortcuts, &heights, false)).is_empty());
    }

    #[test]
    fn shortcut_fires_with_exact_state() {
        let shortcuts = table();
        let ctrl = u16::from(ModMask::CONTROL);

        let actions = route(&key_press(10, ctrl), &env(&shortcuts, &[10], true));
        assert_eq!(
            actions,
            vec![StackAction::Dismiss {
                index: 0,
                reason: CloseReason::Dismissed,
            }]
        );

        // Wrong modifiers: nothing fires.
        assert!(route(&key_press(10, 0), &env(&shortcuts, &[10], true)).is_empty());
    }

    #[test]
    fn numlock_state_is_stripped_before_matching() {
        let shortcuts = table();
        let state = u16::from(ModMask::CONTROL) | u16::from(ModMask::M2);

        let actions = route(&key_press(10, state), &env(&shortcuts, &[10], true));
        assert_eq!(
            actions,
            vec![StackAction::Dismiss {
                index: 0,
                reason: CloseReason::Dismissed,
            }]
        );
    }

    #[test]
    fn duplicate_bindings_fire_both_actions() {
        // close and history deliberately bound to the same spec: a
        // single key event triggers both, since the four slots are
        // evaluated independently.
        let keymap = Keymap::new(10, 1, vec![KEY_SPACE]);
        let mut close = KeyboardShortcut::parse("ctrl+space");
        let mut history = KeyboardShortcut::parse("ctrl+space");
        close.resolve(&keymap);
        history.resolve(&keymap);
        let shortcuts = ShortcutTable::from_resolved(
            close,
            KeyboardShortcut::parse("none"),
            history,
            KeyboardShortcut::parse("none"),
            keymap,
            0,
        );

        let actions = route(
            &key_press(10, u16::from(ModMask::CONTROL)),
            &env(&shortcuts, &[10], true),
        );
        assert_eq!(
            actions,
            vec![
                StackAction::Dismiss {
                    index: 0,
                    reason: CloseReason::Dismissed,
                },
                StackAction::PopHistory,
            ]
        );
    }

    #[test]
    fn clicks_on_foreign_windows_are_ignored() {
        let shortcuts = table();
        let heights = [10, 20];

        let foreign = button_release(SURFACE + 1, 1, 5);
        assert!(route(&foreign, &env(&shortcuts, &heights, true)).is_empty());

        let ours = button_release(SURFACE, 1, 5);
        assert_eq!(
            route(&ours, &env(&shortcuts, &heights, true)),
            vec![StackAction::Dismiss {
                index: 0,
                reason: CloseReason::Dismissed,
            }]
        );
    }

    #[test]
    fn focus_and_property_changes_wake() {
        let shortcuts = table();
        let ev = property_notify();
        assert_eq!(
            route(&ev, &env(&shortcuts, &[], false)),
            vec![StackAction::Wake]
        );
    }
}
