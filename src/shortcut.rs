//! Global keyboard shortcuts
//!
//! Parses shortcut specification strings, resolves key symbols against
//! the server's keyboard mapping, and grabs/ungrabs the keys on the root
//! window. Grabs are fallible: another client may already hold the key,
//! which only invalidates that one shortcut.

use thiserror::Error;
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::{ConnectionExt, GrabMode, Keycode, ModMask};
use x11rb::protocol::ErrorKind;
use xkbcommon::xkb;

use crate::surface::XContext;

/// Shortcut subsystem errors. Grab contention is not among them: it is
/// reported by invalidating the shortcut, not by failing the call.
#[derive(Debug, Error)]
pub enum ShortcutError {
    #[error("display connection failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("display server request failed: {0}")]
    Reply(#[from] ReplyError),
}

/// Modifier-map index to modifier bit, in map order.
const MODIFIER_TABLE: [ModMask; 8] = [
    ModMask::SHIFT,
    ModMask::LOCK,
    ModMask::CONTROL,
    ModMask::M1,
    ModMask::M2,
    ModMask::M3,
    ModMask::M4,
    ModMask::M5,
];

/// Modifier bit for a spec token; zero (with a warning) for tokens the
/// grammar does not know.
fn modifier_mask(token: &str) -> u16 {
    let mask = match token {
        "ctrl" => ModMask::CONTROL,
        "mod4" => ModMask::M4,
        "mod3" => ModMask::M3,
        "mod2" => ModMask::M2,
        "mod1" => ModMask::M1,
        "shift" => ModMask::SHIFT,
        _ => {
            warn!("unknown modifier: {token}");
            return 0;
        }
    };
    u16::from(mask)
}

/// Snapshot of the server's keycode-to-keysym mapping.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    min_keycode: Keycode,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl Keymap {
    pub fn new(min_keycode: Keycode, keysyms_per_keycode: u8, keysyms: Vec<u32>) -> Self {
        Self {
            min_keycode,
            keysyms_per_keycode,
            keysyms,
        }
    }

    /// Fetch the full mapping from the server.
    pub fn fetch(ctx: &XContext) -> Result<Self, ShortcutError> {
        let setup = ctx.conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = ctx.conn.get_keyboard_mapping(min, max - min + 1)?.reply()?;
        Ok(Self::new(min, reply.keysyms_per_keycode, reply.keysyms))
    }

    /// Keysym bound to `keycode` at the given column; 0 when unbound.
    pub fn keysym(&self, keycode: Keycode, column: u8) -> u32 {
        if keycode < self.min_keycode || column >= self.keysyms_per_keycode {
            return 0;
        }
        let index = usize::from(keycode - self.min_keycode) * usize::from(self.keysyms_per_keycode)
            + usize::from(column);
        self.keysyms.get(index).copied().unwrap_or(0)
    }

    /// First keycode producing `keysym` in column 0 or 1 (the unshifted
    /// and shifted levels), scanning the whole keyboard.
    pub fn keycode_for(&self, keysym: u32) -> Option<Keycode> {
        if keysym == 0 {
            return None;
        }
        let per = usize::from(self.keysyms_per_keycode);
        if per == 0 {
            return None;
        }
        let count = (self.keysyms.len() / per).min(usize::from(u8::MAX));
        (0..count).find_map(|i| {
            let keycode = self.min_keycode.checked_add(i as u8)?;
            let matches = self.keysym(keycode, 0) == keysym
                || (per > 1 && self.keysym(keycode, 1) == keysym);
            matches.then_some(keycode)
        })
    }
}

/// One configured global shortcut.
///
/// Invalid shortcuts (empty/"none" spec, unresolvable symbol, refused
/// grab) are silently skipped by every operation here.
#[derive(Debug, Clone)]
pub struct KeyboardShortcut {
    pub spec: String,
    pub mask: u16,
    pub keysym: u32,
    pub keycode: Option<Keycode>,
    pub valid: bool,
}

impl KeyboardShortcut {
    /// Parse a `mod+mod+...+keyname` spec.
    ///
    /// Everything before the final `+` is a modifier token; unknown
    /// tokens are warned about and ignored rather than failing the
    /// parse. `"none"` and the empty string yield an always-invalid
    /// shortcut.
    pub fn parse(spec: &str) -> Self {
        let trimmed = spec.trim();
        if trimmed.is_empty() || trimmed == "none" {
            return Self {
                spec: spec.to_owned(),
                mask: 0,
                keysym: 0,
                keycode: None,
                valid: false,
            };
        }

        let mut mask = 0;
        let parts: Vec<&str> = trimmed.split('+').collect();
        let Some((key_name, modifiers)) = parts.split_last() else {
            return Self {
                spec: spec.to_owned(),
                mask: 0,
                keysym: 0,
                keycode: None,
                valid: false,
            };
        };
        for token in modifiers {
            mask |= modifier_mask(token.trim());
        }

        let keysym = xkb::keysym_from_name(key_name.trim(), xkb::KEYSYM_NO_FLAGS);
        Self {
            spec: spec.to_owned(),
            mask,
            keysym,
            keycode: None,
            valid: keysym != 0,
        }
    }

    /// Resolve the key symbol to a keycode on the current keyboard.
    pub fn resolve(&mut self, keymap: &Keymap) {
        if !self.valid {
            return;
        }
        self.keycode = keymap.keycode_for(self.keysym);
        if self.keycode.is_none() {
            warn!("unknown keyboard shortcut: {}", self.spec);
            self.valid = false;
        }
    }

    /// Does a key event with this symbol and (NumLock-stripped) modifier
    /// state trigger the shortcut?
    pub fn matches(&self, keysym: u32, state: u16) -> bool {
        self.valid && self.keysym == keysym && self.mask == state
    }

    /// Grab the key on the root window, once with the configured mask
    /// and once with NumLock added so the shortcut fires regardless of
    /// NumLock state.
    ///
    /// A refused grab (`Access`: another client holds the key) marks the
    /// shortcut invalid and warns; any other protocol error is fatal and
    /// propagated.
    pub fn grab(&mut self, ctx: &XContext, numlock: u16) -> Result<(), ShortcutError> {
        let Some(keycode) = self.keycode.filter(|_| self.valid) else {
            return Ok(());
        };

        for mask in [self.mask, self.mask | numlock] {
            let cookie = ctx.conn.grab_key(
                true,
                ctx.root,
                ModMask::from(mask),
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?;
            match cookie.check() {
                Ok(()) => {}
                Err(ReplyError::X11Error(ref error)) if error.error_kind == ErrorKind::Access => {
                    warn!("unable to grab key \"{}\"", self.spec);
                    self.valid = false;
                    return Ok(());
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }

    /// Release both grabs of the key.
    pub fn ungrab(&self, ctx: &XContext, numlock: u16) -> Result<(), ShortcutError> {
        let Some(keycode) = self.keycode.filter(|_| self.valid) else {
            return Ok(());
        };
        ctx.conn
            .ungrab_key(keycode, ctx.root, ModMask::from(self.mask))?;
        ctx.conn
            .ungrab_key(keycode, ctx.root, ModMask::from(self.mask | numlock))?;
        Ok(())
    }
}

/// The four configured shortcuts plus the cached keyboard state they are
/// matched against.
#[derive(Debug)]
pub struct ShortcutTable {
    pub close: KeyboardShortcut,
    pub close_all: KeyboardShortcut,
    pub history: KeyboardShortcut,
    pub context: KeyboardShortcut,
    keymap: Keymap,
    numlock: u16,
}

impl ShortcutTable {
    /// Parse and resolve all configured shortcuts against the live
    /// keyboard mapping, and resolve the NumLock modifier bit.
    pub fn new(ctx: &XContext, config: &crate::config::ShortcutConfig) -> Result<Self, ShortcutError> {
        let keymap = Keymap::fetch(ctx)?;
        let numlock = numlock_mask(ctx, &keymap)?;

        let mut table = Self::from_resolved(
            KeyboardShortcut::parse(&config.close),
            KeyboardShortcut::parse(&config.close_all),
            KeyboardShortcut::parse(&config.history),
            KeyboardShortcut::parse(&config.context),
            keymap,
            numlock,
        );
        table.close.resolve(&table.keymap);
        table.close_all.resolve(&table.keymap);
        table.history.resolve(&table.keymap);
        table.context.resolve(&table.keymap);
        Ok(table)
    }

    /// Assemble a table from already-resolved parts. Embedders that do
    /// their own symbol resolution (and the integration tests) come in
    /// through here.
    pub fn from_resolved(
        close: KeyboardShortcut,
        close_all: KeyboardShortcut,
        history: KeyboardShortcut,
        context: KeyboardShortcut,
        keymap: Keymap,
        numlock: u16,
    ) -> Self {
        Self {
            close,
            close_all,
            history,
            context,
            keymap,
            numlock,
        }
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    /// The modifier bit NumLock occupies on this keyboard.
    pub fn numlock_mask(&self) -> u16 {
        self.numlock
    }

    /// Grab and immediately release every shortcut once, so contention
    /// with other clients surfaces at startup instead of at first show.
    pub fn probe_all(&mut self, ctx: &XContext) -> Result<(), ShortcutError> {
        let numlock = self.numlock;
        for shortcut in [
            &mut self.close,
            &mut self.close_all,
            &mut self.history,
            &mut self.context,
        ] {
            shortcut.grab(ctx, numlock)?;
            shortcut.ungrab(ctx, numlock)?;
        }
        Ok(())
    }

    /// Grab the history shortcut; it stays active while the surface is
    /// hidden.
    pub fn grab_history(&mut self, ctx: &XContext) -> Result<(), ShortcutError> {
        self.history.grab(ctx, self.numlock)
    }

    /// Grab the shortcuts that are only meaningful while the surface is
    /// visible.
    pub fn grab_visible(&mut self, ctx: &XContext) -> Result<(), ShortcutError> {
        let numlock = self.numlock;
        self.close.grab(ctx, numlock)?;
        self.close_all.grab(ctx, numlock)?;
        self.context.grab(ctx, numlock)
    }

    /// Release the visible-only shortcuts.
    pub fn ungrab_visible(&mut self, ctx: &XContext) -> Result<(), ShortcutError> {
        let numlock = self.numlock;
        self.close.ungrab(ctx, numlock)?;
        self.close_all.ungrab(ctx, numlock)?;
        self.context.ungrab(ctx, numlock)
    }
}

/// Resolve which modifier bit NumLock occupies.
///
/// Scans the server's modifier map for the keycode bound to `Num_Lock`
/// and returns the mask of the map slot holding it; zero when the key is
/// not a modifier on this keyboard.
fn numlock_mask(ctx: &XContext, keymap: &Keymap) -> Result<u16, ShortcutError> {
    let numlock_sym = xkb::keysym_from_name("Num_Lock", xkb::KEYSYM_NO_FLAGS);
    let Some(numlock_code) = keymap.keycode_for(numlock_sym) else {
        return Ok(0);
    };
    let reply = ctx.conn.get_modifier_mapping()?.reply()?;
    Ok(numlock_from_mapping(
        usize::from(reply.keycodes_per_modifier()),
        &reply.keycodes,
        numlock_code,
    ))
}

/// Pure core of the NumLock lookup over a raw modifier map.
fn numlock_from_mapping(
    keycodes_per_modifier: usize,
    keycodes: &[Keycode],
    numlock_code: Keycode,
) -> u16 {
    if numlock_code == 0 || keycodes_per_modifier == 0 {
        return 0;
    }
    for (index, mask) in MODIFIER_TABLE.iter().enumerate() {
        let start = index * keycodes_per_modifier;
        let Some(slot) = keycodes.get(start..start + keycodes_per_modifier) else {
            break;
        };
        if slot.contains(&numlock_code) {
            return u16::from(*mask);
        }
    }
    0
}
