//! Visible notification collection
//!
//! The daemon proper owns notification content, queueing and expiry; this
//! core only needs an ordered collection of what is currently on screen
//! (front = most recent) with each entry's rendered height, plus the
//! history the dismissed entries move to. That collection contract lives
//! here, together with the closed set of actions event routing produces.

use std::collections::VecDeque;

use tracing::debug;

/// Why a notification left the visible set.
///
/// Codes follow the desktop notification protocol: 1 expired, 2 dismissed
/// by the user, 3 closed by a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Expired,
    Dismissed,
    Closed,
}

impl CloseReason {
    pub const fn code(self) -> u32 {
        match self {
            Self::Expired => 1,
            Self::Dismissed => 2,
            Self::Closed => 3,
        }
    }
}

/// Everything event routing can ask the application to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    /// Dismiss the visible notification at `index` (0 = top of stack).
    Dismiss { index: usize, reason: CloseReason },
    /// Move every visible notification to history.
    DismissAll,
    /// Invoke the default action of the notification at `index` without
    /// dismissing it.
    InvokeAction { index: usize },
    /// Bring the most recently dismissed notification back on screen.
    PopHistory,
    /// Open the context menu for the visible notifications.
    OpenContextMenu,
    /// Repaint the surface.
    Redraw,
    /// Re-evaluate idle and visibility state.
    Wake,
}

/// Handle to one on-screen notification.
///
/// Content and styling stay with the rendering side; the core reads only
/// the identity and the rendered vertical extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub id: u32,
    pub displayed_height: i32,
}

impl Notification {
    pub const fn new(id: u32, displayed_height: i32) -> Self {
        Self {
            id,
            displayed_height,
        }
    }
}

/// Ordered visible notifications plus their dismissal history.
#[derive(Debug, Default)]
pub struct NotificationStack {
    visible: VecDeque<Notification>,
    history: Vec<Notification>,
    last_invoked: Option<u32>,
}

impl NotificationStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a notification on top of the stack.
    pub fn push(&mut self, notification: Notification) {
        self.visible.push_front(notification);
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Rendered heights, front (top of stack) first.
    pub fn heights(&self) -> Vec<i32> {
        self.visible.iter().map(|n| n.displayed_height).collect()
    }

    /// Total vertical extent of the stack including separators and the
    /// surrounding frame. Zero when nothing is visible.
    pub fn content_height(&self, separator_height: i32, frame_width: i32) -> i32 {
        if self.visible.is_empty() {
            return 0;
        }
        let heights: i32 = self.visible.iter().map(|n| n.displayed_height).sum();
        let separators = separator_height * (self.visible.len() as i32 - 1);
        heights + separators + 2 * frame_width
    }

    /// Move the notification at `index` to history.
    pub fn dismiss(&mut self, index: usize, reason: CloseReason) -> Option<Notification> {
        let notification = self.visible.remove(index)?;
        debug!(id = notification.id, code = reason.code(), "notification closed");
        self.history.push(notification);
        Some(notification)
    }

    /// Move every visible notification to history, top first.
    pub fn dismiss_all(&mut self) {
        while let Some(notification) = self.visible.pop_front() {
            self.history.push(notification);
        }
    }

    /// Bring the most recently dismissed notification back to the top.
    pub fn pop_history(&mut self) -> Option<Notification> {
        let notification = self.history.pop()?;
        self.visible.push_front(notification);
        Some(notification)
    }

    /// Trigger the default action of the notification at `index`.
    ///
    /// Action dispatch itself belongs to the daemon proper; the core only
    /// records which notification was asked to act.
    pub fn invoke_action(&mut self, index: usize) {
        if let Some(notification) = self.visible.get(index) {
            debug!(id = notification.id, "default action invoked");
            self.last_invoked = Some(notification.id);
        }
    }

    pub fn last_invoked(&self) -> Option<u32> {
        self.last_invoked
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Apply a stack-mutating action. Returns whether the visible set
    /// changed (the surface then needs a re-layout).
    ///
    /// `Redraw`, `Wake` and `OpenContextMenu` address other collaborators
    /// and are left untouched.
    pub fn apply(&mut self, action: StackAction) -> bool {
        match action {
            StackAction::Dismiss { index, reason } => self.dismiss(index, reason).is_some(),
            StackAction::DismissAll => {
                let changed = !self.visible.is_empty();
                self.dismiss_all();
                changed
            }
            StackAction::PopHistory => self.pop_history().is_some(),
            StackAction::InvokeAction { index } => {
                self.invoke_action(index);
                false
            }
            StackAction::OpenContextMenu | StackAction::Redraw | StackAction::Wake => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(heights: &[i32]) -> NotificationStack {
        let mut stack = NotificationStack::new();
        // push() stacks on top, so push bottom-most first.
        for (i, &h) in heights.iter().enumerate().rev() {
            stack.push(Notification::new(i as u32 + 1, h));
        }
        stack
    }

    #[test]
    fn push_stacks_on_top() {
        let mut stack = NotificationStack::new();
        stack.push(Notification::new(1, 10));
        stack.push(Notification::new(2, 20));
        assert_eq!(stack.heights(), vec![20, 10]);
    }

    #[test]
    fn dismiss_moves_to_history() {
        let mut stack = stack_of(&[10, 20, 30]);
        let closed = stack.dismiss(1, CloseReason::Dismissed).unwrap();
        assert_eq!(closed.displayed_height, 20);
        assert_eq!(stack.heights(), vec![10, 30]);
        assert_eq!(stack.history_len(), 1);

        assert!(stack.dismiss(5, CloseReason::Dismissed).is_none());
    }

    #[test]
    fn pop_history_restores_most_recent() {
        let mut stack = stack_of(&[10, 20]);
        stack.dismiss(0, CloseReason::Dismissed);
        stack.dismiss(0, CloseReason::Dismissed);
        assert!(stack.is_empty());

        stack.pop_history();
        assert_eq!(stack.heights(), vec![20]);
        stack.pop_history();
        assert_eq!(stack.heights(), vec![10, 20]);
        assert!(stack.pop_history().is_none());
    }

    #[test]
    fn content_height_counts_separators_and_frame() {
        let stack = stack_of(&[10, 20, 30]);
        assert_eq!(stack.content_height(2, 1), 10 + 20 + 30 + 2 * 2 + 2);
        assert_eq!(NotificationStack::new().content_height(2, 1), 0);
    }

    #[test]
    fn invoke_action_keeps_notification_visible() {
        let mut stack = stack_of(&[10, 20]);
        stack.invoke_action(1);
        assert_eq!(stack.last_invoked(), Some(2));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn apply_reports_visible_changes() {
        let mut stack = stack_of(&[10, 20]);
        assert!(stack.apply(StackAction::Dismiss {
            index: 0,
            reason: CloseReason::Dismissed,
        }));
        assert!(!stack.apply(StackAction::InvokeAction { index: 0 }));
        assert!(stack.apply(StackAction::DismissAll));
        assert!(!stack.apply(StackAction::DismissAll));
        assert!(stack.apply(StackAction::PopHistory));
        assert!(!stack.apply(StackAction::Redraw));
    }

    #[test]
    fn close_reason_codes() {
        assert_eq!(CloseReason::Expired.code(), 1);
        assert_eq!(CloseReason::Dismissed.code(), 2);
        assert_eq!(CloseReason::Closed.code(), 3);
    }
}
