//! Click hit-testing
//!
//! Maps the vertical coordinate of a pointer click on the surface to the
//! visible notification it landed on, and turns button releases into
//! stack actions.

use crate::stack::{CloseReason, StackAction};

/// Pointer buttons the surface reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickButton {
    Left,
    Middle,
    Right,
    Other(u8),
}

impl From<u8> for ClickButton {
    fn from(detail: u8) -> Self {
        match detail {
            1 => Self::Left,
            2 => Self::Middle,
            3 => Self::Right,
            other => Self::Other(other),
        }
    }
}

/// Find the notification under `click_y`.
///
/// Walks the stack from the top, accumulating a running offset that
/// starts at the separator height; the first item's band additionally
/// starts after the frame. Band edges are inclusive, so the first and
/// last rendered row of an item both count as that item. `None` when the
/// click is above the first band or below the last.
pub fn locate(
    click_y: i32,
    heights: &[i32],
    separator_height: i32,
    frame_width: i32,
) -> Option<usize> {
    let mut offset = separator_height;
    for (index, &height) in heights.iter().enumerate() {
        if index == 0 {
            offset += frame_width;
        }
        if click_y >= offset && click_y <= offset + height {
            return Some(index);
        }
        offset += height + separator_height;
    }
    None
}

/// Turn a button release at `click_y` into the action it requests.
///
/// Right button dismisses the whole stack regardless of position. Left
/// and middle buttons go through hit-testing: left dismisses the hit
/// notification, middle invokes its default action instead. Anything
/// else is ignored.
pub fn route_click(
    button: ClickButton,
    click_y: i32,
    heights: &[i32],
    separator_height: i32,
    frame_width: i32,
) -> Option<StackAction> {
    match button {
        ClickButton::Right => Some(StackAction::DismissAll),
        ClickButton::Left => locate(click_y, heights, separator_height, frame_width).map(|index| {
            StackAction::Dismiss {
                index,
                reason: CloseReason::Dismissed,
            }
        }),
        ClickButton::Middle => locate(click_y, heights, separator_height, frame_width)
            .map(|index| StackAction::InvokeAction { index }),
        ClickButton::Other(_) => None,
    }
}
