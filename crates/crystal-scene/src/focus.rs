//! Focus-transition signals read by the culling and optimization guards.

use std::cell::Cell;

/// Read-only view of the camera controller's focus state.
///
/// While any signal is active, culling and auto-tuning must not apply visual
/// side effects (visibility toggles, culling distance changes).
pub trait FocusState {
    /// A focus transition (camera animation) is in flight.
    fn is_animating(&self) -> bool;

    /// A focus transition ended recently and the view is still settling.
    fn is_recently_ended(&self) -> bool;

    /// The camera is currently focused on an object.
    fn has_active_focus(&self) -> bool;

    /// Any of the three signals is active.
    fn is_guarded(&self) -> bool {
        self.is_animating() || self.is_recently_ended() || self.has_active_focus()
    }
}

/// A focus state that never guards. Used when no camera controller is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFocus;

impl FocusState for NoFocus {
    fn is_animating(&self) -> bool {
        false
    }

    fn is_recently_ended(&self) -> bool {
        false
    }

    fn has_active_focus(&self) -> bool {
        false
    }
}

/// Plain flag-backed focus state, written by a camera controller on the
/// render thread and shared with the pipeline behind an `Rc`.
#[derive(Debug, Default)]
pub struct FocusFlags {
    animating: Cell<bool>,
    recently_ended: Cell<bool>,
    focused: Cell<bool>,
}

impl FocusFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_animating(&self, animating: bool) {
        self.animating.set(animating);
    }

    pub fn set_recently_ended(&self, recently_ended: bool) {
        self.recently_ended.set(recently_ended);
    }

    pub fn set_focused(&self, focused: bool) {
        self.focused.set(focused);
    }
}

impl FocusState for FocusFlags {
    fn is_animating(&self) -> bool {
        self.animating.get()
    }

    fn is_recently_ended(&self) -> bool {
        self.recently_ended.get()
    }

    fn has_active_focus(&self) -> bool {
        self.focused.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_focus_never_guards() {
        assert!(!NoFocus.is_guarded());
    }

    #[test]
    fn test_any_flag_guards() {
        let flags = FocusFlags::new();
        assert!(!flags.is_guarded());
        flags.set_animating(true);
        assert!(flags.is_guarded());
        flags.set_animating(false);
        flags.set_focused(true);
        assert!(flags.is_guarded());
        flags.set_focused(false);
        flags.set_recently_ended(true);
        assert!(flags.is_guarded());
    }
}
