//! Input processing layer: key mapping and numeric prefix accumulator.
//!
//! Pure logic, no I/O. All functions are deterministic and testable.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const MAX_COUNT: u32 = 99_999;

/// Accumulated numeric prefix for vim/less-style commands.
///
/// Users type digits then a command character: `12g` jumps to page 12,
/// `3n` moves forward three pages, `5j` scrolls five steps down.
pub(super) struct InputAccumulator {
    count: Option<u32>,
}

impl InputAccumulator {
    pub(super) fn new() -> Self {
        Self { count: None }
    }

    /// Feed a digit (0..=9). Digits past `MAX_COUNT` are ignored.
    fn push_digit(&mut self, d: u32) {
        let new = self.count.unwrap_or(0).saturating_mul(10).saturating_add(d);
        if new <= MAX_COUNT {
            self.count = Some(new);
        }
    }

    /// Take the accumulated count, resetting to None.
    fn take(&mut self) -> Option<u32> {
        self.count.take()
    }

    /// Peek at the current accumulated count without consuming it.
    pub(super) fn peek(&self) -> Option<u32> {
        self.count
    }

    pub(super) fn reset(&mut self) {
        self.count = None;
    }

    pub(super) fn is_active(&self) -> bool {
        self.count.is_some()
    }
}

/// Actions produced by key input processing.
#[derive(Debug, PartialEq)]
pub(super) enum Action {
    Quit,
    NextPage(u32),
    PrevPage(u32),
    FirstPage,
    LastPage,
    GoToPage(u32),
    ZoomIn,
    ZoomOut,
    ResetZoom,
    ScrollDown(u32),
    ScrollUp(u32),
    ScrollLeft(u32),
    ScrollRight(u32),
    Retry,
    Download,
    OpenExternal,
    CancelInput,
    /// A digit was accumulated; caller should redraw status bar.
    Digit,
}

/// Map a key event to an `Action`, consuming/updating the accumulator as needed.
///
/// Returns `None` for unknown keys (caller should reset accumulator).
pub(super) fn map_key_event(key: KeyEvent, acc: &mut InputAccumulator) -> Option<Action> {
    let KeyEvent { code, modifiers, .. } = key;

    match (code, modifiers) {
        (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Action::Quit),

        // Esc clears a pending count first, closes otherwise
        (KeyCode::Esc, _) => {
            if acc.is_active() {
                acc.reset();
                Some(Action::CancelInput)
            } else {
                Some(Action::Quit)
            }
        }

        (KeyCode::Char(c @ '0'..='9'), KeyModifiers::NONE) => {
            acc.push_digit(c as u32 - '0' as u32);
            Some(Action::Digit)
        }

        (KeyCode::Char('n'), _)
        | (KeyCode::Char(' '), _)
        | (KeyCode::Right, _)
        | (KeyCode::PageDown, _) => Some(Action::NextPage(acc.take().unwrap_or(1))),
        (KeyCode::Char('p'), _) | (KeyCode::Left, _) | (KeyCode::PageUp, _) => {
            Some(Action::PrevPage(acc.take().unwrap_or(1)))
        }

        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => match acc.take() {
            None => Some(Action::FirstPage),
            Some(n) => Some(Action::GoToPage(n)),
        },
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => match acc.take() {
            None => Some(Action::LastPage),
            Some(n) => Some(Action::GoToPage(n)),
        },

        (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => {
            acc.reset();
            Some(Action::ZoomIn)
        }
        (KeyCode::Char('-'), _) => {
            acc.reset();
            Some(Action::ZoomOut)
        }
        (KeyCode::Char('z'), _) => {
            acc.reset();
            Some(Action::ResetZoom)
        }

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => {
            Some(Action::ScrollDown(acc.take().unwrap_or(1)))
        }
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(Action::ScrollUp(acc.take().unwrap_or(1))),
        (KeyCode::Char('h'), _) => Some(Action::ScrollLeft(acc.take().unwrap_or(1))),
        (KeyCode::Char('l'), _) => Some(Action::ScrollRight(acc.take().unwrap_or(1))),

        (KeyCode::Char('r'), _) => {
            acc.reset();
            Some(Action::Retry)
        }
        (KeyCode::Char('s'), _) => {
            acc.reset();
            Some(Action::Download)
        }
        (KeyCode::Char('o'), _) => {
            acc.reset();
            Some(Action::OpenExternal)
        }

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn simple_key(code: KeyCode) -> KeyEvent {
        key(code, KeyModifiers::NONE)
    }

    fn type_keys(keys: &str, acc: &mut InputAccumulator) -> Option<Action> {
        let mut last = None;
        for c in keys.chars() {
            last = map_key_event(simple_key(KeyCode::Char(c)), acc);
        }
        last
    }

    #[test]
    fn test_n_next_page() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("n", &mut acc), Some(Action::NextPage(1)));
        assert_eq!(
            map_key_event(simple_key(KeyCode::Right), &mut acc),
            Some(Action::NextPage(1))
        );
    }

    #[test]
    fn test_3p_prev_pages() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("3p", &mut acc), Some(Action::PrevPage(3)));
        assert!(!acc.is_active());
    }

    #[test]
    fn test_g_without_prefix_goes_first() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("g", &mut acc), Some(Action::FirstPage));
    }

    #[test]
    fn test_12g_goes_to_page() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("12g", &mut acc), Some(Action::GoToPage(12)));
    }

    #[test]
    fn test_big_g_last() {
        let mut acc = InputAccumulator::new();
        let a = map_key_event(key(KeyCode::Char('G'), KeyModifiers::SHIFT), &mut acc);
        assert_eq!(a, Some(Action::LastPage));
    }

    #[test]
    fn test_zoom_keys() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("+", &mut acc), Some(Action::ZoomIn));
        assert_eq!(type_keys("=", &mut acc), Some(Action::ZoomIn));
        assert_eq!(type_keys("-", &mut acc), Some(Action::ZoomOut));
        assert_eq!(type_keys("z", &mut acc), Some(Action::ResetZoom));
    }

    #[test]
    fn test_zoom_discards_count() {
        let mut acc = InputAccumulator::new();
        type_keys("4+", &mut acc);
        assert!(!acc.is_active());
    }

    #[test]
    fn test_5j_scroll_down() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("5", &mut acc), Some(Action::Digit));
        assert_eq!(type_keys("j", &mut acc), Some(Action::ScrollDown(5)));
    }

    #[test]
    fn test_q_quits() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("q", &mut acc), Some(Action::Quit));
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut acc = InputAccumulator::new();
        let a = map_key_event(key(KeyCode::Char('c'), KeyModifiers::CONTROL), &mut acc);
        assert_eq!(a, Some(Action::Quit));
    }

    #[test]
    fn test_esc_cancels_count_then_quits() {
        let mut acc = InputAccumulator::new();
        type_keys("5", &mut acc);
        let a = map_key_event(simple_key(KeyCode::Esc), &mut acc);
        assert_eq!(a, Some(Action::CancelInput));
        assert!(!acc.is_active());
        let a = map_key_event(simple_key(KeyCode::Esc), &mut acc);
        assert_eq!(a, Some(Action::Quit));
    }

    #[test]
    fn test_shell_actions() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("r", &mut acc), Some(Action::Retry));
        assert_eq!(type_keys("s", &mut acc), Some(Action::Download));
        assert_eq!(type_keys("o", &mut acc), Some(Action::OpenExternal));
    }

    #[test]
    fn test_count_is_capped() {
        let mut acc = InputAccumulator::new();
        type_keys("1234567", &mut acc);
        assert_eq!(acc.peek(), Some(12345));
    }

    #[test]
    fn test_unknown_key_returns_none() {
        let mut acc = InputAccumulator::new();
        assert_eq!(type_keys("x", &mut acc), None);
    }
}
