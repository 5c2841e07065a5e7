//! Keyboard and pointer handling
//!
//! Translates seat events into anchor mutations and the quit request. Nothing
//! here touches the protocol: `client.rs` converts wl_keyboard/wl_pointer
//! events and forwards them, so the router can be driven directly in tests.

use crate::config::InputConfig;
use log::debug;

/// Whether a key or button went down or up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressState {
    Pressed,
    Released,
}

/// A point in surface coordinates around which a spiral is painted
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

impl Anchor {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered anchors: committed ones followed by the one tracking the pointer.
///
/// Never empty. Only the last element is ever overwritten, and the list only
/// grows through [`AnchorList::commit`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorList {
    anchors: Vec<Anchor>,
}

impl AnchorList {
    /// A list seeded with one anchor at the origin
    pub fn new() -> Self {
        Self {
            anchors: vec![Anchor::default()],
        }
    }

    /// Overwrite the tracking anchor
    pub fn track(&mut self, anchor: Anchor) {
        if let Some(last) = self.anchors.last_mut() {
            *last = anchor;
        }
    }

    /// Freeze the tracking anchor in place and start a new one at the same spot
    pub fn commit(&mut self) {
        let current = self.current();
        self.anchors.push(current);
    }

    /// The anchor currently following the pointer
    pub fn current(&self) -> Anchor {
        self.anchors.last().copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn as_slice(&self) -> &[Anchor] {
        &self.anchors
    }
}

impl Default for AnchorList {
    fn default() -> Self {
        Self::new()
    }
}

/// Last key event seen on the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u32,
    pub state: PressState,
}

/// Routes seat input into anchor edits and the quit latch
#[derive(Debug)]
pub struct InputRouter {
    anchors: AnchorList,
    last_key: Option<KeyEvent>,
    quit_key: u32,
    commit_button: u32,
    quit: bool,
}

impl InputRouter {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            anchors: AnchorList::new(),
            last_key: None,
            quit_key: config.quit_key,
            commit_button: config.commit_button,
            quit: false,
        }
    }

    /// Record a key transition; releasing the quit key latches the quit request
    pub fn on_key(&mut self, code: u32, state: PressState) {
        self.last_key = Some(KeyEvent { code, state });
        if code == self.quit_key && state == PressState::Released {
            debug!("Quit key {} released", code);
            self.quit = true;
        }
    }

    /// Pointer moved over the surface
    pub fn on_motion(&mut self, x: f64, y: f64) {
        self.anchors.track(Anchor::new(x, y));
    }

    /// Pointer button transition; releasing the commit button commits the anchor
    pub fn on_button(&mut self, button: u32, state: PressState) {
        if button == self.commit_button && state == PressState::Released {
            self.anchors.commit();
            debug!(
                "Committed anchor at ({:.1}, {:.1}), {} anchors",
                self.anchors.current().x,
                self.anchors.current().y,
                self.anchors.len()
            );
        }
    }

    /// Whether the quit key has been released since startup
    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    pub fn last_key(&self) -> Option<KeyEvent> {
        self.last_key
    }

    pub fn anchors(&self) -> &AnchorList {
        &self.anchors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BTN_LEFT: u32 = 0x110;
    const BTN_RIGHT: u32 = 0x111;
    const KEY_ESC: u32 = 1;
    const KEY_Q: u32 = 16;

    fn router() -> InputRouter {
        InputRouter::new(&InputConfig::default())
    }

    #[test]
    fn test_seeded_with_origin_anchor() {
        let router = router();
        assert_eq!(router.anchors().as_slice(), &[Anchor::new(0.0, 0.0)]);
        assert!(!router.quit_requested());
        assert_eq!(router.last_key(), None);
    }

    #[test]
    fn test_motion_overwrites_last_anchor() {
        let mut router = router();
        router.on_motion(10.0, 20.0);
        router.on_motion(30.5, 40.25);

        assert_eq!(router.anchors().as_slice(), &[Anchor::new(30.5, 40.25)]);
    }

    #[test]
    fn test_commit_duplicates_current_anchor() {
        let mut router = router();
        router.on_motion(100.0, 100.0);
        router.on_button(BTN_RIGHT, PressState::Released);

        assert_eq!(
            router.anchors().as_slice(),
            &[Anchor::new(100.0, 100.0), Anchor::new(100.0, 100.0)]
        );

        // Further motion only drags the new anchor
        router.on_motion(5.0, 6.0);
        assert_eq!(
            router.anchors().as_slice(),
            &[Anchor::new(100.0, 100.0), Anchor::new(5.0, 6.0)]
        );
    }

    #[test]
    fn test_commit_ignores_press_and_other_buttons() {
        let mut router = router();
        router.on_button(BTN_RIGHT, PressState::Pressed);
        router.on_button(BTN_LEFT, PressState::Released);
        router.on_button(BTN_LEFT, PressState::Pressed);

        assert_eq!(router.anchors().len(), 1);
    }

    #[test]
    fn test_quit_on_release_only() {
        let mut router = router();
        router.on_key(KEY_ESC, PressState::Pressed);
        assert!(!router.quit_requested());

        router.on_key(KEY_ESC, PressState::Released);
        assert!(router.quit_requested());
        assert_eq!(
            router.last_key(),
            Some(KeyEvent {
                code: KEY_ESC,
                state: PressState::Released
            })
        );
    }

    #[test]
    fn test_quit_latch_survives_later_keys() {
        let mut router = router();
        router.on_key(KEY_ESC, PressState::Released);
        router.on_key(KEY_Q, PressState::Pressed);

        assert!(router.quit_requested());
        assert_eq!(router.last_key().map(|k| k.code), Some(KEY_Q));
    }

    #[test]
    fn test_configured_bindings() {
        let config = InputConfig {
            quit_key: KEY_Q,
            commit_button: BTN_LEFT,
        };
        let mut router = InputRouter::new(&config);

        router.on_key(KEY_ESC, PressState::Released);
        assert!(!router.quit_requested());
        router.on_key(KEY_Q, PressState::Released);
        assert!(router.quit_requested());

        router.on_button(BTN_RIGHT, PressState::Released);
        assert_eq!(router.anchors().len(), 1);
        router.on_button(BTN_LEFT, PressState::Released);
        assert_eq!(router.anchors().len(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Motion(f64, f64),
        Button(u32, bool),
        Key(u32, bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-100.0f64..2000.0, -100.0f64..2000.0).prop_map(|(x, y)| Op::Motion(x, y)),
            (prop_oneof![Just(BTN_LEFT), Just(BTN_RIGHT)], any::<bool>())
                .prop_map(|(b, p)| Op::Button(b, p)),
            (0u32..32, any::<bool>()).prop_map(|(k, p)| Op::Key(k, p)),
        ]
    }

    fn state(pressed: bool) -> PressState {
        if pressed {
            PressState::Pressed
        } else {
            PressState::Released
        }
    }

    proptest! {
        #[test]
        fn test_anchor_list_only_grows_by_commit(ops in prop::collection::vec(op(), 0..64)) {
            let mut router = router();

            for op in ops {
                let before = router.anchors().clone();
                match op {
                    Op::Motion(x, y) => {
                        router.on_motion(x, y);
                        let after = router.anchors().as_slice();
                        prop_assert_eq!(after.len(), before.len());
                        prop_assert_eq!(&after[..after.len() - 1], &before.as_slice()[..before.len() - 1]);
                        prop_assert_eq!(after[after.len() - 1], Anchor::new(x, y));
                    }
                    Op::Button(button, pressed) => {
                        router.on_button(button, state(pressed));
                        let after = router.anchors().as_slice();
                        if button == BTN_RIGHT && !pressed {
                            prop_assert_eq!(after.len(), before.len() + 1);
                            prop_assert_eq!(after[after.len() - 1], before.current());
                            prop_assert_eq!(&after[..before.len()], before.as_slice());
                        } else {
                            prop_assert_eq!(after, before.as_slice());
                        }
                    }
                    Op::Key(code, pressed) => {
                        router.on_key(code, state(pressed));
                        prop_assert_eq!(router.anchors(), &before);
                    }
                }
                prop_assert!(!router.anchors().is_empty());
            }
        }
    }
}
