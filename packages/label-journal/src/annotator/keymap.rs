//! Keyboard shortcuts for the annotator.
//!
//! `n` and `b` are reserved for navigation, so neither appears in
//! `SHORTCUT_KEYS`.

use serde::{Deserialize, Serialize};

/// Shortcut characters, in slot/class order.
pub const SHORTCUT_KEYS: &str = "1234567890qwertyuiopasdfghjklzxcvm";
pub const NEXT_KEY: &str = "n";
pub const PREV_KEY: &str = "b";

/// Modifiers that select the class in paged mode, in class order.
const MODIFIERS: [(bool, bool, &str); 3] = [(false, false, ""), (true, false, "ctrl-"), (false, true, "meta-")];

/// A key press as delivered by the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    #[serde(default, rename = "altKey")]
    pub alt: bool,
    #[serde(default, rename = "ctrlKey")]
    pub ctrl: bool,
    #[serde(default, rename = "shiftKey")]
    pub shift: bool,
    #[serde(default, rename = "metaKey")]
    pub meta: bool,
}

impl KeyEvent {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }
}

/// Example slot on the page plus class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortcut {
    pub slot: usize,
    pub class_index: usize,
}

/// How keys map onto (slot, class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keymap {
    /// One example per page: the key picks the class, modifiers are ignored.
    Single,
    /// Several examples per page: the key picks the slot, the modifier
    /// (none / ctrl / meta) picks one of the first three classes.
    Paged,
}

fn key_position(key: &str) -> Option<usize> {
    let mut chars = key.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    SHORTCUT_KEYS.chars().position(|k| k == c)
}

impl Keymap {
    pub fn for_page_size(page_size: usize) -> Self {
        if page_size <= 1 {
            Keymap::Single
        } else {
            Keymap::Paged
        }
    }

    pub fn lookup(&self, event: &KeyEvent) -> Option<Shortcut> {
        let position = key_position(&event.key)?;
        match self {
            Keymap::Single => Some(Shortcut {
                slot: 0,
                class_index: position,
            }),
            Keymap::Paged => {
                let class_index = MODIFIERS
                    .iter()
                    .position(|&(ctrl, meta, _)| ctrl == event.ctrl && meta == event.meta)?;
                Some(Shortcut {
                    slot: position,
                    class_index,
                })
            }
        }
    }

    /// Human-readable key for a (slot, class) pair, e.g. `"3"` or `"ctrl-3"`.
    pub fn key_hint(&self, slot: usize, class_index: usize) -> Option<String> {
        match self {
            Keymap::Single => SHORTCUT_KEYS.chars().nth(class_index).map(String::from),
            Keymap::Paged => {
                let key = SHORTCUT_KEYS.chars().nth(slot)?;
                let (_, _, prefix) = MODIFIERS.get(class_index)?;
                Some(format!("{}{}", prefix, key))
            }
        }
    }
}

// -- Tests --------------------------------------------------------------------
