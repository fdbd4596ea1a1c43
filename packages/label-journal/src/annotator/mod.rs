//! Classification annotator.
//!
//! Composes a `LabelStore` of class ids, the ordered examples to label and a
//! `Cursor` over them. Pages hold one example (single mode) or several
//! (paged mode); every labeling action goes straight to the journal.
//!
//! The annotator has no UI of its own. A front-end drives it with
//! `UiEvent`s, either by calling `handle_event()` directly or through a
//! `Tunnel` with `serve()`, and renders the returned `Progress`.

pub mod keymap;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::label::ClassIdCodec;
use crate::navigation::{Cursor, Example};
use crate::store::{LabelStore, StoreConfig};
use crate::tunnel::Tunnel;

pub use keymap::{KeyEvent, Keymap, Shortcut, NEXT_KEY, PREV_KEY, SHORTCUT_KEYS};

/// Annotator construction options.
#[derive(Debug, Clone)]
pub struct AnnotatorOptions {
    /// Examples per page; 1 is the single-example annotator.
    pub page_size: usize,
    /// Display names, one per class id. Defaults to the ids.
    pub class_names: Option<Vec<String>>,
    /// Override the generated "no selection" id of the default-choice menu.
    pub no_selection_id: Option<String>,
    pub store: StoreConfig,
}

impl Default for AnnotatorOptions {
    fn default() -> Self {
        Self {
            page_size: 1,
            class_names: None,
            no_selection_id: None,
            store: StoreConfig::default(),
        }
    }
}

/// Status line shown above the examples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    /// 0-based page number.
    pub page: usize,
    pub total_pages: usize,
    /// Examples still in the queue that carry a label.
    pub labelled: usize,
    /// Examples still in the queue.
    pub total: usize,
    /// `labelled / total` in percent, rounded to two decimals.
    pub percent: f64,
}

/// Front-end events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    Key(KeyEvent),
    Next,
    Prev,
    Clear,
    Toggle { slot: usize, class_index: usize },
    /// Pick the default choice by class id; `None` or the no-selection id
    /// disables it.
    DefaultChoice { class_id: Option<String> },
}

/// Derive the reserved "no selection" id for a class list.
pub fn no_selection_id(class_ids: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"labext:no-selection");
    for id in class_ids {
        hasher.update(b"\0");
        hasher.update(id.as_bytes());
    }
    hasher.finalize().to_hex()[..32].to_string()
}

pub struct Annotator<E: Example> {
    store: LabelStore<ClassIdCodec>,
    examples: Vec<E>,
    /// Queue length before any `clear()`.
    initial_len: usize,
    cursor: Cursor,
    keymap: Keymap,
    class_names: Vec<String>,
    no_selection_id: String,
    default_choice: Option<String>,
    /// Per slot: id of the example the default choice labeled, so changing
    /// the default again can relabel it.
    auto_labeled: Vec<Option<String>>,
}

impl<E: Example> Annotator<E> {
    pub fn open<I, S>(
        journal: impl AsRef<Path>,
        examples: Vec<E>,
        class_ids: I,
        options: AnnotatorOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codec = ClassIdCodec::new(class_ids)?;

        let no_selection_id = options
            .no_selection_id
            .unwrap_or_else(|| no_selection_id(codec.class_ids()));
        if codec.contains(&no_selection_id) {
            return Err(JournalError::DuplicateReservedId(no_selection_id));
        }

        let class_names = match options.class_names {
            Some(names) if names.len() == codec.len() => names,
            Some(names) => {
                return Err(JournalError::InvalidConfig(format!(
                    "{} class names given for {} classes",
                    names.len(),
                    codec.len()
                )))
            }
            None => codec.class_ids().to_vec(),
        };

        let store = LabelStore::open_with_config(journal, codec, options.store)?;
        let cursor = Cursor::new(examples.len(), options.page_size);

        Ok(Self {
            store,
            initial_len: examples.len(),
            examples,
            keymap: Keymap::for_page_size(cursor.page_size()),
            auto_labeled: vec![None; cursor.page_size()],
            cursor,
            class_names,
            no_selection_id,
            default_choice: None,
        })
    }

    // -- Accessors ------------------------------------------------------------

    pub fn store(&self) -> &LabelStore<ClassIdCodec> {
        &self.store
    }

    pub fn into_store(self) -> LabelStore<ClassIdCodec> {
        self.store
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn class_ids(&self) -> &[String] {
        self.store.codec().class_ids()
    }

    pub fn no_selection_id(&self) -> &str {
        &self.no_selection_id
    }

    pub fn default_choice(&self) -> Option<&str> {
        self.default_choice.as_deref()
    }

    /// Examples on the current page.
    pub fn page(&self) -> &[E] {
        &self.examples[self.cursor.window()]
    }

    /// Label of the example in `slot` of the current page.
    pub fn label_at(&self, slot: usize) -> Option<&str> {
        let example = self.page().get(slot)?;
        self.store.get(example.id()).ok().map(String::as_str)
    }

    /// Button captions per slot, e.g. `"cat (ctrl-2)"`.
    pub fn button_captions(&self) -> Vec<Vec<String>> {
        (0..self.cursor.page_size())
            .map(|slot| {
                self.class_names
                    .iter()
                    .enumerate()
                    .map(|(ci, name)| match self.keymap.key_hint(slot, ci) {
                        Some(hint) => format!("{} ({})", name, hint),
                        None => name.clone(),
                    })
                    .collect()
            })
            .collect()
    }

    pub fn progress(&self) -> Progress {
        let total = self.examples.len();
        let labelled = self
            .examples
            .iter()
            .filter(|e| self.store.has(e.id()))
            .count();
        let percent = (labelled as f64 * 10_000.0 / total.max(1) as f64).round() / 100.0;
        Progress {
            page: self.cursor.page(),
            total_pages: self.cursor.total_pages(),
            labelled,
            total,
            percent,
        }
    }

    /// Examples removed from the queue by `clear()`.
    pub fn discarded(&self) -> usize {
        self.initial_len - self.examples.len()
    }

    // -- Navigation -----------------------------------------------------------

    /// Next page. Applies the default choice to the new page.
    pub fn next(&mut self) -> Result<bool> {
        if !self.cursor.next() {
            return Ok(false);
        }
        self.apply_default_to_page()?;
        Ok(true)
    }

    pub fn prev(&mut self) -> Result<bool> {
        if !self.cursor.prev() {
            return Ok(false);
        }
        self.apply_default_to_page()?;
        Ok(true)
    }

    /// Drop already-labeled examples from the queue and go back to page 0.
    pub fn clear(&mut self) {
        let store = &self.store;
        self.examples.retain(|e| !store.has(e.id()));
        self.cursor.reset(self.examples.len());
        self.auto_labeled.iter_mut().for_each(|slot| *slot = None);
    }

    // -- Labeling -------------------------------------------------------------

    /// Toggle `class_index` on the example in `slot`: set it, or remove it if
    /// the example already carries that label. Out-of-range slots and
    /// classes are ignored.
    pub fn toggle(&mut self, slot: usize, class_index: usize) -> Result<bool> {
        let Some(class_id) = self.class_ids().get(class_index).cloned() else {
            return Ok(false);
        };
        let index = self.cursor.index() + slot;
        if slot >= self.cursor.page_size() || index >= self.examples.len() {
            return Ok(false);
        }
        self.update_examples(vec![(index, Some(class_id))], true)?;
        Ok(true)
    }

    /// Set the default choice and label every example of the current page
    /// that is unlabeled or was labeled by an earlier default.
    pub fn set_default_choice(&mut self, class_id: Option<&str>) -> Result<()> {
        let choice = match class_id {
            None => None,
            Some(id) if id == self.no_selection_id => None,
            Some(id) if self.store.codec().contains(id) => Some(id.to_string()),
            Some(id) => return Err(JournalError::UnknownClass(id.to_string())),
        };
        self.default_choice = choice.clone();

        let mut targets = Vec::new();
        for (slot, index) in self.cursor.window().enumerate() {
            let id = self.examples[index].id().to_string();
            if self.auto_labeled[slot].as_deref() == Some(id.as_str()) || !self.store.has(&id) {
                targets.push((index, choice.clone()));
                self.auto_labeled[slot] = Some(id);
            }
        }
        self.update_examples(targets, false)
    }

    fn apply_default_to_page(&mut self) -> Result<()> {
        let Some(choice) = self.default_choice.clone() else {
            return Ok(());
        };

        let window = self.cursor.window();
        let filled = window.len();
        let mut targets = Vec::new();
        for (slot, index) in window.enumerate() {
            let id = self.examples[index].id();
            if self.store.has(id) {
                self.auto_labeled[slot] = None;
            } else {
                self.auto_labeled[slot] = Some(id.to_string());
                targets.push((index, Some(choice.clone())));
            }
        }
        for slot in self.auto_labeled.iter_mut().skip(filled) {
            *slot = None;
        }
        self.update_examples(targets, false)
    }

    /// Turn (example index, target label) pairs into store changes.
    ///
    /// With `toggle`, targeting the label an example already has removes it;
    /// without, such targets are skipped.
    fn update_examples(&mut self, targets: Vec<(usize, Option<String>)>, toggle: bool) -> Result<()> {
        let mut changes = Vec::with_capacity(targets.len());
        for (index, target) in targets {
            let id = self.examples[index].id();
            let current = self.store.get(id).ok();
            if current == target.as_ref() {
                if toggle && target.is_some() {
                    changes.push((id.to_string(), None));
                }
            } else {
                changes.push((id.to_string(), target));
            }
        }
        self.store.apply_changes(changes)
    }

    // -- Events ---------------------------------------------------------------

    /// Handle a key press. Returns true if the page changed or a label was
    /// touched.
    pub fn receive_key(&mut self, event: &KeyEvent) -> Result<bool> {
        match event.key.as_str() {
            NEXT_KEY => self.next(),
            PREV_KEY => self.prev(),
            _ => match self.keymap.lookup(event) {
                Some(shortcut) => self.toggle(shortcut.slot, shortcut.class_index),
                None => Ok(false),
            },
        }
    }

    pub fn handle_event(&mut self, event: UiEvent) -> Result<Progress> {
        match event {
            UiEvent::Key(key) => {
                self.receive_key(&key)?;
            }
            UiEvent::Next => {
                self.next()?;
            }
            UiEvent::Prev => {
                self.prev()?;
            }
            UiEvent::Clear => self.clear(),
            UiEvent::Toggle { slot, class_index } => {
                self.toggle(slot, class_index)?;
            }
            UiEvent::DefaultChoice { class_id } => {
                self.set_default_choice(class_id.as_deref())?;
            }
        }
        Ok(self.progress())
    }

    /// Drain pending events from `tunnel`, answering each with the resulting
    /// progress under the event's version. Returns the number handled.
    pub fn serve<T: Tunnel>(&mut self, tunnel: &mut T) -> Result<usize> {
        let mut handled = 0;
        while let Some(envelope) = tunnel.try_recv()? {
            let event: UiEvent = serde_json::from_value(envelope.message)?;
            let progress = self.handle_event(event)?;
            tunnel.send_with_version(envelope.version, serde_json::to_value(&progress)?)?;
            handled += 1;
        }
        Ok(handled)
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::TextExample;
    use tempfile::TempDir;

    fn examples(n: usize) -> Vec<TextExample> {
        (0..n)
            .map(|i| TextExample::new(format!("ex{}", i), format!("example number {}", i)))
            .collect()
    }

    fn open(dir: &TempDir, n: usize, page_size: usize) -> Annotator<TextExample> {
        Annotator::open(
            dir.path().join("labels.tsv"),
            examples(n),
            ["cat", "dog", "bird"],
            AnnotatorOptions {
                page_size,
                ..AnnotatorOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_class_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let err = Annotator::open(
            dir.path().join("labels.tsv"),
            examples(1),
            ["cat", " dog"],
            AnnotatorOptions::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), "INVALID_CLASS_ID");
    }

    #[test]
    fn test_reserved_id_collision_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = Annotator::open(
            dir.path().join("labels.tsv"),
            examples(1),
            ["cat", "dog"],
            AnnotatorOptions {
                no_selection_id: Some("dog".to_string()),
                ..AnnotatorOptions::default()
            },
        )
        .err()
        .unwrap();
        assert!(matches!(err, JournalError::DuplicateReservedId(ref id) if id == "dog"));
    }

    #[test]
    fn test_generated_no_selection_id_is_stable() {
        let ids = vec!["cat".to_string(), "dog".to_string()];
        assert_eq!(no_selection_id(&ids), no_selection_id(&ids));
        assert_eq!(no_selection_id(&ids).len(), 32);
        assert!(!ids.contains(&no_selection_id(&ids)));
    }

    #[test]
    fn test_toggle_sets_then_clears() {
        let dir = TempDir::new().unwrap();
        let mut annotator = open(&dir, 3, 1);

        assert!(annotator.toggle(0, 1).unwrap());
        assert_eq!(annotator.label_at(0), Some("dog"));

        annotator.toggle(0, 0).unwrap();
        assert_eq!(annotator.label_at(0), Some("cat"));

        annotator.toggle(0, 0).unwrap();
        assert_eq!(annotator.label_at(0), None);

        assert!(!annotator.toggle(0, 7).unwrap());
        assert!(!annotator.toggle(1, 0).unwrap());
    }

    #[test]
    fn test_keyboard_flow_single() {
        let dir = TempDir::new().unwrap();
        let mut annotator = open(&dir, 3, 1);

        annotator.receive_key(&KeyEvent::plain("2")).unwrap();
        assert!(annotator.receive_key(&KeyEvent::plain("n")).unwrap());
        annotator.receive_key(&KeyEvent::plain("3")).unwrap();
        assert!(annotator.receive_key(&KeyEvent::plain("n")).unwrap());
        assert!(!annotator.receive_key(&KeyEvent::plain("n")).unwrap());
        assert!(!annotator.receive_key(&KeyEvent::plain("x")).unwrap());

        let store = annotator.store();
        assert_eq!(store.get("ex0").unwrap(), "dog");
        assert_eq!(store.get("ex1").unwrap(), "bird");
        assert!(!store.has("ex2"));
        assert_eq!(annotator.progress().labelled, 2);
    }

    #[test]
    fn test_keyboard_flow_paged() {
        let dir = TempDir::new().unwrap();
        let mut annotator = open(&dir, 7, 3);

        annotator.receive_key(&KeyEvent::plain("1")).unwrap();
        annotator.receive_key(&KeyEvent::plain("3").with_meta()).unwrap();
        annotator.receive_key(&KeyEvent::plain("n")).unwrap();
        annotator.receive_key(&KeyEvent::plain("2").with_ctrl()).unwrap();

        let store = annotator.store();
        assert_eq!(store.get("ex0").unwrap(), "cat");
        assert_eq!(store.get("ex2").unwrap(), "bird");
        assert_eq!(store.get("ex4").unwrap(), "dog");
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn test_default_choice_labels_page_and_follows_navigation() {
        let dir = TempDir::new().unwrap();
        let mut annotator = open(&dir, 5, 2);

        annotator.toggle(1, 1).unwrap();
        annotator.set_default_choice(Some("cat")).unwrap();
        assert_eq!(annotator.label_at(0), Some("cat"));
        assert_eq!(annotator.label_at(1), Some("dog"));

        // Changing the default relabels only what the default labeled.
        annotator.set_default_choice(Some("bird")).unwrap();
        assert_eq!(annotator.label_at(0), Some("bird"));
        assert_eq!(annotator.label_at(1), Some("dog"));

        annotator.next().unwrap();
        assert_eq!(annotator.label_at(0), Some("bird"));
        assert_eq!(annotator.label_at(1), Some("bird"));

        // Disabling removes the auto labels on the current page.
        let sentinel = annotator.no_selection_id().to_string();
        annotator.set_default_choice(Some(&sentinel)).unwrap();
        assert_eq!(annotator.default_choice(), None);
        assert_eq!(annotator.label_at(0), None);
        assert_eq!(annotator.label_at(1), None);

        assert!(matches!(
            annotator.set_default_choice(Some("fish")),
            Err(JournalError::UnknownClass(_))
        ));
    }

    #[test]
    fn test_clear_drops_labeled_examples() {
        let dir = TempDir::new().unwrap();
        let mut annotator = open(&dir, 4, 1);
        annotator.toggle(0, 0).unwrap();
        annotator.next().unwrap();
        annotator.next().unwrap();
        annotator.toggle(0, 2).unwrap();

        annotator.clear();
        assert_eq!(annotator.cursor().index(), 0);
        assert_eq!(annotator.discarded(), 2);
        let progress = annotator.progress();
        assert_eq!(progress.total, 2);
        assert_eq!(progress.labelled, 0);
        assert_eq!(annotator.page()[0].id(), "ex1");
    }

    #[test]
    fn test_progress_rounding() {
        let dir = TempDir::new().unwrap();
        let mut annotator = open(&dir, 3, 1);
        annotator.toggle(0, 0).unwrap();
        let progress = annotator.progress();
        assert_eq!(progress.percent, 33.33);
        assert_eq!(progress.total_pages, 3);
    }

    #[test]
    fn test_labels_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut annotator = open(&dir, 3, 1);
            annotator.toggle(0, 2).unwrap();
        }
        let annotator = open(&dir, 3, 1);
        assert_eq!(annotator.label_at(0), Some("bird"));
    }

    #[test]
    fn test_button_captions() {
        let dir = TempDir::new().unwrap();
        let annotator = Annotator::open(
            dir.path().join("labels.tsv"),
            examples(4),
            ["pos", "neg"],
            AnnotatorOptions {
                page_size: 2,
                class_names: Some(vec!["Positive".to_string(), "Negative".to_string()]),
                ..AnnotatorOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            annotator.button_captions(),
            vec![
                vec!["Positive (1)".to_string(), "Negative (ctrl-1)".to_string()],
                vec!["Positive (2)".to_string(), "Negative (ctrl-2)".to_string()],
            ]
        );
    }

    #[test]
    fn test_ui_event_json() {
        let event: UiEvent =
            serde_json::from_str(r#"{"type": "key", "key": "1", "ctrlKey": true}"#).unwrap();
        assert_eq!(event, UiEvent::Key(KeyEvent::plain("1").with_ctrl()));

        let event: UiEvent =
            serde_json::from_str(r#"{"type": "default_choice", "class_id": null}"#).unwrap();
        assert_eq!(event, UiEvent::DefaultChoice { class_id: None });
    }
}
