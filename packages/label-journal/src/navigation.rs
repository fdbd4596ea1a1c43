//! Examples and the page cursor that walks over them.

use std::ops::Range;

/// Something that can be annotated.
pub trait Example {
    /// Stable, unique id. This is the journal key.
    fn id(&self) -> &str;

    /// Text shown to the annotator.
    fn render(&self) -> String {
        self.id().to_string()
    }
}

/// An example that is just an id and a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextExample {
    pub id: String,
    pub text: String,
}

impl TextExample {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

impl Example for TextExample {
    fn id(&self) -> &str {
        &self.id
    }

    fn render(&self) -> String {
        self.text.clone()
    }
}

/// Page-wise position over `len` examples.
///
/// `index` is always a multiple of `page_size`; a page size of 1 gives the
/// one-example-at-a-time annotator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    page_size: usize,
    len: usize,
}

impl Cursor {
    pub fn new(len: usize, page_size: usize) -> Self {
        Self {
            index: 0,
            page_size: page_size.max(1),
            len,
        }
    }

    /// Index of the first example on the current page.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_next(&self) -> bool {
        self.index + self.page_size < self.len
    }

    pub fn has_prev(&self) -> bool {
        self.index >= self.page_size
    }

    /// Move one page forward. Returns false (and stays put) at the end.
    pub fn next(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.index += self.page_size;
        true
    }

    /// Move one page back. Returns false (and stays put) at the start.
    pub fn prev(&mut self) -> bool {
        if !self.has_prev() {
            return false;
        }
        self.index -= self.page_size;
        true
    }

    /// Example indices on the current page.
    pub fn window(&self) -> Range<usize> {
        self.index.min(self.len)..(self.index + self.page_size).min(self.len)
    }

    /// 0-based page number.
    pub fn page(&self) -> usize {
        self.index / self.page_size
    }

    pub fn total_pages(&self) -> usize {
        self.len.div_ceil(self.page_size)
    }

    /// Point at a new sequence length and go back to the first page.
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.index = 0;
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_step_navigation() {
        let mut cursor = Cursor::new(3, 1);
        assert!(!cursor.has_prev());
        assert!(cursor.has_next());
        assert!(cursor.next());
        assert!(cursor.next());
        assert!(!cursor.has_next());
        assert!(!cursor.next());
        assert_eq!(cursor.index(), 2);
        assert_eq!(cursor.window(), 2..3);
        assert!(cursor.prev());
        assert_eq!(cursor.index(), 1);
    }

    #[test]
    fn test_paged_navigation() {
        let mut cursor = Cursor::new(12, 5);
        assert_eq!(cursor.total_pages(), 3);
        assert_eq!(cursor.window(), 0..5);
        assert!(cursor.next());
        assert!(cursor.next());
        assert_eq!(cursor.page(), 2);
        assert_eq!(cursor.window(), 10..12);
        assert!(!cursor.next());
        assert!(cursor.prev());
        assert_eq!(cursor.window(), 5..10);
    }

    #[test]
    fn test_empty_and_reset() {
        let cursor = Cursor::new(0, 0);
        assert_eq!(cursor.page_size(), 1);
        assert!(cursor.is_empty());
        assert_eq!(cursor.window(), 0..0);
        assert!(!cursor.has_next());
        assert!(!cursor.has_prev());

        let mut cursor = Cursor::new(10, 2);
        cursor.next();
        cursor.next();
        cursor.reset(3);
        assert_eq!(cursor.index(), 0);
        assert_eq!(cursor.total_pages(), 2);
    }

    #[test]
    fn test_text_example_render() {
        let example = TextExample::new("img_7", "a cat on a mat");
        assert_eq!(example.id(), "img_7");
        assert_eq!(example.render(), "a cat on a mat");
    }
}
