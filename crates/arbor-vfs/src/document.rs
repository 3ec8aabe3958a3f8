use std::sync::Arc;

/// An in-memory document with a monotonically increasing version.
///
/// Arbor only needs whole-content replacement; incremental edits belong to
/// the editor layer.
#[derive(Debug, Clone)]
pub struct Document {
    text: Arc<String>,
    version: i32,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Arc::new(text.into()),
            version: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn text_arc(&self) -> Arc<String> {
        Arc::clone(&self.text)
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Replaces the content. Returns `true` iff the text actually changed.
    pub fn set_text(&mut self, text: &str) -> bool {
        if self.text.as_str() == text {
            return false;
        }
        self.text = Arc::new(text.to_owned());
        self.version += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_text_reports_modification() {
        let mut doc = Document::new("a");
        assert!(!doc.set_text("a"));
        assert_eq!(doc.version(), 0);
        assert!(doc.set_text("b"));
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.text(), "b");
    }
}
