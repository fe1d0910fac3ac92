use std::collections::{HashSet, VecDeque};

use serde_json::Value;

pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// Bounded set of correlation ids already shown, evicting the oldest insert
/// first once full
#[derive(Debug, Clone)]
pub struct DedupWindow {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Whether a stdout line with this text should be shown. Lines carrying
    /// an id are shown the first time only; all other lines always are.
    pub fn admit(&mut self, text: &str) -> bool {
        match correlation_id(text) {
            Some(id) => self.insert(id),
            None => true,
        }
    }

    /// Remember `id`; false if it was already in the window
    pub fn insert(&mut self, id: String) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        if self.capacity == 0 {
            return true;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

/// The string `id` of a line that is a JSON object. Only attempts a parse
/// when the text starts with `{` and mentions `"id"`.
pub fn correlation_id(text: &str) -> Option<String> {
    if !text.starts_with('{') || !text.contains("\"id\"") {
        return None;
    }
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("id")?.as_str().map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_string_id() {
        assert_eq!(
            correlation_id(r#"{"id":"abc","type":"text"}"#),
            Some("abc".to_string())
        );
        assert_eq!(
            correlation_id("{\"id\": \"newline\"}\n"),
            Some("newline".to_string())
        );
    }

    #[test]
    fn leading_whitespace_skips_the_parse() {
        assert_eq!(correlation_id("  {\"id\": \"padded\"}"), None);
        assert_eq!(correlation_id("\t{\"id\": \"tabbed\"}\n"), None);
    }

    #[test]
    fn ignores_lines_without_string_id() {
        assert_eq!(correlation_id("plain output"), None);
        assert_eq!(correlation_id(r#"{"id": 42}"#), None);
        assert_eq!(correlation_id(r#"{"name":"abc"}"#), None);
        assert_eq!(correlation_id(r#"{"id":"abc""#), None);
        assert_eq!(correlation_id(r#"["id"]"#), None);
    }

    #[test]
    fn repeated_id_is_rejected() {
        let mut window = DedupWindow::default();
        assert!(window.admit(r#"{"id":"abc","n":1}"#));
        assert!(!window.admit(r#"{"id":"abc","n":2}"#));
        assert!(window.admit(r#"{"id":"xyz"}"#));
        assert!(window.admit("not json"));
        assert!(window.admit("not json"));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut window = DedupWindow::new(1000);
        for n in 0..1000 {
            assert!(window.insert(format!("id-{n}")));
        }
        assert_eq!(window.len(), 1000);
        assert!(window.contains("id-0"));

        assert!(window.insert("id-1000".to_string()));
        assert_eq!(window.len(), 1000);
        assert!(!window.contains("id-0"));
        assert!(window.contains("id-1"));
        assert!(window.contains("id-1000"));

        // evicted ids are admitted again
        assert!(window.insert("id-0".to_string()));
        assert!(!window.contains("id-1"));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut window = DedupWindow::new(4);
        window.insert("a".to_string());
        window.clear();
        assert!(window.is_empty());
        assert!(window.insert("a".to_string()));
    }
}
