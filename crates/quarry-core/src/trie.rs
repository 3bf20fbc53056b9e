//! Prefix-completion tree over the indexed vocabulary.
//!
//! Children are kept in a `BTreeMap` keyed by byte, so a depth-first walk
//! visits completions in lexicographic byte order and [`Trie::complete`] is
//! deterministic: a word always precedes its own extensions, and `"ab"`
//! precedes `"b"`.

use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Node {
    is_word: bool,
    children: BTreeMap<u8, Node>,
}

/// A byte-keyed trie.
#[derive(Debug, Default)]
pub struct Trie {
    root: Node,
    len: usize,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a word. Returns false if it was already present.
    pub fn insert(&mut self, word: &str) -> bool {
        let mut node = &mut self.root;
        for &b in word.as_bytes() {
            node = node.children.entry(b).or_default();
        }
        if node.is_word {
            return false;
        }
        node.is_word = true;
        self.len += 1;
        true
    }

    /// Remove a word, pruning branches that no longer lead to any word.
    /// Returns false if the word was not present.
    pub fn remove(&mut self, word: &str) -> bool {
        fn remove_from(node: &mut Node, rest: &[u8]) -> bool {
            match rest.split_first() {
                None => {
                    if !node.is_word {
                        return false;
                    }
                    node.is_word = false;
                    true
                }
                Some((b, tail)) => {
                    let Some(child) = node.children.get_mut(b) else {
                        return false;
                    };
                    let removed = remove_from(child, tail);
                    if removed && !child.is_word && child.children.is_empty() {
                        node.children.remove(b);
                    }
                    removed
                }
            }
        }

        let removed = remove_from(&mut self.root, word.as_bytes());
        if removed {
            self.len -= 1;
        }
        removed
    }

    pub fn contains(&self, word: &str) -> bool {
        self.find(word.as_bytes()).is_some_and(|n| n.is_word)
    }

    /// Up to `limit` stored words starting with `prefix`, in lexicographic
    /// order.
    ///
    /// When nothing is stored under `prefix` the prefix itself is returned as
    /// the only candidate, so a lookup of an unknown word still runs (and
    /// finds nothing) instead of silently disappearing.
    pub fn complete(&self, prefix: &str, limit: usize) -> Vec<String> {
        let Some(start) = self.find(prefix.as_bytes()) else {
            return vec![prefix.to_string()];
        };

        let mut out = Vec::new();
        let mut buf = prefix.as_bytes().to_vec();
        collect(start, &mut buf, limit, &mut out);
        if out.is_empty() {
            out.push(prefix.to_string());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
        self.len = 0;
    }

    fn find(&self, bytes: &[u8]) -> Option<&Node> {
        let mut node = &self.root;
        for b in bytes {
            node = node.children.get(b)?;
        }
        Some(node)
    }
}

fn collect(node: &Node, buf: &mut Vec<u8>, limit: usize, out: &mut Vec<String>) {
    if out.len() >= limit {
        return;
    }
    if node.is_word {
        // words are inserted from &str, so any path ending on a word is UTF-8
        if let Ok(word) = std::str::from_utf8(buf) {
            out.push(word.to_string());
        }
    }
    for (&b, child) in &node.children {
        if out.len() >= limit {
            return;
        }
        buf.push(b);
        collect(child, buf, limit, out);
        buf.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trie(words: &[&str]) -> Trie {
        let mut trie = Trie::new();
        for w in words {
            trie.insert(w);
        }
        trie
    }

    #[test]
    fn test_insert_and_contains() {
        let mut trie = make_trie(&["you", "young", "yours"]);
        assert_eq!(trie.len(), 3);
        assert!(trie.contains("you"));
        assert!(!trie.contains("yo"));
        assert!(!trie.insert("you"));
        assert_eq!(trie.len(), 3);
    }

    #[test]
    fn test_complete_lexicographic() {
        let trie = make_trie(&["yours", "young", "you", "yonder", "zebra"]);
        assert_eq!(trie.complete("yo", 3), vec!["yonder", "you", "young"]);
        assert_eq!(trie.complete("you", 10), vec!["you", "young", "yours"]);
        assert_eq!(trie.complete("y", 1), vec!["yonder"]);
    }

    #[test]
    fn test_complete_unknown_prefix() {
        let trie = make_trie(&["hello"]);
        assert_eq!(trie.complete("help", 3), vec!["help"]);
        assert_eq!(trie.complete("", 3), vec!["hello"]);
    }

    #[test]
    fn test_remove_prunes() {
        let mut trie = make_trie(&["car", "cart"]);
        assert!(trie.remove("cart"));
        assert!(!trie.remove("cart"));
        assert!(trie.contains("car"));
        assert_eq!(trie.complete("car", 5), vec!["car"]);

        assert!(trie.remove("car"));
        assert!(trie.is_empty());
        assert_eq!(trie.complete("ca", 5), vec!["ca"]);
    }

    #[test]
    fn test_non_ascii_words() {
        let trie = make_trie(&["café", "cafe"]);
        assert_eq!(trie.complete("caf", 5), vec!["cafe", "café"]);
    }
}
