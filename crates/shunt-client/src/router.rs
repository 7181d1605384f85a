//! Longest-suffix domain routing.
//!
//! Upstream selection is keyed by the *reversed* canonical query name, which
//! turns longest-suffix matching into longest-prefix matching. The tree is
//! immutable: configuration builds a fresh tree and publishes it with a
//! single atomic swap, so readers never observe a partial update.

/// A path-compressed byte trie.
///
/// Keys are reversed canonical domain strings. Matching is plain byte-prefix
/// matching; an empty configured domain canonicalizes to `"."`, which is a
/// prefix of every reversed name and therefore acts as the default route.
#[derive(Debug)]
pub struct RadixTree<T> {
    root: Node<T>,
}

#[derive(Debug)]
struct Node<T> {
    /// Edge label from the parent.
    key: Vec<u8>,
    value: Option<T>,
    children: Vec<Node<T>>,
}

impl<T> Node<T> {
    fn new(key: Vec<u8>) -> Self {
        Self {
            key,
            value: None,
            children: Vec::new(),
        }
    }

    fn insert(&mut self, key: &[u8], value: T) {
        if key.is_empty() {
            self.value = Some(value);
            return;
        }

        for i in 0..self.children.len() {
            let common = common_prefix(&self.children[i].key, key);
            if common == 0 {
                continue;
            }

            if common == self.children[i].key.len() {
                // Edge fully matched; descend with the remainder.
                self.children[i].insert(&key[common..], value);
                return;
            }

            // Partial match: split the edge at the divergence point.
            let mut old_child = self.children.remove(i);
            let mut split = Node::new(old_child.key[..common].to_vec());
            old_child.key = old_child.key[common..].to_vec();
            split.children.push(old_child);
            split.insert(&key[common..], value);
            self.children.push(split);
            return;
        }

        let mut leaf = Node::new(key.to_vec());
        leaf.value = Some(value);
        self.children.push(leaf);
    }

    fn longest_prefix<'a>(&'a self, key: &[u8], best: Option<&'a T>) -> Option<&'a T> {
        let best = self.value.as_ref().or(best);
        for child in &self.children {
            if key.len() >= child.key.len() && key[..child.key.len()] == child.key[..] {
                return child.longest_prefix(&key[child.key.len()..], best);
            }
        }
        best
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

impl<T> RadixTree<T> {
    pub fn new() -> Self {
        Self {
            root: Node::new(Vec::new()),
        }
    }

    /// Inserts `value` under `key`, replacing any previous value there.
    pub fn insert(&mut self, key: &[u8], value: T) {
        self.root.insert(key, value);
    }

    /// The value at the longest key that prefixes `key`, if any.
    pub fn longest_prefix(&self, key: &[u8]) -> Option<&T> {
        self.root.longest_prefix(key, None)
    }
}

impl<T> Default for RadixTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reverses a canonical domain string for use as a tree key.
pub fn reversed(domain: &str) -> String {
    domain.chars().rev().collect()
}

/// Canonicalizes a configured domain: lowercase with a trailing dot. The
/// empty string becomes `"."`.
pub fn canonical_domain(domain: &str) -> String {
    let lower = domain.to_ascii_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        format!("{}.", lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(&str, &str)]) -> RadixTree<String> {
        let mut tree = RadixTree::new();
        for (domain, label) in entries {
            tree.insert(
                reversed(&canonical_domain(domain)).as_bytes(),
                label.to_string(),
            );
        }
        tree
    }

    fn lookup<'a>(tree: &'a RadixTree<String>, qname: &str) -> Option<&'a str> {
        tree.longest_prefix(reversed(&canonical_domain(qname)).as_bytes())
            .map(String::as_str)
    }

    #[test]
    fn longest_suffix_wins() {
        let tree = tree(&[("", "default"), ("example.com", "special")]);

        assert_eq!(lookup(&tree, "foo.example.com"), Some("special"));
        assert_eq!(lookup(&tree, "example.com"), Some("special"));
        assert_eq!(lookup(&tree, "foo.bar"), Some("default"));
        assert_eq!(lookup(&tree, "com"), Some("default"));
    }

    #[test]
    fn deeper_suffix_beats_shallower() {
        let tree = tree(&[
            ("com", "com"),
            ("example.com", "example"),
            ("www.example.com", "www"),
        ]);

        assert_eq!(lookup(&tree, "www.example.com"), Some("www"));
        assert_eq!(lookup(&tree, "mail.example.com"), Some("example"));
        assert_eq!(lookup(&tree, "other.com"), Some("com"));
        assert_eq!(lookup(&tree, "other.org"), None);
    }

    #[test]
    fn no_match_without_default() {
        let tree = tree(&[("example.com", "only")]);
        assert_eq!(lookup(&tree, "unrelated.net"), None);
    }

    #[test]
    fn case_folds_through_canonicalization() {
        let tree = tree(&[("Example.COM", "x")]);
        assert_eq!(lookup(&tree, "foo.EXAMPLE.com"), Some("x"));
    }

    #[test]
    fn replaces_existing_value() {
        let mut tree = RadixTree::new();
        let key = reversed(&canonical_domain("example.com"));
        tree.insert(key.as_bytes(), 1u32);
        tree.insert(key.as_bytes(), 2u32);
        assert_eq!(tree.longest_prefix(key.as_bytes()), Some(&2));
    }

    #[test]
    fn split_edges_keep_both_branches() {
        // "moc.elpmaxe." and "moc.e" share a prefix that forces a split.
        let tree = tree(&[("example.com", "a"), ("e.com", "b")]);
        assert_eq!(lookup(&tree, "x.example.com"), Some("a"));
        assert_eq!(lookup(&tree, "y.e.com"), Some("b"));
        assert_eq!(lookup(&tree, "z.other.com"), None);
    }
}
