//! Prefix-compressed storage for extent URLs.
//!
//! Extents of one disc usually share long URL prefixes. The trie splits URLs
//! at the points where they diverge; inverting it yields a flat node table
//! where every node names its parent, so a URL is recovered by walking from
//! its leaf to the root and concatenating contents in reverse.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// One node of an inverted trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriNode {
    /// Index of the parent in the node table; 0 is the root.
    pub parent: u32,
    pub content: String,
}

struct Node<V> {
    content: String,
    children: BTreeMap<char, usize>,
    values: Vec<V>,
}

impl<V> Node<V> {
    fn new(content: String) -> Self {
        Self {
            content,
            children: BTreeMap::new(),
            values: Vec::new(),
        }
    }
}

/// Byte length of the longest common prefix of `a` and `b` that ends on a
/// character boundary.
fn common_prefix(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()))
}

/// A radix trie from URL to the values stored under it.
pub struct UriTrie<V> {
    nodes: Vec<Node<V>>,
}

impl<V> Default for UriTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> UriTrie<V> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(String::new())],
        }
    }

    /// Store `value` under `url`. Values put under the same URL accumulate.
    pub fn put(&mut self, url: &str, value: V) {
        let mut cur = 0;
        let mut rest = url;
        loop {
            let Some(first) = rest.chars().next() else {
                self.nodes[cur].values.push(value);
                return;
            };
            let Some(&child) = self.nodes[cur].children.get(&first) else {
                let leaf = self.nodes.len();
                let mut node = Node::new(rest.to_string());
                node.values.push(value);
                self.nodes.push(node);
                self.nodes[cur].children.insert(first, leaf);
                return;
            };

            let shared = common_prefix(&self.nodes[child].content, rest);
            if shared < self.nodes[child].content.len() {
                // Split `child` so the shared prefix becomes its own node.
                let tail = self.nodes[child].content.split_off(shared);
                let head = std::mem::replace(&mut self.nodes[child].content, tail);
                let mid = self.nodes.len();
                let mut node = Node::new(head);
                if let Some(c) = self.nodes[child].content.chars().next() {
                    node.children.insert(c, child);
                }
                self.nodes.push(node);
                self.nodes[cur].children.insert(first, mid);
                cur = mid;
            } else {
                cur = child;
            }
            rest = &rest[shared..];
        }
    }

    /// The values stored under exactly `url`.
    pub fn get(&self, url: &str) -> Option<&[V]> {
        let mut cur = 0;
        let mut rest = url;
        while let Some(first) = rest.chars().next() {
            let &child = self.nodes[cur].children.get(&first)?;
            rest = rest.strip_prefix(self.nodes[child].content.as_str())?;
            cur = child;
        }
        let values = &self.nodes[cur].values;
        (!values.is_empty()).then_some(values.as_slice())
    }
}

impl<V: Clone + Ord> UriTrie<V> {
    /// Flatten the trie.
    ///
    /// Returns the branch table in level order, with the root at index 0,
    /// and for every stored value the leaf node that ends its URL. A leaf's
    /// `parent` indexes the branch table.
    pub fn invert(&self) -> CatalogResult<(Vec<UriNode>, BTreeMap<V, UriNode>)> {
        let mut branches = vec![UriNode {
            parent: 0,
            content: String::new(),
        }];
        let mut leaves = BTreeMap::new();
        let mut index = vec![0u32; self.nodes.len()];

        let mut queue = VecDeque::from([(0usize, 0u32)]);
        while let Some((id, parent)) = queue.pop_front() {
            let node = &self.nodes[id];
            if id != 0 && !node.children.is_empty() {
                index[id] = u32::try_from(branches.len())
                    .map_err(|_| CatalogError::format("URI trie has more than 2^32 nodes"))?;
                branches.push(UriNode {
                    parent,
                    content: node.content.clone(),
                });
            }
            for v in &node.values {
                leaves.insert(
                    v.clone(),
                    UriNode {
                        parent,
                        content: node.content.clone(),
                    },
                );
            }
            for &child in node.children.values() {
                queue.push_back((child, index[id]));
            }
        }
        Ok((branches, leaves))
    }
}

/// Rebuild the URL ending at `leaf` from the branch table.
pub fn resolve(branches: &[UriNode], leaf: &UriNode) -> CatalogResult<String> {
    let mut parts = vec![leaf.content.as_str()];
    let mut cur = leaf.parent;
    // Parents always precede their children, so this terminates.
    while cur != 0 {
        let node = branches
            .get(cur as usize)
            .ok_or_else(|| CatalogError::format(format!("URI node {cur} out of range")))?;
        if node.parent >= cur {
            return Err(CatalogError::format(format!(
                "URI node {cur} has parent {} after it",
                node.parent
            )));
        }
        parts.push(node.content.as_str());
        cur = node.parent;
    }
    parts.reverse();
    Ok(parts.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(urls: &[&str]) -> Vec<UriNode> {
        let mut trie = UriTrie::new();
        for (i, u) in urls.iter().enumerate() {
            trie.put(u, i as u32);
        }
        let (branches, leaves) = trie.invert().unwrap();
        for (i, u) in urls.iter().enumerate() {
            assert_eq!(resolve(&branches, &leaves[&(i as u32)]).unwrap(), *u);
        }
        branches
    }

    #[test]
    fn shared_prefixes_split() {
        let branches = round_trip(&[
            "https://bucket/disc/file-0001",
            "https://bucket/disc/file-0002",
            "https://bucket/other",
        ]);
        let contents: Vec<&str> = branches.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, ["", "https://bucket/", "disc/file-000"]);
        assert_eq!(branches[2].parent, 1);
    }

    #[test]
    fn url_that_prefixes_another() {
        let branches = round_trip(&["mem:a", "mem:ab", "mem:abc"]);
        assert_eq!(branches[0], UriNode { parent: 0, content: String::new() });
    }

    #[test]
    fn get_is_exact() {
        let mut trie = UriTrie::new();
        trie.put("abc", 1);
        trie.put("abd", 2);
        trie.put("abc", 3);
        assert_eq!(trie.get("abc"), Some(&[1, 3][..]));
        assert_eq!(trie.get("abd"), Some(&[2][..]));
        assert_eq!(trie.get("ab"), None);
        assert_eq!(trie.get("abcd"), None);
        assert_eq!(trie.get(""), None);
    }

    #[test]
    fn multibyte_split() {
        round_trip(&["mem:日本", "mem:日曜", "mem:é"]);
    }

    #[test]
    fn deterministic_numbering() {
        let a = round_trip(&["x/1", "x/2", "y/1"]);
        let b = round_trip(&["y/1", "x/2", "x/1"]);
        assert_eq!(a, b);
    }

    #[test]
    fn resolve_rejects_forward_parent() {
        let branches = vec![
            UriNode { parent: 0, content: String::new() },
            UriNode { parent: 1, content: "a".into() },
        ];
        let leaf = UriNode { parent: 1, content: "b".into() };
        assert!(resolve(&branches, &leaf).is_err());
    }

    proptest! {
        #[test]
        fn leaves_reconstruct_every_url(
            urls in proptest::collection::btree_set("[a-c/:]{1,12}", 1..40)
        ) {
            let urls: Vec<String> = urls.into_iter().collect();
            let mut trie = UriTrie::new();
            for (i, u) in urls.iter().enumerate() {
                trie.put(u, i);
            }
            let (branches, leaves) = trie.invert().unwrap();
            prop_assert_eq!(leaves.len(), urls.len());
            for (i, u) in urls.iter().enumerate() {
                prop_assert_eq!(&resolve(&branches, &leaves[&i]).unwrap(), u);
                prop_assert_eq!(trie.get(u), Some(&[i][..]));
            }
        }
    }
}
