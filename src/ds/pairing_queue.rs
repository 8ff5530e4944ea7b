//! Pairing-heap priority queue used as best-first search frontier.
//!
//! Duplicate keys are allowed. Callers implement decrease-key lazily: they keep
//! a best-so-far map, push the key again with its better priority, and discard
//! popped entries whose priority is worse than the map entry.
//!
//! Nodes live in an arena and refer to each other by index, so melding never
//! moves keys around.

#[derive(Debug, Clone)]
struct HeapNode<K> {
    key: Option<K>,
    priority: f64,
    child: Option<usize>,
    sibling: Option<usize>,
}

/// Min-priority pairing heap with an optional cap on the number of entries.
#[derive(Debug, Clone)]
pub struct PairingQueue<K> {
    nodes: Vec<HeapNode<K>>,
    free: Vec<usize>,
    root: Option<usize>,
    len: usize,
    cap: Option<usize>,
}

impl<K> Default for PairingQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> PairingQueue<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
            cap: None,
        }
    }

    /// Queue that only retains the `k` lowest-priority entries.
    #[must_use]
    pub fn with_cap(k: usize) -> Self {
        Self {
            cap: Some(k.max(1)),
            ..Self::new()
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    /// Lowest priority currently queued.
    #[must_use]
    pub fn peek_priority(&self) -> Option<f64> {
        self.root.map(|r| self.nodes[r].priority)
    }

    pub fn insert(&mut self, key: K, priority: f64) {
        let node = HeapNode {
            key: Some(key),
            priority,
            child: None,
            sibling: None,
        };
        let index = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.root = Some(match self.root {
            Some(root) => self.meld(root, index),
            None => index,
        });
        self.len += 1;

        if let Some(cap) = self.cap {
            if self.len > cap {
                self.drop_worst();
            }
        }
    }

    /// Removes and returns the entry with the lowest priority.
    pub fn pop(&mut self) -> Option<K> {
        self.pop_with_priority().map(|(key, _)| key)
    }

    pub fn pop_with_priority(&mut self) -> Option<(K, f64)> {
        let root = self.root?;
        let child = self.nodes[root].child.take();
        self.root = self.merge_pairs(child);
        self.len -= 1;
        self.free.push(root);
        let priority = self.nodes[root].priority;
        self.nodes[root].key.take().map(|key| (key, priority))
    }

    fn meld(&mut self, a: usize, b: usize) -> usize {
        let (parent, child) = if self.nodes[b].priority < self.nodes[a].priority {
            (b, a)
        } else {
            (a, b)
        };
        self.nodes[child].sibling = self.nodes[parent].child;
        self.nodes[parent].child = Some(child);
        parent
    }

    /// Standard two-pass pairing of a sibling list.
    fn merge_pairs(&mut self, first: Option<usize>) -> Option<usize> {
        let mut pairs = Vec::new();
        let mut cursor = first;
        while let Some(a) = cursor {
            let next = self.nodes[a].sibling.take();
            match next {
                Some(b) => {
                    cursor = self.nodes[b].sibling.take();
                    pairs.push(self.meld(a, b));
                }
                None => {
                    cursor = None;
                    pairs.push(a);
                }
            }
        }
        let mut merged = pairs.pop()?;
        while let Some(next) = pairs.pop() {
            merged = self.meld(next, merged);
        }
        Some(merged)
    }

    /// Rebuilds the heap without its highest-priority entry.
    fn drop_worst(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        let mut live = Vec::with_capacity(self.len);
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            live.push(index);
            if let Some(child) = self.nodes[index].child {
                stack.push(child);
            }
            if let Some(sibling) = self.nodes[index].sibling {
                stack.push(sibling);
            }
        }
        let worst = live
            .iter()
            .copied()
            .max_by(|&a, &b| self.nodes[a].priority.total_cmp(&self.nodes[b].priority));
        let Some(worst) = worst else {
            return;
        };

        self.root = None;
        for &index in &live {
            self.nodes[index].child = None;
            self.nodes[index].sibling = None;
        }
        for index in live {
            if index == worst {
                self.nodes[index].key = None;
                self.free.push(index);
                continue;
            }
            self.root = Some(match self.root {
                Some(root) => self.meld(root, index),
                None => index,
            });
        }
        self.len -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_priority_order() {
        let mut queue = PairingQueue::new();
        for (key, priority) in [("c", 3.0), ("a", 1.0), ("d", 4.0), ("b", 2.0), ("e", 0.5)] {
            queue.insert(key, priority);
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(order, vec!["e", "a", "b", "c", "d"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicate_keys_support_lazy_decrease_key() {
        use std::collections::HashMap;

        let mut queue = PairingQueue::new();
        let mut best: HashMap<&str, f64> = HashMap::new();
        for (key, priority) in [("x", 5.0_f64), ("y", 3.0), ("x", 1.0)] {
            best.insert(key, priority.min(*best.get(key).unwrap_or(&f64::INFINITY)));
            queue.insert(key, priority);
        }
        let mut accepted = Vec::new();
        while let Some((key, priority)) = queue.pop_with_priority() {
            if priority > best[key] {
                continue;
            }
            accepted.push(key);
        }
        assert_eq!(accepted, vec!["x", "y"]);
    }

    #[test]
    fn cap_keeps_lowest_entries() {
        let mut queue = PairingQueue::with_cap(2);
        queue.insert(1, 10.0);
        queue.insert(2, 1.0);
        queue.insert(3, 5.0);
        queue.insert(4, 20.0);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn reuses_freed_slots() {
        let mut queue = PairingQueue::new();
        for round in 0..3 {
            for i in 0..8 {
                queue.insert(i, f64::from((i * 7 + round) % 8));
            }
            while queue.pop().is_some() {}
        }
        assert!(queue.nodes.len() <= 8);
    }
}
