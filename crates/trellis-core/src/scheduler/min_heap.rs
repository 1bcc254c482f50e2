//! Binary min-heap keyed by `(sort_index, id)`.

use std::cmp::Ordering;

use crate::platform::Millis;

pub trait HeapNode {
    fn sort_index(&self) -> Millis;
    fn id(&self) -> u64;
}

fn compare<T: HeapNode>(a: &T, b: &T) -> Ordering {
    a.sort_index()
        .cmp(&b.sort_index())
        .then_with(|| a.id().cmp(&b.id()))
}

#[derive(Debug)]
pub struct MinHeap<T> {
    nodes: Vec<T>,
}

impl<T> Default for MinHeap<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T: HeapNode> MinHeap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn peek(&self) -> Option<&T> {
        self.nodes.first()
    }

    pub fn push(&mut self, node: T) {
        self.nodes.push(node);
        self.sift_up(self.nodes.len() - 1);
    }

    pub fn pop(&mut self) -> Option<T> {
        let last = self.nodes.pop()?;
        if self.nodes.is_empty() {
            return Some(last);
        }
        let first = std::mem::replace(&mut self.nodes[0], last);
        self.sift_down(0);
        Some(first)
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if compare(&self.nodes[parent], &self.nodes[index]) == Ordering::Greater {
                self.nodes.swap(parent, index);
                index = parent;
            } else {
                return;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.nodes.len();
        loop {
            let left = index * 2 + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len && compare(&self.nodes[left], &self.nodes[smallest]) == Ordering::Less {
                smallest = left;
            }
            if right < len && compare(&self.nodes[right], &self.nodes[smallest]) == Ordering::Less
            {
                smallest = right;
            }
            if smallest == index {
                return;
            }
            self.nodes.swap(index, smallest);
            index = smallest;
        }
    }
}
