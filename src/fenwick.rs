use std::ops::{Add, Sub};

/// A [Fenwick tree](https://en.wikipedia.org/wiki/Fenwick_tree) over an appendable array.
///
/// The tree vector is always one element longer than the array: slot 0 is a sentinel. The sum of the whole
/// array is kept aside so that [`FenwickTree::total`] is O(1).
#[derive(Clone, Debug, PartialEq)]
pub struct FenwickTree<T> {
    array: Vec<T>,
    tree: Vec<T>,
    total: T,
}

impl<T> Default for FenwickTree<T>
where
    T: Copy + Default + Add<Output = T> + Sub<Output = T>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for FenwickTree<T>
where
    T: Copy + Default + Add<Output = T> + Sub<Output = T>,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut result = Self::with_capacity(iter.size_hint().0);
        for value in iter {
            result.push(value);
        }

        result
    }
}

impl<T> FenwickTree<T>
where
    T: Copy + Default + Add<Output = T> + Sub<Output = T>,
{
    pub fn new() -> Self {
        Self {
            array: vec![],
            tree: vec![T::default()],
            total: T::default(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut tree = Vec::with_capacity(capacity + 1);
        tree.push(T::default());
        Self {
            array: Vec::with_capacity(capacity),
            tree,
            total: T::default(),
        }
    }

    /// Prefix sum of `tree` positions `(begin, end]`, returned as `add - sub` so that
    /// intermediate values never go below zero for unsigned types.
    fn _sum(&self, mut begin: usize, mut end: usize) -> T {
        let mut add = T::default();
        let mut sub = T::default();
        while begin != end {
            if end > begin {
                add = add + self.tree[end];
                end &= end - 1;
            } else {
                sub = sub + self.tree[begin];
                begin &= begin - 1;
            }
        }

        add - sub
    }

    pub fn as_slice(&self) -> &[T] {
        &self.array
    }

    /// Sum over `[offset, offset + length)`.
    pub fn sum(&self, offset: usize, length: usize) -> T {
        self._sum(offset, offset + length)
    }

    pub fn total(&self) -> T {
        self.total
    }

    pub fn set(&mut self, index: usize, value: T) {
        let old = self.array[index];
        self.array[index] = value;
        self.total = self.total + value - old;

        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] = self.tree[i] + value - old;
            i = (i | (i - 1)) + 1;
        }
    }

    pub fn push(&mut self, value: T) {
        self.array.push(value);
        self.total = self.total + value;

        let index = self.tree.len();
        let node = value + self._sum(index & (index - 1), index - 1);
        self.tree.push(node);
    }

    pub fn pop(&mut self) -> Option<T> {
        let value = self.array.pop()?;
        self.tree.pop();
        self.total = self.total - value;
        Some(value)
    }
}
