const WORD: usize = 64;

/// Fixed-width bit set backed by `u64` words.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
    size: usize,
}

impl BitSet {
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0; size.div_ceil(WORD)],
            size,
        }
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.size && self.words[index / WORD] & (1 << (index % WORD)) != 0
    }

    pub fn set(&mut self, index: usize) {
        self.words[index / WORD] |= 1 << (index % WORD);
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(|&i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_iterate() {
        let mut bits = BitSet::new(130);
        for i in [0, 63, 64, 129] {
            bits.set(i);
        }

        assert!(bits.get(64));
        assert!(!bits.get(65));
        assert!(!bits.get(1000));
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![0, 63, 64, 129]);

        // Setting twice is idempotent
        bits.set(0);
        assert_eq!(bits.iter_ones().count(), 4);
    }
}
