#![forbid(unsafe_code)]

use std::ops::Range;

const WORD_BITS: usize = u64::BITS as usize;

/// Per-row keep/drop flags for a page.
///
/// Row `i` lives in bit `i % 64` of word `i / 64`. Bits past `len` in the last word are always
/// zero, so population counts can work a word at a time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
}

fn locate(index: usize) -> (usize, u64) {
    (index / WORD_BITS, 1u64 << (index % WORD_BITS))
}

impl BitVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len_all_true(len: usize) -> Self {
        let mut bits = Self::with_len_all_false(len);
        bits.fill(true);
        bits
    }

    pub fn with_len_all_false(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    pub fn from_bools(values: impl IntoIterator<Item = bool>) -> Self {
        let mut words = Vec::new();
        let mut len = 0;
        for value in values {
            if len % WORD_BITS == 0 {
                words.push(0);
            }
            if value {
                let (word, mask) = locate(len);
                words[word] |= mask;
            }
            len += 1;
        }
        Self { words, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "row {index} out of range for {} flags", self.len);
        let (word, mask) = locate(index);
        self.words[word] & mask != 0
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "row {index} out of range for {} flags", self.len);
        let (word, mask) = locate(index);
        if value {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }

    /// Set every flag in `range` to `value`. The range is clamped to the length.
    pub fn set_range(&mut self, range: Range<usize>, value: bool) {
        let end = range.end.min(self.len);
        let mut i = range.start.min(end);
        while i < end {
            let (word, _) = locate(i);
            let lo = i % WORD_BITS;
            let hi = (end - word * WORD_BITS).min(WORD_BITS);
            let span = if hi - lo == WORD_BITS {
                u64::MAX
            } else {
                ((1u64 << (hi - lo)) - 1) << lo
            };
            if value {
                self.words[word] |= span;
            } else {
                self.words[word] &= !span;
            }
            i = word * WORD_BITS + hi;
        }
    }

    pub fn fill(&mut self, value: bool) {
        let fill = if value { u64::MAX } else { 0 };
        self.words.iter_mut().for_each(|w| *w = fill);
        self.clear_padding();
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn all_true(&self) -> bool {
        self.count_ones() == self.len
    }

    /// Indices of the set flags, ascending.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(w * WORD_BITS + bit)
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    pub fn and_inplace(&mut self, other: &BitVec) {
        debug_assert_eq!(self.len, other.len, "flag vectors differ in length");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= b;
        }
    }

    pub fn or_inplace(&mut self, other: &BitVec) {
        debug_assert_eq!(self.len, other.len, "flag vectors differ in length");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
        self.clear_padding();
    }

    pub fn not_inplace(&mut self) {
        self.words.iter_mut().for_each(|w| *w = !*w);
        self.clear_padding();
    }

    fn clear_padding(&mut self) {
        let used = self.len % WORD_BITS;
        if let (Some(last), true) = (self.words.last_mut(), used != 0) {
            *last &= (1u64 << used) - 1;
        }
    }
}

impl FromIterator<bool> for BitVec {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        Self::from_bools(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn inverting_keeps_padding_clear() {
        let mut flags = BitVec::with_len_all_true(70);
        assert_eq!(flags.count_ones(), 70);
        flags.not_inplace();
        assert_eq!(flags.count_ones(), 0);
        flags.not_inplace();
        assert!(flags.all_true());
    }

    #[test]
    fn ranges_are_clamped_and_cross_words() {
        let mut flags = BitVec::with_len_all_false(5);
        flags.set_range(3..10, true);
        assert_eq!(flags.iter_ones().collect::<Vec<_>>(), vec![3, 4]);
        flags.set_range(7..9, false);
        assert_eq!(flags.count_ones(), 2);

        let mut wide = BitVec::with_len_all_false(200);
        wide.set_range(60..130, true);
        assert_eq!(wide.count_ones(), 70);
        assert!(!wide.get(59) && wide.get(60) && wide.get(129) && !wide.get(130));
        wide.set_range(0..200, false);
        assert_eq!(wide.count_ones(), 0);
    }

    proptest! {
        #[test]
        fn bulk_logic_matches_per_row_logic(
            a in proptest::collection::vec(any::<bool>(), 0..200),
            seed in any::<u64>(),
        ) {
            let b: Vec<bool> = (0..a.len()).map(|i| (seed >> (i % 64)) & 1 == 1).collect();
            let mut and = BitVec::from_bools(a.iter().copied());
            and.and_inplace(&BitVec::from_bools(b.iter().copied()));
            let mut or = BitVec::from_bools(a.iter().copied());
            or.or_inplace(&BitVec::from_bools(b.iter().copied()));

            let expect_and: Vec<usize> =
                (0..a.len()).filter(|&i| a[i] && b[i]).collect();
            let expect_or = (0..a.len()).filter(|&i| a[i] || b[i]).count();
            prop_assert_eq!(and.iter_ones().collect::<Vec<_>>(), expect_and);
            prop_assert_eq!(or.count_ones(), expect_or);
            prop_assert_eq!(and.iter().collect::<Vec<_>>().len(), a.len());
        }
    }
}
