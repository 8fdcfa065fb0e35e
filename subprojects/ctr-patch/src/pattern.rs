//! Boyer–Moore–Horspool byte search.

/// Bad-character shift table for one pattern.
///
/// Entry `b` is the distance the search window may slide when the byte aligned with the
/// last pattern position is `b`.
pub struct ShiftTable<'p> {
    pattern: &'p [u8],
    shifts: [usize; 256],
}

impl<'p> ShiftTable<'p> {
    /// Build the table for `pattern`.
    ///
    /// Returns `None` for an empty pattern, which matches nothing.
    pub fn new(pattern: &'p [u8]) -> Option<Self> {
        let len = pattern.len();
        if len == 0 {
            return None;
        }

        let mut shifts = [len; 256];
        for (i, &b) in pattern[..len - 1].iter().enumerate() {
            shifts[b as usize] = len - 1 - i;
        }

        Some(Self { pattern, shifts })
    }

    /// Lowest offset in `haystack` where the pattern occurs.
    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        let len = self.pattern.len();
        if len > haystack.len() {
            return None;
        }

        let last = len - 1;
        let mut pos = 0;
        while pos + len <= haystack.len() {
            let window = &haystack[pos..pos + len];
            if window[last] == self.pattern[last] && window == self.pattern {
                return Some(pos);
            }
            pos += self.shifts[window[last] as usize];
        }

        None
    }
}

/// Lowest offset of `pattern` in `haystack`.
///
/// An empty pattern, or one longer than the haystack, matches nothing.
pub fn find(haystack: &[u8], pattern: &[u8]) -> Option<usize> {
    ShiftTable::new(pattern)?.find_in(haystack)
}

/// Lowest offset of `pattern` in `haystack` at or after `start`.
///
/// The returned offset is relative to the start of `haystack`.
pub fn find_from(haystack: &[u8], pattern: &[u8], start: usize) -> Option<usize> {
    let tail = haystack.get(start..)?;
    find(tail, pattern).map(|at| start + at)
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn brute_force(haystack: &[u8], pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() {
            return None;
        }
        haystack.windows(pattern.len()).position(|w| w == pattern)
    }

    #[test]
    fn finds_lowest_offset() {
        let haystack = b"xxabcabcabc";
        assert_eq!(find(haystack, b"abc"), Some(2));
        assert_eq!(find(haystack, b"cab"), Some(4));
        assert_eq!(find(haystack, b"abd"), None);
    }

    #[test]
    fn match_at_both_ends() {
        let haystack = [0xE2, 0x20, 0x20, 0x90, 0x00, 0x00, 0x1E, 0x00, 0xC8, 0x05];
        assert_eq!(find(&haystack, &[0xE2, 0x20, 0x20, 0x90]), Some(0));
        assert_eq!(find(&haystack, &[0x1E, 0x00, 0xC8, 0x05]), Some(6));
    }

    #[test]
    fn empty_or_oversized_pattern_matches_nothing() {
        assert_eq!(find(b"abc", b""), None);
        assert_eq!(find(b"abc", b"abcd"), None);
        assert_eq!(find(b"", b"a"), None);
        assert_eq!(find(b"abc", b"abc"), Some(0));
    }

    #[test]
    fn find_from_reports_absolute_offsets() {
        let haystack = b"ess9....ess9";
        assert_eq!(find_from(haystack, b"ess9", 0), Some(0));
        assert_eq!(find_from(haystack, b"ess9", 1), Some(8));
        assert_eq!(find_from(haystack, b"ess9", 9), None);
        assert_eq!(find_from(haystack, b"ess9", 100), None);
    }

    #[test]
    fn agrees_with_brute_force_on_random_input() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x4649_524D);

        for _ in 0..2000 {
            // A tiny alphabet makes partial matches and repeats common
            let alphabet = rng.gen_range(1..=4u8);
            let haystack: Vec<u8> = (0..rng.gen_range(0..64))
                .map(|_| rng.gen_range(0..alphabet))
                .collect();
            let pattern: Vec<u8> = (0..rng.gen_range(0..6))
                .map(|_| rng.gen_range(0..alphabet))
                .collect();

            assert_eq!(
                find(&haystack, &pattern),
                brute_force(&haystack, &pattern),
                "haystack {haystack:?} pattern {pattern:?}"
            );
        }
    }
}
