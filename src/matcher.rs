//! Knuth-Morris-Pratt search for boundary delimiters.
//!
//! Mail bodies routinely reach tens of megabytes and a boundary is searched
//! for once per part, so the search has to stay linear in the haystack.

/// A pattern with its precomputed failure function.
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: Vec<u8>,
    failure: Vec<usize>,
}

impl Matcher {
    /// # Panics
    ///
    /// Panics if `pattern` is empty.
    pub fn new<P: AsRef<[u8]>>(pattern: P) -> Self {
        let pattern = pattern.as_ref().to_vec();
        assert!(!pattern.is_empty(), "cannot search for an empty pattern");

        let failure = failure_function(&pattern);
        Self { pattern, failure }
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    /// Index of the first occurrence of the pattern at or after `from`.
    pub fn find(&self, haystack: &[u8], from: usize) -> Option<usize> {
        let mut matched = 0;

        for (i, &b) in haystack.iter().enumerate().skip(from) {
            while matched > 0 && self.pattern[matched] != b {
                matched = self.failure[matched - 1];
            }

            if self.pattern[matched] == b {
                matched += 1;
            }

            if matched == self.pattern.len() {
                return Some(i + 1 - matched);
            }
        }

        None
    }

    /// Start offsets of all, possibly overlapping, occurrences.
    pub fn find_all<'a>(&'a self, haystack: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        let mut from = 0;
        std::iter::from_fn(move || {
            let found = self.find(haystack, from)?;
            from = found + 1;
            Some(found)
        })
    }
}

/// `failure[i]` is the length of the longest proper prefix of
/// `pattern[..=i]` that is also a suffix of it.
fn failure_function(pattern: &[u8]) -> Vec<usize> {
    let mut failure = vec![0; pattern.len()];
    let mut k = 0;

    for i in 1..pattern.len() {
        while k > 0 && pattern[k] != pattern[i] {
            k = failure[k - 1];
        }
        if pattern[k] == pattern[i] {
            k += 1;
        }
        failure[i] = k;
    }

    failure
}

/// One-off search. Builds the failure function on each call, keep a
/// [`Matcher`] around for repeated searches of the same pattern.
///
/// # Panics
///
/// Panics if `pattern` is empty.
pub fn find(haystack: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    Matcher::new(pattern).find(haystack, from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn naive(haystack: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
        if pattern.len() > haystack.len() {
            return None;
        }
        (from..=haystack.len() - pattern.len()).find(|&i| &haystack[i..i + pattern.len()] == pattern)
    }

    #[test]
    fn failure_function_of_repetitive_pattern() {
        assert_eq!(vec![0, 1, 0, 1, 2, 3], failure_function(b"aabaab"));
        assert_eq!(vec![0, 1, 0, 0], failure_function(b"--ab"));
        assert_eq!(vec![0, 1, 2, 0], failure_function(b"---x"));
        assert_eq!(Some(1), Matcher::new("--ab").find(b"---ab", 0));
    }

    #[test]
    fn finds_boundary_after_offset() {
        let data = b"--frontier\r\nfirst\r\n--frontier\r\nsecond\r\n--frontier--";
        let m = Matcher::new("--frontier");

        assert_eq!(Some(0), m.find(data, 0));
        assert_eq!(Some(19), m.find(data, 1));
        assert_eq!(vec![0, 19, 39], m.find_all(data).collect::<Vec<_>>());
        assert_eq!(None, m.find(data, 40));
    }

    #[test]
    fn from_past_end_finds_nothing() {
        assert_eq!(None, find(b"abc", b"a", 10));
    }

    #[test]
    #[should_panic]
    fn empty_pattern_panics() {
        find(b"abc", b"", 0);
    }

    proptest! {
        #[test]
        fn agrees_with_naive_scan(
            haystack in prop::collection::vec(0u8..4, 0..256),
            pattern in prop::collection::vec(0u8..4, 1..8),
            from in 0usize..300,
        ) {
            prop_assert_eq!(naive(&haystack, &pattern, from), find(&haystack, &pattern, from));
        }

        #[test]
        fn agrees_with_twoway(
            haystack in prop::collection::vec(any::<u8>(), 0..512),
            pattern in prop::collection::vec(any::<u8>(), 1..4),
        ) {
            prop_assert_eq!(twoway::find_bytes(&haystack, &pattern), find(&haystack, &pattern, 0));
        }
    }
}
