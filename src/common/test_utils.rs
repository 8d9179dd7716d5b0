use std::sync::atomic::{AtomicU64, Ordering};

/// A zeroed stand-in for a device buffer, for driving the table engines
/// directly.
pub(crate) fn zeroed_words(len: usize) -> Box<[AtomicU64]> {
    (0..len).map(|_| AtomicU64::new(0)).collect()
}

pub(crate) fn words_from(contents: &[u64]) -> Box<[AtomicU64]> {
    contents.iter().map(|&w| AtomicU64::new(w)).collect()
}

pub(crate) fn snapshot(words: &[AtomicU64]) -> Vec<u64> {
    words.iter().map(|w| w.load(Ordering::Acquire)).collect()
}
