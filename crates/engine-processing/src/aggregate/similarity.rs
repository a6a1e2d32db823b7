use std::collections::BTreeSet;

/// |a ∩ b| / |a ∪ b|; two empty sets are identical.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// `.`-separated segments of a location path.
pub fn location_segments(location: &str) -> BTreeSet<String> {
    location
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lower-cased words of a message with surrounding punctuation removed.
pub fn message_words(message: &str) -> BTreeSet<String> {
    message
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}
