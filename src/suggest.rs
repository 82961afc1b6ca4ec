use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

pub const MAX_SUGGESTIONS: usize = 8;

pub const POPULAR_SEARCHES: &[&str] = &[
    "Taylor Swift",
    "Bad Bunny",
    "The Weeknd",
    "Billie Eilish",
    "Drake",
    "Ed Sheeran",
    "Ariana Grande",
    "BTS",
    "rock music",
    "pop music",
    "jazz",
    "classical",
    "reggaeton",
    "hip hop",
    "country",
    "k-pop",
];

/// Genre shortcuts offered on an empty Home tab, as `(label, query)`.
pub const QUICK_SEARCHES: &[(&str, &str)] = &[
    ("Rock", "rock music"),
    ("Pop", "pop music"),
    ("Piano", "piano music"),
    ("Classical", "classical music"),
    ("K-Pop", "kpop music"),
    ("Electronic", "electronic music"),
];

/// Popular searches containing `input`, prefix matches first.
pub fn suggestions(input: &str) -> Vec<&'static str> {
    suggestions_from(POPULAR_SEARCHES, input)
}

pub fn suggestions_from(candidates: &[&'static str], input: &str) -> Vec<&'static str> {
    let needle = fold(input.trim());
    if needle.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<(bool, &'static str)> = candidates
        .iter()
        .filter_map(|candidate| {
            let folded = fold(candidate);
            folded
                .contains(&needle)
                .then(|| (folded.starts_with(&needle), *candidate))
        })
        .collect();
    // stable: original order kept within each group
    matches.sort_by_key(|(starts, _)| !*starts);
    matches
        .into_iter()
        .map(|(_, candidate)| candidate)
        .take(MAX_SUGGESTIONS)
        .collect()
}

fn fold(value: &str) -> String {
    value
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch))
        .flat_map(char::to_lowercase)
        .collect()
}
