// Utility functions for filtering operations
use std::collections::{HashMap, HashSet};

/// Calculate Shannon entropy of a string
/// Higher entropy = more information-dense; 0.0 for a single repeated character
pub fn shannon_entropy(s: &str) -> f32 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, u32> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    let len = s.chars().count() as f32;
    -freq
        .values()
        .map(|&count| {
            let p = count as f32 / len;
            p * p.log2()
        })
        .sum::<f32>()
}

/// Lowercased alphanumeric words
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Share of words that repeat an earlier word: `1 - unique / total`
/// Returns 0.0 for empty text
pub fn repetition_ratio(text: &str) -> f32 {
    let words = words(text);
    if words.is_empty() {
        return 0.0;
    }

    let unique: HashSet<&String> = words.iter().collect();
    1.0 - unique.len() as f32 / words.len() as f32
}

/// Whether a path lies under an excluded prefix
/// Prefixes match whole path segments: `archive` excludes `archive/x.md`, not `archived.md`
pub fn is_excluded(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        !prefix.is_empty()
            && (path == prefix
                || path
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/')))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_uniform() {
        let high = shannon_entropy("abcdefghijklmnop");
        let low = shannon_entropy("aaaaaaaaaaaaaaaa");

        assert!(high > low);
        assert!(high > 3.0);
        assert!(low < 1.0);
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert_eq!(shannon_entropy(""), 0.0);
    }

    #[test]
    fn test_words() {
        assert_eq!(
            words("What if Alpha's idea, again?"),
            vec!["what", "if", "alpha's", "idea", "again"]
        );
    }

    #[test]
    fn test_repetition_ratio() {
        assert_eq!(repetition_ratio(""), 0.0);
        assert_eq!(repetition_ratio("one two three four"), 0.0);
        assert_eq!(repetition_ratio("spam spam spam spam"), 0.75);
    }

    #[test]
    fn test_is_excluded() {
        let prefixes = vec!["archive/".to_string(), "templates".to_string()];
        assert!(is_excluded("archive/old.md", &prefixes));
        assert!(is_excluded("templates/daily.md", &prefixes));
        assert!(!is_excluded("archived.md", &prefixes));
        assert!(!is_excluded("notes/archive/x.md", &prefixes));
        assert!(!is_excluded("a.md", &[]));
    }
}
