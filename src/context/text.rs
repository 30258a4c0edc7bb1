//! Text similarity helpers shared by the scorer, compressor and health monitor

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::hash::Hash;

/// Lowercase alphanumeric words longer than `min_len` characters
pub fn significant_words(text: &str, min_len: usize) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.chars().count() > min_len)
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard index of two sets; two empty sets have similarity 0
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Word-overlap similarity (Jaccard over words longer than 3 chars), 0.0-1.0
pub fn word_overlap(a: &str, b: &str) -> f64 {
    jaccard(&significant_words(a, 3), &significant_words(b, 3))
}

/// Jaccard overlap of two string lists, compared case-insensitively
pub fn set_overlap(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<String> = a.iter().map(|s| normalize_path(s)).collect();
    let b: HashSet<String> = b.iter().map(|s| normalize_path(s)).collect();
    jaccard(&a, &b)
}

/// Lowercased path with forward slashes and no leading `./`
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/").to_lowercase();
    path.trim_start_matches("./").to_string()
}

/// Whether two path references point at the same file.
///
/// A bare file name or a shorter relative path matches a longer path that
/// ends with it on a component boundary.
pub fn paths_match(a: &str, b: &str) -> bool {
    let a = normalize_path(a);
    let b = normalize_path(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let (long, short) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };
    long.ends_with(short.as_str()) && long[..long.len() - short.len()].ends_with('/')
}

/// Jaccard-style overlap of two file lists whose entries match by [`paths_match`]
pub fn file_overlap(a: &[String], b: &[String]) -> f64 {
    let shared = a
        .iter()
        .filter(|fa| b.iter().any(|fb| paths_match(fa, fb)))
        .count();
    let union = (a.len() + b.len()).saturating_sub(shared);
    if union == 0 {
        return 0.0;
    }
    (shared as f64 / union as f64).min(1.0)
}

/// Cosine similarity of two vectors; mismatched or zero vectors give 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// SHA-256 hex digest of the given parts, separated by `|`
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Split text into sentences on `.`, `!`, `?` and line breaks
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Truncate to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
