//! Key builders for the dashboard cache namespaces.
//!
//! Every namespace ends in `:` so a whole namespace can be dropped with
//! `TtlCache::delete_pattern("<namespace>:*")`.

use sha2::{Digest, Sha256};

/// Texts considered when hashing a corpus for topic caching.
const HASHED_TEXT_LIMIT: usize = 100;

pub fn analysis_key(subreddit: &str) -> String {
    format!("analysis:{}", subreddit.to_lowercase())
}

pub fn prediction_key(keyword: &str, days: u32) -> String {
    format!("prediction:{}:{}", keyword.to_lowercase(), days)
}

pub fn topics_key(texts_hash: &str) -> String {
    format!("topics:{}", texts_hash)
}

pub fn anomaly_key(keyword: &str, method: &str) -> String {
    format!("anomaly:{}:{}", keyword.to_lowercase(), method)
}

/// Order-independent 16 hex character digest of the first texts of a corpus.
pub fn hash_texts<S: AsRef<str>>(texts: &[S]) -> String {
    let mut sample: Vec<&str> = texts
        .iter()
        .take(HASHED_TEXT_LIMIT)
        .map(AsRef::as_ref)
        .collect();
    sample.sort_unstable();

    let mut hasher = Sha256::new();
    for text in sample {
        hasher.update(text.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_lowercased_and_namespaced() {
        assert_eq!(analysis_key("RustLang"), "analysis:rustlang");
        assert_eq!(prediction_key("Tokio", 7), "prediction:tokio:7");
        assert_eq!(anomaly_key("Axum", "auto"), "anomaly:axum:auto");
        assert_eq!(topics_key("abc"), "topics:abc");
    }

    #[test]
    fn test_hash_texts_ignores_order() {
        let a = hash_texts(&["first post", "second post"]);
        let b = hash_texts(&["second post", "first post"]);

        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, hash_texts(&["first post"]));
    }
}
