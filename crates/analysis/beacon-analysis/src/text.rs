use serde_json::Value;
use std::collections::HashSet;

/// Pulls the model's answer out of a unit output.
///
/// Looks at `response`, then the first entry of `responses` (a string or an
/// object with `text`/`content`), then `text`, then `content`. A bare string
/// output is taken as-is.
pub fn extract_response_text(output: &Value) -> Option<String> {
    let text = match output {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("response")
            .and_then(Value::as_str)
            .or_else(|| {
                map.get("responses")
                    .and_then(Value::as_array)
                    .and_then(|all| all.first())
                    .and_then(|first| match first {
                        Value::String(s) => Some(s.as_str()),
                        Value::Object(inner) => inner
                            .get("text")
                            .or_else(|| inner.get("content"))
                            .and_then(Value::as_str),
                        _ => None,
                    })
            })
            .or_else(|| map.get("text").and_then(Value::as_str))
            .or_else(|| map.get("content").and_then(Value::as_str)),
        _ => None,
    }?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lowercased alphanumeric tokens of at least three characters.
pub fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|w| w.chars().count() >= 3)
        .collect()
}

/// Jaccard similarity of two token sets; two empty sets are identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Mean Jaccard similarity over every unordered pair; `1.0` below two texts.
pub fn mean_pairwise_similarity(texts: &[&str]) -> f64 {
    if texts.len() < 2 {
        return 1.0;
    }
    let sets: Vec<_> = texts.iter().map(|t| token_set(t)).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            total += jaccard(&sets[i], &sets[j]);
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// Number of non-overlapping occurrences of `needle` in `haystack`.
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

/// Whether every fragment appears in `text`, each after the previous one.
pub fn contains_in_order(text: &str, fragments: &[&str]) -> bool {
    let mut rest = text;
    for fragment in fragments {
        match rest.find(fragment) {
            Some(pos) => rest = &rest[pos + fragment.len()..],
            None => return false,
        }
    }
    true
}

pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_text_lookup_order() {
        assert_eq!(
            extract_response_text(&json!({ "response": "a", "text": "b" })).as_deref(),
            Some("a")
        );
        assert_eq!(
            extract_response_text(&json!({ "responses": [{ "content": "first" }, "second"] })).as_deref(),
            Some("first")
        );
        assert_eq!(
            extract_response_text(&json!({ "responses": ["plain"] })).as_deref(),
            Some("plain")
        );
        assert_eq!(extract_response_text(&json!({ "content": "c" })).as_deref(), Some("c"));
        assert_eq!(extract_response_text(&json!({ "response": "   " })), None);
        assert_eq!(extract_response_text(&json!(42)), None);
    }

    #[test]
    fn tokens_drop_short_words_and_punctuation() {
        let tokens = token_set("The PROTEST, in 1989; was big!");
        assert!(tokens.contains("the"));
        assert!(tokens.contains("protest"));
        assert!(tokens.contains("1989"));
        assert!(tokens.contains("big"));
        assert!(!tokens.contains("in"));
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(mean_pairwise_similarity(&["only one"]), 1.0);
        assert_eq!(mean_pairwise_similarity(&["", ""]), 1.0);
        assert_eq!(mean_pairwise_similarity(&["alpha beta", "alpha beta"]), 1.0);
        assert_eq!(mean_pairwise_similarity(&["alpha beta", "gamma delta"]), 0.0);
    }

    #[test]
    fn ordered_fragments() {
        assert!(contains_in_order("i cannot provide that information", &["cannot provide", "information"]));
        assert!(!contains_in_order("information i cannot provide", &["cannot provide", "information"]));
    }
}
