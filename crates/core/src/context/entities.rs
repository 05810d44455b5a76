//! Placeholder entity/topic extraction: a simple interface a real NLP model
//! can replace later without touching `ContextManager`.

use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "to", "of", "and", "or", "in", "on", "at",
    "for", "with", "that", "this", "it", "i", "you", "we", "they", "he", "she", "be", "do",
    "does", "did", "have", "has", "had", "but", "so", "if", "not", "what", "how", "can", "will",
];

/// Capitalized tokens longer than 2 characters, deduplicated, in first-seen
/// order.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut seen = HashMap::new();
    let mut out = Vec::new();
    for word in text.split_whitespace() {
        let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if cleaned.len() > 2
            && cleaned.chars().next().is_some_and(|c| c.is_uppercase())
            && !seen.contains_key(&cleaned)
        {
            seen.insert(cleaned.clone(), ());
            out.push(cleaned);
        }
    }
    out
}

/// Stop-word-filtered token frequencies, top 5 with count >= 2.
pub fn extract_topics(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text.split_whitespace() {
        let lower: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if lower.len() < 3 || STOP_WORDS.contains(&lower.as_str()) {
            continue;
        }
        *counts.entry(lower).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().filter(|(_, c)| *c >= 2).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(5).map(|(word, _)| word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_capitalized_entities() {
        let entities = extract_entities("I spoke with Sarah about the Acme project near Boston");
        assert!(entities.contains(&"Sarah".to_string()));
        assert!(entities.contains(&"Acme".to_string()));
        assert!(entities.contains(&"Boston".to_string()));
        assert!(!entities.contains(&"I".to_string()));
    }

    #[test]
    fn extracts_frequent_non_stopword_topics() {
        let text = "deploy deploy deploy the service service and monitor the deploy pipeline";
        let topics = extract_topics(text);
        assert!(topics.contains(&"deploy".to_string()));
        assert!(topics.contains(&"service".to_string()));
        assert!(topics.len() <= 5);
    }
}
