//! Keyword sentiment detection used to pick the reply tone.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

const ANGRY_WORDS: &[&str] = &[
    "angry", "frustrated", "terrible", "awful", "hate", "worst", "useless", "horrible",
];

const HAPPY_WORDS: &[&str] = &[
    "great", "awesome", "excellent", "love", "amazing", "fantastic", "wonderful", "perfect",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Angry,
    Happy,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Classify a user message. Anger wins over happiness.
    pub fn detect(text: &str) -> Self {
        if mentions_any(text, ANGRY_WORDS, angry_pattern()) {
            Sentiment::Angry
        } else if mentions_any(text, HAPPY_WORDS, happy_pattern()) {
            Sentiment::Happy
        } else {
            Sentiment::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Angry => "angry",
            Sentiment::Happy => "happy",
            Sentiment::Neutral => "neutral",
        }
    }

    /// Tone instructions appended to the system prompt.
    pub fn tone(self) -> &'static str {
        match self {
            Sentiment::Angry => {
                "- Be APOLOGETIC and empathetic\n\
                 - Acknowledge the customer's frustration immediately\n\
                 - Use phrases like \"I sincerely apologize\" or \"I understand how frustrating this must be\"\n\
                 - Prioritize resolving the issue quickly\n\
                 - Offer to escalate if needed"
            }
            Sentiment::Happy => {
                "- Be ENTHUSIASTIC and friendly\n\
                 - Match the customer's positive energy\n\
                 - Use phrases like \"That's great to hear!\" or \"Wonderful!\"\n\
                 - Be warm and encouraging"
            }
            Sentiment::Neutral => {
                "- Be professional and helpful\n\
                 - Keep a friendly but focused tone\n\
                 - Be clear and concise"
            }
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Words matched at a word start, so inflections ("hated", "loved") count.
fn word_pattern(words: &[&str]) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b(?:{})", words.join("|"))).ok()
}

fn angry_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| word_pattern(ANGRY_WORDS)).as_ref()
}

fn happy_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| word_pattern(HAPPY_WORDS)).as_ref()
}

fn mentions_any(text: &str, words: &[&str], pattern: Option<&Regex>) -> bool {
    match pattern {
        Some(re) => re.is_match(text),
        None => {
            let lower = text.to_lowercase();
            words.iter().any(|w| lower.contains(w))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn angry_messages() {
        assert_eq!(Sentiment::detect("This is the WORST product ever"), Sentiment::Angry);
        assert_eq!(Sentiment::detect("I'm so frustrated, nothing works!"), Sentiment::Angry);
    }

    #[test]
    fn happy_messages() {
        assert_eq!(Sentiment::detect("Awesome, thanks!"), Sentiment::Happy);
        assert_eq!(Sentiment::detect("I love the new dashboard"), Sentiment::Happy);
    }

    #[test]
    fn anger_takes_precedence() {
        assert_eq!(Sentiment::detect("great, another useless update"), Sentiment::Angry);
    }

    #[test]
    fn inflected_forms_count() {
        assert_eq!(Sentiment::detect("I hated it"), Sentiment::Angry);
        assert_eq!(Sentiment::detect("Honestly, loved it"), Sentiment::Happy);
        assert_eq!(Sentiment::detect("It works perfectly now"), Sentiment::Happy);
    }

    #[test]
    fn words_match_at_word_start() {
        assert_eq!(Sentiment::detect("My gloves are in the locker"), Sentiment::Neutral);
        assert_eq!(Sentiment::detect("Whatever, how do I export?"), Sentiment::Neutral);
    }

    #[test]
    fn tone_matches_sentiment() {
        assert!(Sentiment::Angry.tone().contains("APOLOGETIC"));
        assert!(Sentiment::Happy.tone().contains("ENTHUSIASTIC"));
        assert!(Sentiment::Neutral.tone().contains("professional"));
    }
}
