//! Keyword classification of transcribed customer replies.

use callpilot_types::Intent;

/// Multi-word negatives. Checked before single words so "not interested"
/// never matches the bare "interested" affirmative.
const NO_PHRASES: &[&str] = &[
    "not interested",
    "no thanks",
    "no thank you",
    "don't call",
    "do not call",
    "remove me",
    "take me off",
    "leave me alone",
];

/// Multi-word repeat requests.
const REPEAT_PHRASES: &[&str] = &["say that again", "come again", "one more time"];

const NO_WORDS: &[&str] = &["no", "nope", "nah", "never", "stop"];

const YES_WORDS: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "yup",
    "sure",
    "okay",
    "ok",
    "correct",
    "right",
    "interested",
    "absolutely",
    "definitely",
];

const REPEAT_WORDS: &[&str] = &["repeat", "again", "what", "pardon", "sorry"];

/// Classifies a transcript into the engine's intent vocabulary.
///
/// Match order is most-specific first: negative phrases, repeat phrases,
/// negative words, affirmative words, repeat words. Anything else (or an
/// empty transcript) is `Unrecognized`.
pub fn classify_intent(transcript: &str) -> Intent {
    let normalized: String = transcript
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        return Intent::Unrecognized;
    }

    if NO_PHRASES.iter().any(|p| normalized.contains(p)) {
        return Intent::No;
    }
    if REPEAT_PHRASES.iter().any(|p| normalized.contains(p)) {
        return Intent::Repeat;
    }

    let words: Vec<&str> = normalized.split(' ').collect();
    if words.iter().any(|w| NO_WORDS.contains(w)) {
        return Intent::No;
    }
    if words.iter().any(|w| YES_WORDS.contains(w)) {
        return Intent::Yes;
    }
    if words.iter().any(|w| REPEAT_WORDS.contains(w)) {
        return Intent::Repeat;
    }

    Intent::Unrecognized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_affirmatives() {
        for reply in ["yes", "Yeah.", "sure thing", "okay", "I'm interested"] {
            assert_eq!(classify_intent(reply), Intent::Yes, "reply: {reply}");
        }
    }

    #[test]
    fn plain_negatives() {
        for reply in ["no", "Nope!", "nah", "please stop"] {
            assert_eq!(classify_intent(reply), Intent::No, "reply: {reply}");
        }
    }

    #[test]
    fn negation_beats_embedded_affirmative() {
        assert_eq!(classify_intent("I'm not interested"), Intent::No);
        assert_eq!(classify_intent("no thanks"), Intent::No);
        assert_eq!(classify_intent("no I'm not interested, okay?"), Intent::No);
    }

    #[test]
    fn repeat_requests() {
        for reply in ["what?", "pardon", "can you repeat that", "say that again"] {
            assert_eq!(classify_intent(reply), Intent::Repeat, "reply: {reply}");
        }
    }

    #[test]
    fn sorry_alone_is_repeat_but_sorry_no_is_negative() {
        assert_eq!(classify_intent("sorry?"), Intent::Repeat);
        assert_eq!(classify_intent("sorry, no"), Intent::No);
    }

    #[test]
    fn noise_is_unrecognized() {
        for reply in ["", "   ", "the weather is nice", "42"] {
            assert_eq!(classify_intent(reply), Intent::Unrecognized, "reply: {reply}");
        }
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        assert_eq!(classify_intent("YES!!!"), Intent::Yes);
        assert_eq!(classify_intent("No."), Intent::No);
    }
}
