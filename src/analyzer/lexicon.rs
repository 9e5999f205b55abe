//! Marker lexicons for redirection analysis.
//!
//! Phrase tables are lowercase; matching is substring-based over the
//! case-folded turn text, with regexes only where word boundaries matter.

use once_cell::sync::Lazy;
use regex::Regex;

/// Corrective markers with their detection weight.
///
/// Strong markers are near-unambiguous corrections; weak markers need
/// reinforcement from structure to clear the detection threshold.
pub const CORRECTIVE_MARKERS: &[(&str, f64)] = &[
    ("that's not what i", 0.9),
    ("that is not what i", 0.9),
    ("you misunderstood", 0.9),
    ("i said", 0.7),
    ("i meant", 0.7),
    ("i asked for", 0.7),
    ("not what i asked", 0.85),
    ("that's wrong", 0.8),
    ("that is wrong", 0.8),
    ("that's not", 0.6),
    ("that is not", 0.6),
    ("actually", 0.5),
    (", not ", 0.45),
    ("instead", 0.4),
    ("stop", 0.6),
    ("undo", 0.6),
    ("revert", 0.5),
    ("wrong", 0.5),
    ("incorrect", 0.6),
    ("don't", 0.3),
    ("do not", 0.3),
];

/// Leading-token negations that mark a corrective opening.
#[allow(clippy::unwrap_used)] // pattern is a known-valid literal
pub static LEADING_NEGATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(no|nope|stop|wait|wrong)\b").unwrap());

/// Escalation markers for severity scoring.
pub const ESCALATION_MARKERS: &[&str] = &["again", "still", "once more", "yet again", "third time"];

/// Words in all caps (≥ 3 letters) also count as escalation.
#[allow(clippy::unwrap_used)] // pattern is a known-valid literal
pub static ALL_CAPS_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{3,}\b").unwrap());

/// Category keyword tables: (phrase, weight).
pub mod category {
    /// The assistant misread what was asked.
    pub const COMPREHENSION_GAP: &[(&str, f64)] = &[
        ("i said", 0.8),
        ("i meant", 0.8),
        ("you misunderstood", 1.0),
        ("not what i asked", 0.9),
        ("that's not what i", 0.9),
        ("misread", 0.7),
        ("you're not listening", 0.8),
        ("read it again", 0.6),
    ];

    /// The assistant wandered outside the requested scope.
    pub const SCOPE_DRIFT: &[(&str, f64)] = &[
        ("stick to", 0.8),
        ("stay on", 0.7),
        ("out of scope", 0.9),
        ("we don't need", 0.6),
        ("just do", 0.5),
        ("only the", 0.5),
        ("too much", 0.5),
        ("focus on", 0.6),
        ("didn't ask you to", 0.8),
    ];

    /// The assistant stated something false.
    pub const FACTUAL_ERROR: &[(&str, f64)] = &[
        ("that's wrong", 0.8),
        ("that is wrong", 0.8),
        ("incorrect", 0.8),
        ("not true", 0.8),
        ("false", 0.6),
        ("doesn't exist", 0.8),
        ("does not exist", 0.8),
        ("no such", 0.7),
        ("made that up", 0.9),
    ];

    /// The instruction itself was unclear.
    pub const INSTRUCTION_AMBIGUITY: &[(&str, f64)] = &[
        ("to be clear", 0.7),
        ("let me clarify", 0.8),
        ("i should have said", 0.9),
        ("what i meant was", 0.8),
        ("to clarify", 0.7),
        ("more specifically", 0.6),
    ];

    /// The assistant worked on the wrong thing first.
    pub const PRIORITY_CONFLICT: &[(&str, f64)] = &[
        ("first", 0.4),
        ("before that", 0.7),
        ("more important", 0.8),
        ("priority", 0.7),
        ("instead of", 0.5),
        ("later", 0.3),
        ("not now", 0.6),
    ];

    /// The register or tone missed the mark.
    pub const TONE_MISMATCH: &[(&str, f64)] = &[
        ("tone", 0.7),
        ("too formal", 0.8),
        ("too casual", 0.8),
        ("condescending", 0.9),
        ("rude", 0.8),
        ("simpler language", 0.7),
        ("plain english", 0.6),
    ];

    /// The wrong tool or mechanism was used.
    pub const TOOLING_MISUSE: &[(&str, f64)] = &[
        ("wrong tool", 0.9),
        ("wrong file", 0.8),
        ("wrong command", 0.8),
        ("don't use", 0.5),
        ("use the", 0.4),
        ("shouldn't have run", 0.8),
        ("not that script", 0.7),
    ];
}

/// Tone cue tables.
pub mod tone {
    /// Patience cues.
    pub const PATIENCE: &[&str] = &["no worries", "when you can", "please", "thanks", "thank you", "no rush"];
    /// Frustration cues.
    pub const FRUSTRATION: &[&str] = &["ugh", "seriously", "come on", "why would you", "how hard"];
    /// Urgency cues.
    pub const URGENCY: &[&str] = &["asap", "urgent", "right now", "immediately", "quickly", "hurry"];
    /// Resignation cues.
    pub const RESIGNATION: &[&str] = &["never mind", "nevermind", "forget it", "i'll do it myself", "whatever", "don't bother"];
}

/// Root-cause cue tables.
pub mod root_cause {
    /// The assistant asserted something never provided.
    pub const HALLUCINATION: &[&str] = &["made up", "made that up", "i never said", "where did you get", "invented", "doesn't exist", "no such"];
    /// Needed context never reached the assistant.
    pub const MISSING_CONTEXT: &[&str] = &["you didn't know", "i didn't tell you", "for context", "background", "you couldn't have known"];
    /// The assistant relied on out-of-date knowledge.
    pub const STALE_KNOWLEDGE: &[&str] = &["outdated", "out of date", "changed since", "no longer", "deprecated", "old version"];
    /// The assistant acted beyond what was asked.
    pub const OVER_EAGER_ACTION: &[&str] = &["went ahead", "didn't ask you to", "without asking", "too far", "just asked for"];
    /// The request itself lacked detail.
    pub const UNDER_SPECIFICATION: &[&str] = &["i should have said", "i wasn't clear", "my fault", "should have specified", "i forgot to mention"];
}

/// Positive-acknowledgement cues for resolution tracking.
pub const POSITIVE_ACK: &[&str] = &[
    "thanks", "thank you", "great", "perfect", "that works", "looks good", "exactly", "much better", "yes",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_negation() {
        assert!(LEADING_NEGATION.is_match("No, I said Go"));
        assert!(LEADING_NEGATION.is_match("  stop doing that"));
        assert!(!LEADING_NEGATION.is_match("Now let's continue"));
        assert!(!LEADING_NEGATION.is_match("nothing wrong here".trim()));
    }

    #[test]
    fn test_all_caps_word() {
        assert!(ALL_CAPS_WORD.is_match("read the FILE again"));
        assert!(!ALL_CAPS_WORD.is_match("no caps here"));
        // Two-letter acronyms do not count.
        assert!(!ALL_CAPS_WORD.is_match("run it on CI"));
    }
}
