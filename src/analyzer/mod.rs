//! Redirection analysis.
//!
//! Scans a session transcript for user turns that correct the
//! assistant's immediately prior behavior, classifies each redirection
//! (category, severity, tone, root causes), tracks whether the next
//! exchange resolved it, and produces a per-session report.
//!
//! The analyzer is pure: it reads a transcript and returns a report.
//! Persistence (meta-pattern rows and health observations) happens in
//! the service layer so analyzer failures can never block a tool call.

mod lexicon;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Redirections below this detection confidence are discarded.
const DEFAULT_DETECTION_THRESHOLD: f64 = 0.4;

/// Rolling window (in transcript turns) for the frequency factor.
const FREQUENCY_WINDOW: usize = 5;

/// Turn index at which the session-length factor saturates.
const SESSION_LENGTH_SCALE: f64 = 40.0;

/// Token-overlap ratio above which two corrections count as repeats.
const REPEAT_OVERLAP: f64 = 0.4;

/// Severity score bands: trivial < minor < major < critical.
const SEVERITY_BANDS: [f64; 3] = [0.1, 0.45, 0.75];

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The human user.
    User,
    /// The AI assistant.
    Assistant,
}

/// One transcript turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Position in the transcript.
    pub turn_index: usize,
    /// Who spoke.
    pub speaker: Speaker,
    /// The turn text.
    pub text: String,
    /// When the turn happened.
    pub timestamp: DateTime<Utc>,
}

/// Semantic category of a redirection, in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// The assistant misread what was asked.
    ComprehensionGap,
    /// The assistant wandered outside the requested scope.
    ScopeDrift,
    /// The assistant stated something false.
    FactualError,
    /// The instruction itself was unclear.
    InstructionAmbiguity,
    /// The assistant worked on the wrong thing first.
    PriorityConflict,
    /// The register or tone missed the mark.
    ToneMismatch,
    /// The wrong tool or mechanism was used.
    ToolingMisuse,
}

impl Category {
    /// All categories in priority order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ComprehensionGap,
            Self::ScopeDrift,
            Self::FactualError,
            Self::InstructionAmbiguity,
            Self::PriorityConflict,
            Self::ToneMismatch,
            Self::ToolingMisuse,
        ]
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ComprehensionGap => "comprehension_gap",
            Self::ScopeDrift => "scope_drift",
            Self::FactualError => "factual_error",
            Self::InstructionAmbiguity => "instruction_ambiguity",
            Self::PriorityConflict => "priority_conflict",
            Self::ToneMismatch => "tone_mismatch",
            Self::ToolingMisuse => "tooling_misuse",
        }
    }

    const fn keywords(self) -> &'static [(&'static str, f64)] {
        match self {
            Self::ComprehensionGap => lexicon::category::COMPREHENSION_GAP,
            Self::ScopeDrift => lexicon::category::SCOPE_DRIFT,
            Self::FactualError => lexicon::category::FACTUAL_ERROR,
            Self::InstructionAmbiguity => lexicon::category::INSTRUCTION_AMBIGUITY,
            Self::PriorityConflict => lexicon::category::PRIORITY_CONFLICT,
            Self::ToneMismatch => lexicon::category::TONE_MISMATCH,
            Self::ToolingMisuse => lexicon::category::TOOLING_MISUSE,
        }
    }

    /// Root causes implied by the category itself.
    const fn default_causes(self) -> &'static [RootCause] {
        match self {
            Self::ComprehensionGap => &[RootCause::InstructionAmbiguity],
            Self::ScopeDrift => &[RootCause::OverEagerAction],
            Self::FactualError => &[RootCause::Hallucination],
            Self::InstructionAmbiguity => &[RootCause::UnderSpecification],
            Self::PriorityConflict => &[RootCause::UnderSpecification],
            Self::ToneMismatch => &[],
            Self::ToolingMisuse => &[RootCause::OverEagerAction],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Barely worth noting.
    Trivial,
    /// A small course correction.
    Minor,
    /// A substantial correction.
    Major,
    /// The session is off the rails.
    Critical,
}

impl Severity {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }

    fn from_score(score: f64) -> Self {
        if score < SEVERITY_BANDS[0] {
            Self::Trivial
        } else if score < SEVERITY_BANDS[1] {
            Self::Minor
        } else if score < SEVERITY_BANDS[2] {
            Self::Major
        } else {
            Self::Critical
        }
    }
}

/// Emotional tone of a redirection turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// No marked affect.
    Neutral,
    /// Calm and accommodating.
    Patience,
    /// Irritation is showing.
    Frustration,
    /// Time pressure.
    Urgency,
    /// Giving up on the assistant.
    Resignation,
}

impl Tone {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Patience => "patience",
            Self::Frustration => "frustration",
            Self::Urgency => "urgency",
            Self::Resignation => "resignation",
        }
    }
}

/// Root-cause signals a redirection can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    /// The instruction was ambiguous.
    InstructionAmbiguity,
    /// Needed context never reached the assistant.
    MissingContext,
    /// The assistant asserted something never provided.
    Hallucination,
    /// The assistant relied on out-of-date knowledge.
    StaleKnowledge,
    /// The assistant acted beyond what was asked.
    OverEagerAction,
    /// The request lacked detail.
    UnderSpecification,
}

impl RootCause {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InstructionAmbiguity => "instruction_ambiguity",
            Self::MissingContext => "missing_context",
            Self::Hallucination => "hallucination",
            Self::StaleKnowledge => "stale_knowledge",
            Self::OverEagerAction => "over_eager_action",
            Self::UnderSpecification => "under_specification",
        }
    }
}

/// Outcome of the exchange following a redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The correction took.
    Resolved,
    /// Partly addressed.
    Partial,
    /// The same correction came back.
    Unresolved,
    /// A new problem appeared.
    Regressed,
    /// No following user turn to judge by.
    Pending,
}

impl Resolution {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Partial => "partial",
            Self::Unresolved => "unresolved",
            Self::Regressed => "regressed",
            Self::Pending => "pending",
        }
    }
}

/// Processing state of a redirection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Detected above threshold.
    Detected,
    /// Category assigned.
    Categorized,
    /// Severity assigned.
    SeverityAssigned,
    /// Resolution determined.
    ResolutionTracked,
    /// Included in the report (terminal).
    Reported,
    /// Confidence below threshold (terminal).
    Discarded,
}

/// One analyzed redirection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectionRecord {
    /// Transcript index of the redirecting user turn.
    pub turn_index: usize,
    /// Detection confidence in `[0, 1]`.
    pub detection_confidence: f64,
    /// Semantic category.
    pub category: Category,
    /// Severity class.
    pub severity: Severity,
    /// Raw severity score in `[0, 1]`.
    pub severity_score: f64,
    /// Emotional tone.
    pub tone: Tone,
    /// Root-cause signals, deduplicated.
    pub root_causes: Vec<RootCause>,
    /// Resolution of the following exchange.
    pub resolution: Resolution,
    /// Improvement suggestions for this redirection.
    pub suggestions: Vec<String>,
    /// Processing state (terminal states only in reports).
    pub state: RecordState,
}

/// Per-session analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Redirections that survived the confidence threshold.
    pub redirection_count: usize,
    /// Total user turns in the transcript.
    pub user_turns: usize,
    /// `redirection_count / user_turns` (0 for an empty transcript).
    pub rate: f64,
    /// Count per category.
    pub category_distribution: BTreeMap<String, usize>,
    /// Count per severity.
    pub severity_distribution: BTreeMap<String, usize>,
    /// Count per resolution outcome.
    pub effectiveness_distribution: BTreeMap<String, usize>,
    /// Per-redirection records.
    pub records: Vec<RedirectionRecord>,
    /// Deduplicated suggestions across the session.
    pub suggestions: Vec<String>,
}

/// Tunable factor weights.
///
/// The four severity weights must sum to 1.0; the defaults are validated
/// against the labeled fixtures in this module's tests.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerWeights {
    /// Detection confidence floor.
    pub detection_threshold: f64,
    /// Severity: rolling-window frequency factor.
    pub frequency: f64,
    /// Severity: escalation-marker factor.
    pub escalation: f64,
    /// Severity: repeated-correction factor.
    pub repetition: f64,
    /// Severity: session-length factor.
    pub session_length: f64,
}

impl Default for AnalyzerWeights {
    fn default() -> Self {
        Self {
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            frequency: 0.3,
            escalation: 0.3,
            repetition: 0.25,
            session_length: 0.15,
        }
    }
}

/// The redirection analyzer.
#[derive(Debug, Clone, Default)]
pub struct RedirectionAnalyzer {
    weights: AnalyzerWeights,
}

impl RedirectionAnalyzer {
    /// Creates an analyzer with default weights.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an analyzer with custom weights.
    #[must_use]
    pub const fn with_weights(weights: AnalyzerWeights) -> Self {
        Self { weights }
    }

    /// Analyzes a transcript into a session report.
    #[must_use]
    pub fn analyze(&self, turns: &[Turn]) -> SessionReport {
        let user_turns = turns.iter().filter(|t| t.speaker == Speaker::User).count();

        let mut records: Vec<RedirectionRecord> = Vec::new();
        let mut redirection_indices: Vec<usize> = Vec::new();
        let mut seen_assistant = false;

        for (pos, turn) in turns.iter().enumerate() {
            match turn.speaker {
                Speaker::Assistant => seen_assistant = true,
                Speaker::User => {
                    if !seen_assistant {
                        continue;
                    }
                    let confidence = detection_confidence(&turn.text);
                    if confidence <= 0.0 {
                        continue;
                    }
                    if confidence < self.weights.detection_threshold {
                        // Terminal: discarded, never reported.
                        continue;
                    }

                    let record = self.build_record(
                        turns,
                        pos,
                        confidence,
                        &redirection_indices,
                    );
                    redirection_indices.push(pos);
                    records.push(record);
                },
            }
        }

        let mut category_distribution = BTreeMap::new();
        let mut severity_distribution = BTreeMap::new();
        let mut effectiveness_distribution = BTreeMap::new();
        let mut suggestions: Vec<String> = Vec::new();
        for record in &records {
            *category_distribution
                .entry(record.category.as_str().to_string())
                .or_insert(0) += 1;
            *severity_distribution
                .entry(record.severity.as_str().to_string())
                .or_insert(0) += 1;
            *effectiveness_distribution
                .entry(record.resolution.as_str().to_string())
                .or_insert(0) += 1;
            for s in &record.suggestions {
                if !suggestions.contains(s) {
                    suggestions.push(s.clone());
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let rate = if user_turns == 0 {
            0.0
        } else {
            records.len() as f64 / user_turns as f64
        };

        SessionReport {
            redirection_count: records.len(),
            user_turns,
            rate,
            category_distribution,
            severity_distribution,
            effectiveness_distribution,
            records,
            suggestions,
        }
    }

    /// Walks one redirection through the record state machine.
    fn build_record(
        &self,
        turns: &[Turn],
        pos: usize,
        confidence: f64,
        prior_redirections: &[usize],
    ) -> RedirectionRecord {
        let turn = &turns[pos];
        let folded = turn.text.to_lowercase();

        // detected -> categorized
        let category = categorize(&folded);

        // categorized -> severity_assigned
        let (severity, severity_score) =
            self.severity(turns, pos, &folded, prior_redirections);

        let tone = tone_of(&folded);
        let root_causes = root_causes(category, &folded);

        // severity_assigned -> resolution_tracked
        let resolution = resolution_of(turns, pos, &folded);

        // resolution_tracked -> reported
        let suggestions = root_causes
            .iter()
            .map(|cause| suggestion_for(category, *cause))
            .collect();

        RedirectionRecord {
            turn_index: turn.turn_index,
            detection_confidence: confidence,
            category,
            severity,
            severity_score,
            tone,
            root_causes,
            resolution,
            suggestions,
            state: RecordState::Reported,
        }
    }

    /// Scores severity from the four configured factors.
    #[allow(clippy::cast_precision_loss)]
    fn severity(
        &self,
        turns: &[Turn],
        pos: usize,
        folded: &str,
        prior_redirections: &[usize],
    ) -> (Severity, f64) {
        let window_start = pos.saturating_sub(FREQUENCY_WINDOW);
        let in_window = prior_redirections
            .iter()
            .filter(|p| **p >= window_start)
            .count()
            + 1;
        let window_len = (pos - window_start + 1).min(FREQUENCY_WINDOW);
        let frequency = in_window as f64 / window_len as f64;

        let mut escalation_signals = 0u8;
        if lexicon::ESCALATION_MARKERS.iter().any(|m| folded.contains(m)) {
            escalation_signals += 1;
        }
        if turns[pos].text.contains('!') {
            escalation_signals += 1;
        }
        if lexicon::ALL_CAPS_WORD.is_match(&turns[pos].text) {
            escalation_signals += 1;
        }
        let escalation = f64::from(escalation_signals) / 3.0;

        let repetition = if prior_redirections
            .iter()
            .any(|p| token_overlap(folded, &turns[*p].text.to_lowercase()) > REPEAT_OVERLAP)
        {
            1.0
        } else {
            0.0
        };

        let session_length = (pos as f64 / SESSION_LENGTH_SCALE).min(1.0);

        let w = &self.weights;
        let score = (w.frequency * frequency.min(1.0)
            + w.escalation * escalation
            + w.repetition * repetition
            + w.session_length * session_length)
            .clamp(0.0, 1.0);
        (Severity::from_score(score), score)
    }
}

/// Detection confidence for one user turn.
fn detection_confidence(text: &str) -> f64 {
    let folded = text.to_lowercase();

    let mut matched: Vec<f64> = lexicon::CORRECTIVE_MARKERS
        .iter()
        .filter(|(phrase, _)| folded.contains(phrase))
        .map(|(_, weight)| *weight)
        .collect();
    matched.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut score: f64 = matched.first().copied().unwrap_or(0.0);
    // Additional distinct markers reinforce the strongest one.
    score += 0.05 * matched.len().saturating_sub(1) as f64;
    if lexicon::LEADING_NEGATION.is_match(text) {
        score += 0.15;
    }
    // Second-person reference ties the correction to prior assistant output.
    if folded.contains("you ") || folded.contains("your ") {
        score += 0.05;
    }
    score.min(1.0)
}

/// Picks the semantic category by weighted lexical + positional signals.
fn categorize(folded: &str) -> Category {
    let head_len = folded.len().div_ceil(3);
    let mut best = Category::ComprehensionGap;
    let mut best_score = f64::MIN;

    for category in Category::all() {
        let mut lexical = 0.0;
        let mut positional: f64 = 0.0;
        for (phrase, weight) in category.keywords() {
            if let Some(at) = folded.find(phrase) {
                lexical += weight;
                // A marker in the opening third carries positional weight.
                if at < head_len {
                    positional = positional.max(*weight);
                }
            }
        }
        let score = 0.7f64.mul_add(lexical.min(1.5), 0.3 * positional);
        // Strictly greater keeps the priority order on ties.
        if score > best_score {
            best_score = score;
            best = *category;
        }
    }
    best
}

/// Picks the dominant emotional tone.
fn tone_of(folded: &str) -> Tone {
    let hits = |cues: &[&str]| cues.iter().filter(|c| folded.contains(*c)).count();

    // Priority: resignation > urgency > frustration > patience.
    if hits(lexicon::tone::RESIGNATION) > 0 {
        Tone::Resignation
    } else if hits(lexicon::tone::URGENCY) > 0 {
        Tone::Urgency
    } else if hits(lexicon::tone::FRUSTRATION) > 0 || lexicon::ALL_CAPS_WORD.is_match(folded) {
        Tone::Frustration
    } else if hits(lexicon::tone::PATIENCE) > 0 {
        Tone::Patience
    } else {
        Tone::Neutral
    }
}

/// Collects root-cause signals: the category's defaults plus cue hits.
fn root_causes(category: Category, folded: &str) -> Vec<RootCause> {
    let mut causes: Vec<RootCause> = category.default_causes().to_vec();

    let cues: &[(&[&str], RootCause)] = &[
        (lexicon::root_cause::HALLUCINATION, RootCause::Hallucination),
        (lexicon::root_cause::MISSING_CONTEXT, RootCause::MissingContext),
        (lexicon::root_cause::STALE_KNOWLEDGE, RootCause::StaleKnowledge),
        (lexicon::root_cause::OVER_EAGER_ACTION, RootCause::OverEagerAction),
        (
            lexicon::root_cause::UNDER_SPECIFICATION,
            RootCause::UnderSpecification,
        ),
    ];
    for (table, cause) in cues {
        if table.iter().any(|c| folded.contains(c)) && !causes.contains(cause) {
            causes.push(*cause);
        }
    }
    causes
}

/// Classifies the exchange following a redirection.
fn resolution_of(turns: &[Turn], pos: usize, folded: &str) -> Resolution {
    let next_user = turns[pos + 1..]
        .iter()
        .find(|t| t.speaker == Speaker::User);
    let Some(next) = next_user else {
        return Resolution::Pending;
    };

    let next_folded = next.text.to_lowercase();
    let next_confidence = detection_confidence(&next.text);
    let is_redirection = next_confidence >= DEFAULT_DETECTION_THRESHOLD;

    if is_redirection {
        if token_overlap(folded, &next_folded) > REPEAT_OVERLAP {
            Resolution::Unresolved
        } else {
            Resolution::Regressed
        }
    } else if lexicon::POSITIVE_ACK.iter().any(|a| next_folded.contains(a)) {
        Resolution::Resolved
    } else {
        Resolution::Partial
    }
}

/// Jaccard-style token overlap between two folded texts.
#[allow(clippy::cast_precision_loss)]
fn token_overlap(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> HashSet<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(str::to_string)
            .collect()
    };
    let set_a = tokens(a);
    let set_b = tokens(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    shared as f64 / set_a.union(&set_b).count() as f64
}

/// Templated improvement suggestion for a (category, root cause) pair.
#[must_use]
pub fn suggestion_for(category: Category, cause: RootCause) -> String {
    let action = match cause {
        RootCause::InstructionAmbiguity => {
            "restate the request in your own words before acting on it"
        },
        RootCause::MissingContext => "ask for the missing background before proceeding",
        RootCause::Hallucination => "verify claims against stored knowledge before asserting them",
        RootCause::StaleKnowledge => "check recency of the knowledge used and re-validate it",
        RootCause::OverEagerAction => "confirm scope before taking actions beyond the request",
        RootCause::UnderSpecification => "prompt for the unspecified details up front",
    };
    format!("{}: {action}", category.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(texts: &[(Speaker, &str)]) -> Vec<Turn> {
        texts
            .iter()
            .enumerate()
            .map(|(i, (speaker, text))| Turn {
                turn_index: i + 1,
                speaker: *speaker,
                text: (*text).to_string(),
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_go_rust_fixture() {
        let turns = transcript(&[
            (Speaker::User, "Write X in Go"),
            (Speaker::Assistant, "Here is Rust code for X..."),
            (Speaker::User, "No, I said Go, not Rust"),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);

        assert_eq!(report.redirection_count, 1);
        let record = &report.records[0];
        assert_eq!(record.turn_index, 3);
        assert_eq!(record.category, Category::ComprehensionGap);
        assert_eq!(record.severity, Severity::Minor);
        assert!(
            record.root_causes.contains(&RootCause::InstructionAmbiguity)
                || record.root_causes.contains(&RootCause::Hallucination)
        );
        assert_eq!(record.resolution, Resolution::Pending);
        assert_eq!(record.state, RecordState::Reported);
    }

    #[test]
    fn test_first_user_turn_never_redirection() {
        let turns = transcript(&[
            (Speaker::User, "No, actually, let's start with the parser"),
            (Speaker::Assistant, "Sure."),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);
        assert_eq!(report.redirection_count, 0);
        assert_eq!(report.user_turns, 1);
    }

    #[test]
    fn test_low_confidence_discarded() {
        let turns = transcript(&[
            (Speaker::User, "Add a login page"),
            (Speaker::Assistant, "Done."),
            (Speaker::User, "Now style it, and don't forget the logo"),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);
        // "don't" alone (0.3) stays under the 0.4 threshold.
        assert_eq!(report.redirection_count, 0);
    }

    #[test]
    fn test_rate_computation() {
        let turns = transcript(&[
            (Speaker::User, "Do A"),
            (Speaker::Assistant, "Doing B."),
            (Speaker::User, "No, that's not what I asked, do A"),
            (Speaker::Assistant, "Doing A."),
            (Speaker::User, "thanks, looks good"),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);
        assert_eq!(report.redirection_count, 1);
        assert_eq!(report.user_turns, 3);
        assert!((report.rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_resolution_resolved_on_ack() {
        let turns = transcript(&[
            (Speaker::User, "Rename the module"),
            (Speaker::Assistant, "Renamed the crate."),
            (Speaker::User, "No, I said rename the module, not the crate"),
            (Speaker::Assistant, "Renamed the module."),
            (Speaker::User, "perfect, thanks"),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);
        assert_eq!(report.records[0].resolution, Resolution::Resolved);
    }

    #[test]
    fn test_resolution_unresolved_on_repeat() {
        let turns = transcript(&[
            (Speaker::User, "Rename the module"),
            (Speaker::Assistant, "Renamed the crate."),
            (Speaker::User, "No, rename the module, not the crate"),
            (Speaker::Assistant, "Renamed the crate again."),
            (Speaker::User, "Stop, I said rename the module, not the crate"),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);
        assert_eq!(report.records[0].resolution, Resolution::Unresolved);
        // The repeat also raises severity via the repetition factor.
        assert!(report.records[1].severity_score > report.records[0].severity_score);
    }

    #[test]
    fn test_escalation_raises_severity() {
        let calm = transcript(&[
            (Speaker::User, "Use tabs"),
            (Speaker::Assistant, "Used spaces."),
            (Speaker::User, "No, I said tabs"),
        ]);
        let heated = transcript(&[
            (Speaker::User, "Use tabs"),
            (Speaker::Assistant, "Used spaces."),
            (Speaker::User, "No! AGAIN you ignored me, I said TABS!"),
        ]);
        let analyzer = RedirectionAnalyzer::new();
        let calm_score = analyzer.analyze(&calm).records[0].severity_score;
        let heated_score = analyzer.analyze(&heated).records[0].severity_score;
        assert!(heated_score > calm_score);
    }

    #[test]
    fn test_tone_detection() {
        let turns = transcript(&[
            (Speaker::User, "Fix the test"),
            (Speaker::Assistant, "Changed the assertion."),
            (Speaker::User, "never mind, forget it, I'll do it myself"),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);
        assert_eq!(report.records[0].tone, Tone::Resignation);
    }

    #[test]
    fn test_factual_error_category_and_cause() {
        let turns = transcript(&[
            (Speaker::User, "What flag enables it?"),
            (Speaker::Assistant, "Use --turbo-mode."),
            (
                Speaker::User,
                "That's wrong, no such flag exists, you made that up",
            ),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);
        let record = &report.records[0];
        assert_eq!(record.category, Category::FactualError);
        assert!(record.root_causes.contains(&RootCause::Hallucination));
    }

    #[test]
    fn test_distributions_and_suggestions() {
        let turns = transcript(&[
            (Speaker::User, "Do A"),
            (Speaker::Assistant, "Doing B."),
            (Speaker::User, "No, that's not what I asked for"),
            (Speaker::Assistant, "Doing A."),
            (Speaker::User, "Stop, you misunderstood, I wanted A only"),
        ]);
        let report = RedirectionAnalyzer::new().analyze(&turns);
        assert_eq!(report.redirection_count, 2);
        assert_eq!(report.category_distribution["comprehension_gap"], 2);
        assert!(!report.suggestions.is_empty());
        let total: usize = report.severity_distribution.values().sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_empty_transcript() {
        let report = RedirectionAnalyzer::new().analyze(&[]);
        assert_eq!(report.redirection_count, 0);
        assert_eq!(report.user_turns, 0);
        assert!((report.rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_token_overlap() {
        assert!(token_overlap("rename the module now", "rename the module today") > 0.4);
        assert!(token_overlap("completely different words", "nothing shared here") < 0.1);
    }
}
