//! Deterministic symbol-aware reranking.
//!
//! Rules are an ordered list of `(predicate, multiplier, reason)` entries.
//! Each candidate starts at its raw vector similarity; every rule that fires
//! multiplies the score (boosts compound). All term comparisons are
//! case-insensitive.

use scry_core::{ChunkKind, Keywords, PointPayload};

/// Primary terms that indicate the user is looking for UI code.
const UI_TERMS: &[&str] = &["toast", "modal", "dialog", "button", "form", "component"];

/// Symbols so generic they match almost any query about data handling.
const GENERIC_UTILITIES: &[&str] = &["format", "parse", "validate", "convert"];

/// Lowercased view of the query keywords, empty terms removed.
#[derive(Debug, Clone, Default)]
pub struct QueryTerms {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub actions: Vec<String>,
    pub code_patterns: Vec<String>,
}

impl QueryTerms {
    pub fn new(keywords: &Keywords) -> Self {
        let lower = |terms: &[String]| -> Vec<String> {
            terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        };
        Self {
            primary: lower(&keywords.primary),
            secondary: lower(&keywords.secondary),
            actions: lower(&keywords.actions),
            code_patterns: lower(&keywords.code_patterns),
        }
    }
}

/// The candidate fields rules look at, lowercased once.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub symbol: String,
    pub path: String,
    pub kind: ChunkKind,
    /// Symbol split at case, `.`, `_`, and `-` boundaries, lowercased.
    pub parts: Vec<String>,
    pub payload: &'a PointPayload,
}

impl<'a> Candidate<'a> {
    pub fn new(payload: &'a PointPayload) -> Self {
        Self {
            symbol: payload.symbol.to_lowercase(),
            path: payload.file_path.to_lowercase(),
            kind: payload.kind,
            parts: split_symbol(&payload.symbol),
            payload,
        }
    }
}

/// Outcome of evaluating one rule: how many times to apply its multiplier.
type Predicate = fn(&QueryTerms, &Candidate<'_>, &[&'static str]) -> u32;

/// How a rule's multiplier scales with the predicate's count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scaling {
    /// Multiply by `factor` once per match.
    PerMatch,
    /// Multiply by `factor × count` once.
    Linear,
}

/// One rerank rule.
#[derive(Clone, Copy)]
pub struct Rule {
    pub reason: &'static str,
    pub factor: f64,
    pub scaling: Scaling,
    predicate: Predicate,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("reason", &self.reason)
            .field("factor", &self.factor)
            .field("scaling", &self.scaling)
            .finish()
    }
}

impl Rule {
    /// Evaluate against a candidate, given reasons that already fired.
    /// Returns the multiplier to apply, or `None` if the rule did not fire.
    pub fn evaluate(
        &self,
        terms: &QueryTerms,
        candidate: &Candidate<'_>,
        fired: &[&'static str],
    ) -> Option<f64> {
        let count = (self.predicate)(terms, candidate, fired);
        if count == 0 {
            return None;
        }
        Some(match self.scaling {
            Scaling::PerMatch => (0..count).fold(1.0, |m, _| m * self.factor),
            Scaling::Linear => self.factor * count as f64,
        })
    }
}

pub const CODE_PATTERN_EXACT: &str = "symbol equals code pattern";
pub const CODE_PATTERN_SUBSTRING: &str = "symbol contains code pattern";
pub const PRIMARY_IN_SYMBOL: &str = "symbol contains primary term";
pub const PRIMARY_PARTS: &str = "symbol parts match primary terms";
pub const SECONDARY_IN_SYMBOL: &str = "symbol contains secondary term";
pub const ACTION_IN_SYMBOL: &str = "symbol contains action";
pub const TERM_IN_PATH: &str = "path contains query term";
pub const UI_CONTEXT: &str = "UI query matches UI code";
pub const GENERIC_UTILITY: &str = "generic utility penalty";

fn code_pattern_exact(terms: &QueryTerms, c: &Candidate<'_>, _: &[&'static str]) -> u32 {
    terms.code_patterns.iter().any(|p| c.symbol == *p) as u32
}

fn code_pattern_substring(terms: &QueryTerms, c: &Candidate<'_>, fired: &[&'static str]) -> u32 {
    if fired.contains(&CODE_PATTERN_EXACT) {
        return 0;
    }
    terms
        .code_patterns
        .iter()
        .any(|p| c.symbol.contains(p.as_str())) as u32
}

fn primary_in_symbol(terms: &QueryTerms, c: &Candidate<'_>, _: &[&'static str]) -> u32 {
    terms.primary.iter().any(|t| c.symbol.contains(t.as_str())) as u32
}

fn primary_parts(terms: &QueryTerms, c: &Candidate<'_>, _: &[&'static str]) -> u32 {
    c.parts
        .iter()
        .filter(|part| {
            terms
                .primary
                .iter()
                .any(|t| part.contains(t.as_str()) || t.contains(part.as_str()))
        })
        .count() as u32
}

fn secondary_in_symbol(terms: &QueryTerms, c: &Candidate<'_>, _: &[&'static str]) -> u32 {
    terms
        .secondary
        .iter()
        .filter(|t| c.symbol.contains(t.as_str()))
        .count() as u32
}

fn action_in_symbol(terms: &QueryTerms, c: &Candidate<'_>, _: &[&'static str]) -> u32 {
    terms
        .actions
        .iter()
        .filter(|t| c.symbol.contains(t.as_str()))
        .count() as u32
}

fn term_in_path(terms: &QueryTerms, c: &Candidate<'_>, _: &[&'static str]) -> u32 {
    terms
        .primary
        .iter()
        .chain(terms.secondary.iter())
        .filter(|t| c.path.contains(t.as_str()))
        .count() as u32
}

fn ui_context(terms: &QueryTerms, c: &Candidate<'_>, _: &[&'static str]) -> u32 {
    let ui_query = terms.primary.iter().any(|t| UI_TERMS.contains(&t.as_str()));
    let ui_code = matches!(c.kind, ChunkKind::Component | ChunkKind::ClassMethod)
        || c.path.contains("component");
    (ui_query && ui_code) as u32
}

fn generic_utility(_: &QueryTerms, c: &Candidate<'_>, fired: &[&'static str]) -> u32 {
    (fired.is_empty() && GENERIC_UTILITIES.contains(&c.symbol.as_str())) as u32
}

/// The rules, in evaluation order.
pub const RULES: &[Rule] = &[
    Rule {
        reason: CODE_PATTERN_EXACT,
        factor: 3.0,
        scaling: Scaling::PerMatch,
        predicate: code_pattern_exact,
    },
    Rule {
        reason: CODE_PATTERN_SUBSTRING,
        factor: 2.5,
        scaling: Scaling::PerMatch,
        predicate: code_pattern_substring,
    },
    Rule {
        reason: PRIMARY_IN_SYMBOL,
        factor: 2.0,
        scaling: Scaling::PerMatch,
        predicate: primary_in_symbol,
    },
    Rule {
        reason: PRIMARY_PARTS,
        factor: 1.5,
        scaling: Scaling::Linear,
        predicate: primary_parts,
    },
    Rule {
        reason: SECONDARY_IN_SYMBOL,
        factor: 1.3,
        scaling: Scaling::PerMatch,
        predicate: secondary_in_symbol,
    },
    Rule {
        reason: ACTION_IN_SYMBOL,
        factor: 1.4,
        scaling: Scaling::PerMatch,
        predicate: action_in_symbol,
    },
    Rule {
        reason: TERM_IN_PATH,
        factor: 1.2,
        scaling: Scaling::PerMatch,
        predicate: term_in_path,
    },
    Rule {
        reason: UI_CONTEXT,
        factor: 1.3,
        scaling: Scaling::PerMatch,
        predicate: ui_context,
    },
    Rule {
        reason: GENERIC_UTILITY,
        factor: 0.5,
        scaling: Scaling::PerMatch,
        predicate: generic_utility,
    },
];

/// Boosted score and the reasons that fired, in rule order.
#[derive(Debug, Clone, PartialEq)]
pub struct Reranked {
    pub score: f64,
    pub reasons: Vec<String>,
}

/// Apply [`RULES`] to one candidate.
///
/// # Examples
///
/// ```
/// use scry_core::{ChunkKind, Keywords, LineRange, PointPayload};
/// use scry_engine::rerank::{rerank, QueryTerms};
///
/// let payload = PointPayload {
///     project_name: "shop".into(),
///     symbol: "showToast".into(),
///     kind: ChunkKind::Function,
///     file_path: "ui/toast.ts".into(),
///     line_range: LineRange::new(1, 3),
///     calls: vec![],
///     content: String::new(),
/// };
/// let terms = QueryTerms::new(&Keywords {
///     code_patterns: vec!["showToast".into()],
///     ..Keywords::default()
/// });
/// let result = rerank(0.5, &payload, &terms);
/// assert_eq!(result.score, 1.5);
/// assert_eq!(result.reasons, vec!["symbol equals code pattern ×3"]);
/// ```
pub fn rerank(raw_score: f64, payload: &PointPayload, terms: &QueryTerms) -> Reranked {
    let candidate = Candidate::new(payload);
    let mut score = raw_score;
    let mut fired: Vec<&'static str> = Vec::new();
    let mut reasons = Vec::new();

    for rule in RULES {
        if let Some(multiplier) = rule.evaluate(terms, &candidate, &fired) {
            score *= multiplier;
            fired.push(rule.reason);
            reasons.push(format!("{} ×{}", rule.reason, trim_float(multiplier)));
        }
    }

    Reranked { score, reasons }
}

fn trim_float(value: f64) -> String {
    let s = format!("{value:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Split an identifier at camelCase/PascalCase humps, acronym boundaries,
/// digits-to-letters, and `.`, `_`, `-`, returning lowercased parts.
///
/// # Examples
///
/// ```
/// use scry_engine::rerank::split_symbol;
///
/// assert_eq!(split_symbol("ToastManager.showToast"), vec!["toast", "manager", "show", "toast"]);
/// assert_eq!(split_symbol("parseHTTPResponse"), vec!["parse", "http", "response"]);
/// assert_eq!(split_symbol("format_date-v2"), vec!["format", "date", "v2"]);
/// ```
pub fn split_symbol(symbol: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for segment in symbol.split(['.', '_', '-']) {
        let chars: Vec<char> = segment.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0 && c.is_uppercase() && {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
            };
            if boundary && !current.is_empty() {
                parts.push(std::mem::take(&mut current).to_lowercase());
            }
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current.to_lowercase());
        }
    }
    parts
}
