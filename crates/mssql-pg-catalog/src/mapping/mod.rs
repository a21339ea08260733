//! Function and expression mapping from T-SQL to PostgreSQL.
//!
//! [`FunctionMappingState`] decides, per expression, whether a known set of
//! rewrite rules fully covers the functions it calls. The decision is a value
//! ([`MappingOutcome`]); nothing in here fails the surrounding migration.
//!
//! Decision order:
//! 1. an empty expression has nothing to map (`no_mapping_model`)
//! 2. no rule matches and no call site needs translation: pass through (`mapped`)
//! 3. no rule matches but unknown functions are called (`no_mapping_model`)
//! 4. rules disagree about a pattern or overlap (`manual_review_required`)
//! 5. some call sites are covered and some are not (`manual_review_required`)
//! 6. a matched rule is below the confidence threshold (`manual_review_required`)
//! 7. otherwise substitute, rewrite bracket identifiers and run the safety
//!    checks; a failure there is `mapping_error` and the expression is left as is

mod rules;
mod safety;
mod scan;

pub use rules::FunctionMappingRule;
pub use safety::check_expression_safety;

use crate::config::MappingSettings;
use scan::{call_sites, find_pattern, literal_spans, rewrite_bracket_identifiers};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::Range;

/// Words that can precede `(` without being a function call.
const NON_CALL_WORDS: &[&str] = &[
    "in", "and", "or", "not", "exists", "when", "then", "else", "case", "as", "is", "null",
    "like", "between", "values", "any", "all", "some", "over", "on", "select", "where", "from",
    "end", "distinct", "interval", "zone", "at", "char", "nchar", "varchar", "nvarchar",
    "decimal", "numeric", "binary", "varbinary", "float", "datetime2", "datetimeoffset", "time",
    "character", "varying", "timestamp",
];

/// Functions that exist with the same name and meaning in both dialects.
const PORTABLE_FUNCTIONS: &[&str] = &[
    "abs", "ceiling", "floor", "round", "sign", "sqrt", "power", "exp", "upper", "lower", "ltrim",
    "rtrim", "trim", "replace", "substring", "coalesce", "nullif", "cast", "sum", "min", "max",
    "avg", "count", "left", "right", "reverse", "concat", "ascii",
];

/// Mapping state of one translated expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    #[default]
    Pending,
    Mapped,
    ManualReviewRequired,
    MappingError,
    NoMappingModel,
}

impl MappingStatus {
    /// Convert to the catalog's string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Pending => "pending",
            MappingStatus::Mapped => "mapped",
            MappingStatus::ManualReviewRequired => "manual_review_required",
            MappingStatus::MappingError => "mapping_error",
            MappingStatus::NoMappingModel => "no_mapping_model",
        }
    }

    /// Parse the catalog's string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(MappingStatus::Pending),
            "mapped" => Some(MappingStatus::Mapped),
            "manual_review_required" => Some(MappingStatus::ManualReviewRequired),
            "mapping_error" => Some(MappingStatus::MappingError),
            "no_mapping_model" => Some(MappingStatus::NoMappingModel),
            _ => None,
        }
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of analysing one source expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingOutcome {
    pub status: MappingStatus,
    /// Lowest confidence of the applied rules; 0 when nothing was applied.
    pub confidence: u8,
    pub notes: String,
    /// The least confident rule that was applied.
    pub rule: Option<FunctionMappingRule>,
    /// Target-dialect expression, set only when `status` is `mapped`.
    pub target_expression: Option<String>,
}

impl MappingOutcome {
    /// Outcome of an expression that has not been analysed yet.
    pub fn pending() -> Self {
        Self::flagged(MappingStatus::Pending, String::new())
    }

    fn flagged(status: MappingStatus, notes: String) -> Self {
        Self {
            status,
            confidence: 0,
            notes,
            rule: None,
            target_expression: None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.status == MappingStatus::Mapped && self.target_expression.is_some()
    }
}

impl Default for MappingOutcome {
    fn default() -> Self {
        Self::pending()
    }
}

/// One rule occurrence in an expression.
struct RuleHit<'a> {
    range: Range<usize>,
    rule: &'a FunctionMappingRule,
}

/// Rule set plus confidence threshold used to translate expressions.
#[derive(Debug, Clone)]
pub struct FunctionMappingState {
    rules: Vec<FunctionMappingRule>,
    min_confidence: u8,
    /// Target-side function names produced by trusted rules.
    produced_functions: HashSet<String>,
}

impl FunctionMappingState {
    pub fn new(rules: Vec<FunctionMappingRule>, min_confidence: u8) -> Self {
        let min_confidence = min_confidence.min(100);
        let produced_functions = rules
            .iter()
            .filter(|r| r.confidence >= min_confidence)
            .flat_map(|r| call_sites(&r.target_pattern))
            .map(|c| c.name)
            .collect();

        Self {
            rules,
            min_confidence,
            produced_functions,
        }
    }

    /// State with only the built-in rules.
    pub fn builtin(min_confidence: u8) -> Self {
        Self::new(FunctionMappingRule::builtin(), min_confidence)
    }

    /// Merge catalog rules with the built-ins according to `settings`.
    ///
    /// A catalog rule replaces a built-in rule with the same source pattern.
    pub fn from_settings(catalog_rules: Vec<FunctionMappingRule>, settings: &MappingSettings) -> Self {
        let mut rules = catalog_rules;
        if settings.use_builtin_rules {
            let overridden: HashSet<String> = rules
                .iter()
                .map(|r| r.source_pattern.to_lowercase())
                .collect();
            rules.extend(
                FunctionMappingRule::builtin()
                    .into_iter()
                    .filter(|r| !overridden.contains(&r.source_pattern.to_lowercase())),
            );
        }
        Self::new(rules, settings.min_confidence)
    }

    pub fn rules(&self) -> &[FunctionMappingRule] {
        &self.rules
    }

    pub fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    /// Analyse a source expression and, when every call site is covered by a
    /// trusted rule, produce its target-dialect form.
    pub fn analyze(&self, expression: &str) -> MappingOutcome {
        let expr = expression.trim();
        if expr.is_empty() {
            return MappingOutcome::flagged(
                MappingStatus::NoMappingModel,
                "empty expression".to_string(),
            );
        }

        let spans = literal_spans(expr);
        let mut hits: Vec<RuleHit<'_>> = self
            .rules
            .iter()
            .flat_map(|rule| {
                find_pattern(expr, &rule.source_pattern, &spans)
                    .into_iter()
                    .map(move |range| RuleHit { range, rule })
            })
            .collect();
        hits.sort_by_key(|h| (h.range.start, h.range.end));
        hits.dedup_by(|b, a| {
            a.range == b.range && a.rule.target_pattern == b.rule.target_pattern
        });

        let covered: HashSet<String> = hits
            .iter()
            .filter_map(|h| covered_function(&h.rule.source_pattern))
            .collect();
        let unknown: BTreeSet<String> = call_sites(expr)
            .into_iter()
            .filter(|c| !covered.contains(&c.name))
            .filter(|c| c.qualified || !self.is_known_function(&c.name))
            .map(|c| c.name)
            .collect();

        if hits.is_empty() {
            if unknown.is_empty() {
                return self.finish(expr.to_string(), None, 100, "no translation required".to_string());
            }
            return MappingOutcome::flagged(
                MappingStatus::NoMappingModel,
                format!("no mapping rule for: {}", join(&unknown)),
            );
        }

        if let Some(conflict) = find_conflict(&hits) {
            return MappingOutcome::flagged(MappingStatus::ManualReviewRequired, conflict);
        }

        if !unknown.is_empty() {
            return MappingOutcome::flagged(
                MappingStatus::ManualReviewRequired,
                format!("partially covered; no mapping rule for: {}", join(&unknown)),
            );
        }

        let weakest = hits
            .iter()
            .map(|h| h.rule)
            .min_by_key(|r| r.confidence)
            .cloned();
        let Some(weakest) = weakest else {
            return MappingOutcome::pending();
        };

        if weakest.confidence < self.min_confidence {
            let mut notes = format!(
                "rule '{}' has confidence {} below threshold {}",
                weakest.source_pattern, weakest.confidence, self.min_confidence
            );
            if let Some(rule_notes) = &weakest.notes {
                notes.push_str(": ");
                notes.push_str(rule_notes);
            }
            let mut outcome = MappingOutcome::flagged(MappingStatus::ManualReviewRequired, notes);
            outcome.confidence = weakest.confidence;
            outcome.rule = Some(weakest);
            return outcome;
        }

        let mut rewritten = expr.to_string();
        for hit in hits.iter().rev() {
            rewritten.replace_range(hit.range.clone(), &hit.rule.target_pattern);
        }

        let applied: BTreeSet<String> = hits.iter().map(|h| h.rule.source_pattern.clone()).collect();
        let confidence = weakest.confidence;
        self.finish(
            rewritten,
            Some(weakest),
            confidence,
            format!("applied: {}", join(&applied)),
        )
    }

    fn finish(
        &self,
        rewritten: String,
        rule: Option<FunctionMappingRule>,
        confidence: u8,
        notes: String,
    ) -> MappingOutcome {
        let target = rewrite_bracket_identifiers(&rewritten);
        match check_expression_safety(&target) {
            Ok(()) => MappingOutcome {
                status: MappingStatus::Mapped,
                confidence,
                notes,
                rule,
                target_expression: Some(target),
            },
            Err(e) => {
                let mut outcome = MappingOutcome::flagged(MappingStatus::MappingError, e.to_string());
                outcome.rule = rule;
                outcome
            }
        }
    }

    fn is_known_function(&self, name: &str) -> bool {
        NON_CALL_WORDS.contains(&name)
            || PORTABLE_FUNCTIONS.contains(&name)
            || self.produced_functions.contains(name)
    }
}

/// Function name a rule pattern covers, without schema or arguments.
fn covered_function(pattern: &str) -> Option<String> {
    let (name, _) = pattern.split_once('(')?;
    let name = name.trim();
    let name = name.rsplit('.').next().unwrap_or(name);
    let name = name.trim_matches(|c| c == '[' || c == ']');
    if name.is_empty() {
        None
    } else {
        Some(name.to_lowercase())
    }
}

/// Report rules that disagree on one pattern or whose matches overlap.
fn find_conflict(hits: &[RuleHit<'_>]) -> Option<String> {
    let mut targets: HashMap<String, &str> = HashMap::new();
    for hit in hits {
        let pattern = hit.rule.source_pattern.to_lowercase();
        match targets.get(&pattern) {
            Some(existing) if *existing != hit.rule.target_pattern => {
                return Some(format!(
                    "conflicting rules for '{}': '{}' vs '{}'",
                    hit.rule.source_pattern, existing, hit.rule.target_pattern
                ));
            }
            _ => {
                targets.insert(pattern, &hit.rule.target_pattern);
            }
        }
    }

    hits.windows(2).find_map(|pair| {
        if pair[1].range.start < pair[0].range.end {
            Some(format!(
                "overlapping rules '{}' and '{}'",
                pair[0].rule.source_pattern, pair[1].rule.source_pattern
            ))
        } else {
            None
        }
    })
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().cloned().collect::<Vec<_>>().join(", ")
}
