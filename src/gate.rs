//! Validation gate: the only entry point into the publish pipeline.
//!
//! A fixed, ordered sequence of independent rules runs against a candidate
//! document. Every rule always runs, so a failed report carries the full
//! list of violations and a caller can fix a bad candidate in one pass.
//! Warnings never block. The gate is stateless and side-effect free.

use std::sync::Arc;

use crate::config::Config;
use crate::models::{is_valid_slug, CandidateDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Blocking,
    Warning,
}

/// A single finding produced by one rule.
#[derive(Debug, Clone)]
pub struct RuleFinding {
    pub severity: Severity,
    pub message: String,
}

impl RuleFinding {
    pub fn blocking(message: impl Into<String>) -> RuleFinding {
        RuleFinding {
            severity: Severity::Blocking,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> RuleFinding {
        RuleFinding {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// A finding attributed to the rule that produced it.
#[derive(Debug, Clone)]
pub struct RuleViolation {
    pub rule: String,
    pub message: String,
}

/// Outcome of running every rule against one candidate.
#[derive(Debug, Clone)]
pub struct GateReport {
    pub passed: bool,
    pub blocking: Vec<RuleViolation>,
    pub warnings: Vec<RuleViolation>,
}

/// One independent validation check.
pub trait GateRule: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, candidate: &CandidateDocument) -> Vec<RuleFinding>;
}

#[derive(Clone)]
pub struct ValidationGate {
    rules: Vec<Arc<dyn GateRule>>,
}

impl ValidationGate {
    pub fn new() -> ValidationGate {
        ValidationGate { rules: Vec::new() }
    }

    /// Standard rule set, in the order findings should be reported:
    /// schema completeness, minimum size, structural markers, content
    /// policy.
    pub fn from_config(config: &Config) -> ValidationGate {
        ValidationGate::new()
            .with_rule(SchemaRule)
            .with_rule(MinSizeRule {
                min_words: config.validation.min_word_count,
            })
            .with_rule(StructureRule {
                markers: config.validation.required_markers.clone(),
            })
            .with_rule(ContentPolicyRule::new(&config.validation.banned_patterns))
    }

    pub fn with_rule(mut self, rule: impl GateRule + 'static) -> ValidationGate {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn validate(&self, candidate: &CandidateDocument) -> GateReport {
        let mut blocking = Vec::new();
        let mut warnings = Vec::new();
        for rule in &self.rules {
            for finding in rule.check(candidate) {
                let violation = RuleViolation {
                    rule: rule.name().to_string(),
                    message: finding.message,
                };
                match finding.severity {
                    Severity::Blocking => blocking.push(violation),
                    Severity::Warning => warnings.push(violation),
                }
            }
        }
        GateReport {
            passed: blocking.is_empty(),
            blocking,
            warnings,
        }
    }
}

impl Default for ValidationGate {
    fn default() -> Self {
        ValidationGate::new()
    }
}

/// Required fields are present and well-formed.
pub struct SchemaRule;

impl GateRule for SchemaRule {
    fn name(&self) -> &str {
        "schema"
    }

    fn check(&self, candidate: &CandidateDocument) -> Vec<RuleFinding> {
        let mut findings = Vec::new();
        if !is_valid_slug(&candidate.slug) {
            findings.push(RuleFinding::blocking(format!(
                "slug '{}' is not valid (lowercase [a-z0-9-], 1..=100 chars)",
                candidate.slug
            )));
        }
        if candidate.topic_key.trim().is_empty() {
            findings.push(RuleFinding::blocking("topic_key must not be empty"));
        }
        if candidate.title.trim().is_empty() {
            findings.push(RuleFinding::blocking("title must not be empty"));
        }
        if candidate.category.trim().is_empty() {
            findings.push(RuleFinding::blocking("category must not be empty"));
        }
        if candidate.body.trim().is_empty() {
            findings.push(RuleFinding::blocking("body must not be empty"));
        }
        if candidate
            .description
            .as_deref()
            .map(|d| d.trim().is_empty())
            .unwrap_or(true)
        {
            findings.push(RuleFinding::warning(
                "description is empty; listings will show no summary",
            ));
        }
        findings
    }
}

/// Body meets the minimum word count.
pub struct MinSizeRule {
    pub min_words: usize,
}

impl GateRule for MinSizeRule {
    fn name(&self) -> &str {
        "min_size"
    }

    fn check(&self, candidate: &CandidateDocument) -> Vec<RuleFinding> {
        let words = candidate.body.split_whitespace().count();
        if words < self.min_words {
            vec![RuleFinding::blocking(format!(
                "body has {} words, minimum is {}",
                words, self.min_words
            ))]
        } else {
            Vec::new()
        }
    }
}

/// Body contains every required structural marker.
pub struct StructureRule {
    pub markers: Vec<String>,
}

impl GateRule for StructureRule {
    fn name(&self) -> &str {
        "structure"
    }

    fn check(&self, candidate: &CandidateDocument) -> Vec<RuleFinding> {
        self.markers
            .iter()
            .filter(|marker| !candidate.body.contains(marker.as_str()))
            .map(|marker| {
                RuleFinding::blocking(format!("body is missing required marker '{}'", marker))
            })
            .collect()
    }
}

/// Body and title are free of banned patterns (case-insensitive).
pub struct ContentPolicyRule {
    patterns: Vec<String>,
}

impl ContentPolicyRule {
    pub fn new(patterns: &[String]) -> ContentPolicyRule {
        ContentPolicyRule {
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }
}

impl GateRule for ContentPolicyRule {
    fn name(&self) -> &str {
        "content_policy"
    }

    fn check(&self, candidate: &CandidateDocument) -> Vec<RuleFinding> {
        let haystack = format!(
            "{}\n{}",
            candidate.title.to_lowercase(),
            candidate.body.to_lowercase()
        );
        self.patterns
            .iter()
            .filter(|pattern| haystack.contains(pattern.as_str()))
            .map(|pattern| {
                RuleFinding::blocking(format!("content contains banned pattern '{}'", pattern))
            })
            .collect()
    }
}
