use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;

/// A named, compiled detection rule
#[derive(Debug, Clone)]
pub struct ThreatPattern {
    pub name: &'static str,
    regex: Regex,
}

impl ThreatPattern {
    /// Compile a pattern; invalid regex is a configuration error
    pub fn new(name: &'static str, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| anyhow!("Invalid threat pattern '{}': {}", name, e))?;
        Ok(Self { name, regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Built-in pattern sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSet {
    /// Markup and script injection
    Xss,
    /// Quote/terminator sequences and destructive statement keywords
    SqlInjection,
    /// Second-pass payloads that survive the basic checks
    Dangerous,
}

impl PatternSet {
    pub fn patterns(self) -> &'static [ThreatPattern] {
        match self {
            PatternSet::Xss => XSS_PATTERNS.as_slice(),
            PatternSet::SqlInjection => SQL_INJECTION_PATTERNS.as_slice(),
            PatternSet::Dangerous => DANGEROUS_PATTERNS.as_slice(),
        }
    }
}

// (name, regex) tables. Tags match on the opening element alone so an
// unterminated `<script>` is still caught.
const XSS_RULES: &[(&str, &str)] = &[
    ("script_tag", r"(?i)<\s*script\b"),
    ("iframe_tag", r"(?i)<\s*iframe\b"),
    ("object_tag", r"(?i)<\s*object\b"),
    ("embed_tag", r"(?i)<\s*embed\b"),
    ("event_handler", r"(?i)\bon[a-z]+\s*="),
    ("javascript_uri", r"(?i)javascript\s*:"),
    ("vbscript_uri", r"(?i)vbscript\s*:"),
    ("html_data_uri", r"(?i)data:text/html"),
];

const SQL_INJECTION_RULES: &[(&str, &str)] = &[
    ("quote_or_terminator", r"'|\\'|;|;--"),
    ("union_select", r"(?i)union\s+select"),
    ("insert_into", r"(?i)insert\s+into"),
    ("delete_from", r"(?i)delete\s+from"),
    ("update_set", r"(?i)update\s+set"),
    ("drop_table", r"(?i)drop\s+table"),
    ("alter_table", r"(?i)alter\s+table"),
];

const DANGEROUS_RULES: &[(&str, &str)] = &[
    ("base64_html_data_uri", r"(?i)data:text/html;base64"),
    ("svg_onload", r"(?i)<\s*svg[^>]*\bonload\b"),
    ("css_expression", r"(?i)expression\s*\("),
    ("css_import", r"(?i)@import"),
    ("application_data_uri", r"(?i)data:application/"),
];

fn compile(rules: &[(&'static str, &str)]) -> Vec<ThreatPattern> {
    rules
        .iter()
        .filter_map(|&(name, pattern)| match ThreatPattern::new(name, pattern) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::error!("Skipping built-in threat pattern: {}", e);
                None
            }
        })
        .collect()
}

lazy_static! {
    static ref XSS_PATTERNS: Vec<ThreatPattern> = compile(XSS_RULES);
    static ref SQL_INJECTION_PATTERNS: Vec<ThreatPattern> = compile(SQL_INJECTION_RULES);
    static ref DANGEROUS_PATTERNS: Vec<ThreatPattern> = compile(DANGEROUS_RULES);
}

/// Whether any pattern of `set` matches `text`
pub fn matches(text: &str, set: PatternSet) -> bool {
    matches_any(text, set.patterns())
}

/// First pattern of `set` that matches `text`, for attribution in logs
pub fn first_match(text: &str, set: PatternSet) -> Option<&'static ThreatPattern> {
    set.patterns().iter().find(|pattern| pattern.is_match(text))
}

/// Evaluate an arbitrary pattern list in order
pub fn matches_any(text: &str, patterns: &[ThreatPattern]) -> bool {
    patterns.iter().any(|pattern| pattern.is_match(text))
}
