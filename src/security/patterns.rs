//! Built-in pattern library for the security gate.
//!
//! Patterns are grouped into three categories. Dangerous and injection
//! matches veto a command; suspicious matches are advisory and only logged.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternCategory {
    Dangerous,
    Suspicious,
    Injection,
}

impl PatternCategory {
    /// Injection patterns are matched case-insensitively, the others are not.
    pub fn case_insensitive(&self) -> bool {
        matches!(self, PatternCategory::Injection)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::Dangerous => "dangerous",
            PatternCategory::Suspicious => "suspicious",
            PatternCategory::Injection => "injection",
        }
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uncompiled pattern definition
#[derive(Debug, Clone, Copy)]
pub struct PatternDef {
    pub category: PatternCategory,
    pub pattern: &'static str,
    pub message: &'static str,
}

impl PatternDef {
    pub const fn new(category: PatternCategory, pattern: &'static str, message: &'static str) -> Self {
        Self {
            category,
            pattern,
            message,
        }
    }
}

use PatternCategory::{Dangerous, Injection, Suspicious};

pub const BUILTIN_PATTERNS: &[PatternDef] = &[
    // Filesystem destruction
    PatternDef::new(Dangerous, r"rm\s+-r[f]*\s+/", "Recursive delete from the filesystem root"),
    PatternDef::new(Dangerous, r"rm\s+-[rf]*r[f]*\s+/", "Recursive delete from the filesystem root"),
    PatternDef::new(
        Dangerous,
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;:\s*",
        "Fork bomb",
    ),
    PatternDef::new(Dangerous, r"cat\s+/dev/random", "Random data flood"),
    PatternDef::new(Dangerous, r"dd\s+if=/dev/zero", "Disk fill"),
    PatternDef::new(Dangerous, r">\s*/dev/sd[a-z][0-9]*", "Direct write to a disk device"),
    PatternDef::new(Dangerous, r"mkfs\.", "Filesystem formatting"),
    PatternDef::new(Dangerous, r"fdisk\s+/dev/", "Disk partitioning"),
    // Remote code execution
    PatternDef::new(Dangerous, r"curl.*\|\s*(sh|bash|zsh|fish)", "Download piped into a shell"),
    PatternDef::new(Dangerous, r"wget.*\|\s*(sh|bash|zsh|fish)", "Download piped into a shell"),
    PatternDef::new(Dangerous, r#"eval\s+["']?\$\("#, "Command injection via eval"),
    // Permissions
    PatternDef::new(Dangerous, r"sudo\s+chmod\s+777", "World-writable permissions with sudo"),
    PatternDef::new(Dangerous, r"chmod\s+777\s+/", "World-writable permissions on the root"),
    // Advisory only
    PatternDef::new(Suspicious, r"sudo\s+rm", "Elevated deletion"),
    PatternDef::new(Suspicious, r"sudo\s+dd", "Elevated disk tool"),
    PatternDef::new(Suspicious, r"sudo\s+mount", "Elevated mount"),
    PatternDef::new(Suspicious, r"nc\s+.*-[le]", "Netcat listener"),
    PatternDef::new(Suspicious, r"python.*-c.*exec", "Python one-liner executing code"),
    PatternDef::new(Suspicious, r"perl.*-e", "Perl one-liner"),
    PatternDef::new(Suspicious, r"ruby.*-e", "Ruby one-liner"),
    PatternDef::new(Suspicious, r"node.*-e", "Node one-liner"),
    // Metacharacter chaining
    PatternDef::new(Injection, r";\s*rm\s+", "Deletion chained with ';'"),
    PatternDef::new(Injection, r"&&\s*rm\s+", "Deletion chained with '&&'"),
    PatternDef::new(Injection, r"\|\s*rm\s+", "Deletion fed from a pipe"),
    PatternDef::new(Injection, r"`.*rm.*`", "Deletion inside backtick substitution"),
    PatternDef::new(Injection, r"\$\(.*rm.*\)", "Deletion inside command substitution"),
    PatternDef::new(Injection, r">\s*/etc/passwd", "Redirection into /etc/passwd"),
    PatternDef::new(Injection, r">\s*/etc/shadow", "Redirection into /etc/shadow"),
    PatternDef::new(Injection, r"<\s*/dev/tcp/", "Raw network socket via /dev/tcp"),
];

/// A compiled pattern with its category and explanation
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub regex: Regex,
    pub category: PatternCategory,
    pub message: String,
}

impl PatternRule {
    pub fn compile(
        category: PatternCategory,
        pattern: &str,
        message: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(category.case_insensitive())
            .build()?;

        Ok(Self {
            regex,
            category,
            message: message.into(),
        })
    }

    /// The source pattern, as written in the definition
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

static BUILTIN_LIBRARY: Lazy<PatternLibrary> =
    Lazy::new(|| PatternLibrary::from_definitions(BUILTIN_PATTERNS));

/// Ordered collection of compiled patterns
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    rules: Vec<PatternRule>,
}

impl PatternLibrary {
    /// The built-in library, compiled once per process
    pub fn builtin() -> &'static PatternLibrary {
        &BUILTIN_LIBRARY
    }

    /// Compile a set of definitions, skipping any that fail to compile
    pub fn from_definitions(defs: &[PatternDef]) -> Self {
        let rules = defs
            .iter()
            .filter_map(|def| {
                PatternRule::compile(def.category, def.pattern, def.message)
                    .map_err(|e| {
                        tracing::warn!(pattern = def.pattern, error = %e, "skipping invalid security pattern");
                    })
                    .ok()
            })
            .collect();

        Self { rules }
    }

    /// First rule of the category matching the text, in definition order
    pub fn first_match(&self, category: PatternCategory, text: &str) -> Option<&PatternRule> {
        self.rules_in(category).find(|rule| rule.is_match(text))
    }

    /// All rules of the category matching the text
    pub fn matches<'a>(&'a self, category: PatternCategory, text: &'a str) -> impl Iterator<Item = &'a PatternRule> + 'a {
        self.rules_in(category).filter(move |rule| rule.is_match(text))
    }

    pub fn rules_in(&self, category: PatternCategory) -> impl Iterator<Item = &PatternRule> {
        self.rules.iter().filter(move |rule| rule.category == category)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
