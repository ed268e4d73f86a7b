use crate::security::SanitizedCommand;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

const DEFAULT_REWRITE_REASON: &str = "Rule-based replacement";
const DEFAULT_BLOCK_REASON: &str = "Rule-based blocking";

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("Failed to read rules file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse rules file: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// One `[[rule]]` entry as written in the rules file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RuleDefinition {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub replace: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RuleDefinition {
    pub fn replace(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: Some(pattern.to_string()),
            replace: Some(replacement.to_string()),
            ..Self::default()
        }
    }

    pub fn block(pattern: &str, message: &str) -> Self {
        Self {
            pattern: Some(pattern.to_string()),
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

/// The rules file: an ordered array of `[[rule]]` tables
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleFile {
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleEffect {
    /// Replacement template, already in `regex` expansion syntax
    Replace(String),
    Block(String),
}

#[derive(Debug, Clone)]
pub struct RewriteRule {
    regex: Regex,
    effect: RuleEffect,
    reason: Option<String>,
}

impl RewriteRule {
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn effect(&self) -> &RuleEffect {
        &self.effect
    }

    fn compile(def: &RuleDefinition) -> Option<Self> {
        let pattern = match def.pattern.as_deref() {
            Some(p) if !p.is_empty() => p,
            _ => {
                tracing::warn!("skipping rule without a pattern");
                return None;
            }
        };

        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid regex pattern in rule, skipping");
                return None;
            }
        };

        // A rule carrying both effects rewrites; one carrying neither can never decide
        let effect = match (&def.replace, &def.error) {
            (Some(template), _) => RuleEffect::Replace(translate_template(template)),
            (None, Some(message)) => RuleEffect::Block(message.clone()),
            (None, None) => {
                tracing::warn!(pattern, "rule has neither replace nor error, skipping");
                return None;
            }
        };

        Some(Self {
            regex,
            effect,
            reason: def.reason.clone(),
        })
    }
}

/// Result of evaluating the rule list against a command
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    NoMatch,
    Rewrite {
        command: String,
        reason: String,
        pattern: String,
    },
    Block {
        message: String,
        reason: String,
        pattern: String,
    },
}

/// Ordered, first-match-wins rewrite/block table
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<RewriteRule>,
}

impl RuleEngine {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile definitions in order, dropping any that cannot be used
    pub fn from_definitions(defs: &[RuleDefinition]) -> Self {
        let rules = defs.iter().filter_map(RewriteRule::compile).collect();
        Self { rules }
    }

    pub fn from_toml(contents: &str) -> Result<Self, RuleLoadError> {
        let file: RuleFile = toml::from_str(contents)?;
        Ok(Self::from_definitions(&file.rules))
    }

    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let contents = fs::read_to_string(path)?;
        let engine = Self::from_toml(&contents)?;
        tracing::info!(count = engine.len(), path = %path.display(), "loaded rules");
        Ok(engine)
    }

    /// Load rules, degrading to an empty table when the file is missing or broken
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::empty();
        };

        if !path.exists() {
            tracing::warn!(path = %path.display(), "rules file not found");
            return Self::empty();
        }

        Self::load(path).unwrap_or_else(|e| {
            tracing::error!(path = %path.display(), error = %e, "failed to load rules");
            Self::empty()
        })
    }

    /// Evaluate rules in stored order; the first matching rule decides
    pub fn apply(&self, command: &SanitizedCommand) -> RuleOutcome {
        let command = command.as_str();

        for rule in &self.rules {
            if !rule.regex.is_match(command) {
                continue;
            }

            tracing::info!(pattern = rule.pattern(), "rule matched");

            return match &rule.effect {
                RuleEffect::Replace(template) => RuleOutcome::Rewrite {
                    command: rule.regex.replace_all(command, template.as_str()).into_owned(),
                    reason: rule
                        .reason
                        .clone()
                        .unwrap_or_else(|| DEFAULT_REWRITE_REASON.to_string()),
                    pattern: rule.pattern().to_string(),
                },
                RuleEffect::Block(message) => RuleOutcome::Block {
                    message: message.clone(),
                    reason: rule
                        .reason
                        .clone()
                        .unwrap_or_else(|| DEFAULT_BLOCK_REASON.to_string()),
                    pattern: rule.pattern().to_string(),
                },
            };
        }

        RuleOutcome::NoMatch
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Translate a rules-file replacement template into `regex` expansion syntax.
///
/// Templates use backslash group references (`\1`, `\g<1>`, `\g<name>`) and
/// treat `$` literally, so shell variables such as `$HOME` survive a rewrite.
/// The character escapes `\a \b \f \n \r \t \v` and `\\` become the
/// characters they name; any other backslash is kept as written.
pub fn translate_template(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(|d| d.is_ascii_digit()) {
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{}}}", group));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|c| *c != '>').collect();
                        out.push_str(&format!("${{{}}}", name));
                    } else {
                        out.push_str("\\g");
                    }
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                Some(e) if control_escape(e).is_some() => {
                    chars.next();
                    out.extend(control_escape(e));
                }
                _ => out.push('\\'),
            },
            _ => out.push(c),
        }
    }

    out
}

fn control_escape(c: char) -> Option<char> {
    match c {
        'a' => Some('\x07'),
        'b' => Some('\x08'),
        'f' => Some('\x0C'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\x0B'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::sanitize;
    use tempfile::TempDir;

    fn apply(engine: &RuleEngine, cmd: &str) -> RuleOutcome {
        engine.apply(&sanitize(cmd))
    }

    #[test]
    fn test_replace_rule() {
        let engine = RuleEngine::from_definitions(&[RuleDefinition::replace("foo", "bar")]);
        assert_eq!(
            apply(&engine, "run foo now"),
            RuleOutcome::Rewrite {
                command: "run bar now".to_string(),
                reason: DEFAULT_REWRITE_REASON.to_string(),
                pattern: "foo".to_string(),
            }
        );
    }

    #[test]
    fn test_replace_substitutes_every_match() {
        let engine = RuleEngine::from_definitions(&[RuleDefinition::replace("foo", "bar")]);
        assert!(matches!(
            apply(&engine, "foo foo"),
            RuleOutcome::Rewrite { command, .. } if command == "bar bar"
        ));
    }

    #[test]
    fn test_block_rule() {
        let engine = RuleEngine::from_definitions(&[
            RuleDefinition::block(r"git\s+push\s+--force", "Use --force-with-lease").with_reason("Protect shared history"),
        ]);
        assert_eq!(
            apply(&engine, "git push --force origin main"),
            RuleOutcome::Block {
                message: "Use --force-with-lease".to_string(),
                reason: "Protect shared history".to_string(),
                pattern: r"git\s+push\s+--force".to_string(),
            }
        );
    }

    #[test]
    fn test_no_match() {
        let engine = RuleEngine::from_definitions(&[RuleDefinition::replace("foo", "bar")]);
        assert_eq!(apply(&engine, "ls -la"), RuleOutcome::NoMatch);
        assert_eq!(apply(&RuleEngine::empty(), "ls -la"), RuleOutcome::NoMatch);
    }

    #[test]
    fn test_first_match_wins() {
        let engine = RuleEngine::from_definitions(&[
            RuleDefinition::replace("npm", "pnpm"),
            RuleDefinition::block(r"npm install left-pad", "nope"),
        ]);
        assert!(matches!(
            apply(&engine, "npm install left-pad"),
            RuleOutcome::Rewrite { command, .. } if command == "pnpm install left-pad"
        ));
    }

    #[test]
    fn test_search_not_full_match() {
        let engine = RuleEngine::from_definitions(&[RuleDefinition::block("secret", "no secrets")]);
        assert!(matches!(
            apply(&engine, "cat my-secret-file"),
            RuleOutcome::Block { .. }
        ));
    }

    #[test]
    fn test_invalid_pattern_skipped() {
        let engine = RuleEngine::from_definitions(&[
            RuleDefinition::block("(unclosed", "broken"),
            RuleDefinition::block("ls", "listing blocked"),
        ]);
        assert_eq!(engine.len(), 1);
        assert!(matches!(apply(&engine, "ls"), RuleOutcome::Block { .. }));
    }

    #[test]
    fn test_rule_without_effect_falls_through() {
        let engine = RuleEngine::from_definitions(&[
            RuleDefinition {
                pattern: Some("ls".to_string()),
                ..RuleDefinition::default()
            },
            RuleDefinition::replace("ls", "ls --color"),
        ]);
        assert!(matches!(
            apply(&engine, "ls"),
            RuleOutcome::Rewrite { command, .. } if command == "ls --color"
        ));
    }

    #[test]
    fn test_replace_wins_over_error() {
        let engine = RuleEngine::from_definitions(&[RuleDefinition {
            pattern: Some("vim".to_string()),
            replace: Some("nvim".to_string()),
            error: Some("unused".to_string()),
            reason: None,
        }]);
        assert!(matches!(apply(&engine, "vim x"), RuleOutcome::Rewrite { .. }));
    }

    #[test]
    fn test_backreference_template() {
        let engine = RuleEngine::from_definitions(&[RuleDefinition::replace(
            r"rm -rf (\S+)",
            r"trash \1",
        )]);
        assert!(matches!(
            apply(&engine, "rm -rf build"),
            RuleOutcome::Rewrite { command, .. } if command == "trash build"
        ));
    }

    #[test]
    fn test_dollar_in_template_is_literal() {
        let engine = RuleEngine::from_definitions(&[RuleDefinition::replace("cd ~", "cd $HOME")]);
        assert!(matches!(
            apply(&engine, "cd ~"),
            RuleOutcome::Rewrite { command, .. } if command == "cd $HOME"
        ));
    }

    #[test]
    fn test_translate_template() {
        assert_eq!(translate_template("plain"), "plain");
        assert_eq!(translate_template(r"\1-\2"), "${1}-${2}");
        assert_eq!(translate_template(r"\g<1>0"), "${1}0");
        assert_eq!(translate_template(r"\g<name>"), "${name}");
        assert_eq!(translate_template("$PATH"), "$$PATH");
        assert_eq!(translate_template(r"a\\b"), r"a\b");
    }

    #[test]
    fn test_translate_character_escapes() {
        assert_eq!(translate_template(r"a\tb\n"), "a\tb\n");
        assert_eq!(translate_template(r"\r\f\v\a\b"), "\r\x0C\x0B\x07\x08");
        assert_eq!(translate_template(r"\\n"), r"\n");
        assert_eq!(translate_template(r"\q"), r"\q");
    }

    #[test]
    fn test_escape_in_replacement() {
        let engine = RuleEngine::from_definitions(&[RuleDefinition::replace(r"^cut -d, (\S+)$", r"cut -d\t \1")]);
        assert!(matches!(
            apply(&engine, "cut -d, data.csv"),
            RuleOutcome::Rewrite { command, .. } if command == "cut -d\t data.csv"
        ));
    }

    #[test]
    fn test_from_toml_preserves_order() {
        let engine = RuleEngine::from_toml(
            r#"
            [[rule]]
            pattern = "^ls$"
            replace = "ls -la"
            reason = "Prefer long listing"

            [[rule]]
            pattern = "ls"
            error = "unreachable for bare ls"
            "#,
        )
        .unwrap();

        assert_eq!(engine.len(), 2);
        assert_eq!(engine.rules()[0].pattern(), "^ls$");
        assert_eq!(
            apply(&engine, "ls"),
            RuleOutcome::Rewrite {
                command: "ls -la".to_string(),
                reason: "Prefer long listing".to_string(),
                pattern: "^ls$".to_string(),
            }
        );
    }

    #[test]
    fn test_load_or_empty_missing_file() {
        let engine = RuleEngine::load_or_empty(Some(Path::new("/nonexistent/rules.toml")));
        assert!(engine.is_empty());
        assert!(RuleEngine::load_or_empty(None).is_empty());
    }

    #[test]
    fn test_load_or_empty_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rules.toml");
        fs::write(&path, "[[rule]\npattern = ").unwrap();

        assert!(matches!(RuleEngine::load(&path), Err(RuleLoadError::ParseError(_))));
        assert!(RuleEngine::load_or_empty(Some(&path)).is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rules.toml");
        fs::write(
            &path,
            "[[rule]]\npattern = \"foo\"\nreplace = \"bar\"\n",
        )
        .unwrap();

        let engine = RuleEngine::load(&path).unwrap();
        assert_eq!(engine.len(), 1);
    }
}
