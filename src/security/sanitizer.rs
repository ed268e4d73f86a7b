use std::fmt;
use std::ops::Deref;

/// A command after control-character removal and whitespace trimming.
///
/// Only [`sanitize`] constructs this type, so holding one means the input has
/// already been normalized. The raw command is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SanitizedCommand(String);

impl SanitizedCommand {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Wrap text without normalizing it
    #[cfg(test)]
    pub(crate) fn unchecked(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl Deref for SanitizedCommand {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SanitizedCommand {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Control characters removed before any matching: 0x00-0x08, 0x0B, 0x0C,
/// 0x0E-0x1F and 0x7F. Tab, line feed and carriage return are kept so the
/// multiline check can still see them.
fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

/// Normalize a raw command before security evaluation.
///
/// Control characters are removed first and whitespace trimmed second, which
/// makes the operation idempotent: a control character hiding in front of a
/// space cannot leave leading whitespace behind.
pub fn sanitize(raw: &str) -> SanitizedCommand {
    let stripped: String = raw.chars().filter(|c| !is_stripped_control(*c)).collect();
    let sanitized = stripped.trim().to_string();

    tracing::debug!(command = %sanitized, "sanitized command");

    SanitizedCommand(sanitized)
}
