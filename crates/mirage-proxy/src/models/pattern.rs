//! Regex compiled once per owning rule.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Compiled form of a pattern held by a rule. It is filled on first use and
/// dropped with the rule, so replacing a simulation releases its regexes.
///
/// The slot remembers the source it was compiled from; if the owner's pattern
/// is edited afterwards the new pattern is compiled per call instead.
#[derive(Clone, Default)]
pub struct CompiledRegex(OnceLock<(String, Option<Regex>)>);

impl CompiledRegex {
    /// Whether `value` matches `pattern`. An invalid pattern matches nothing.
    pub fn is_match(&self, pattern: &str, value: &str) -> bool {
        let (source, compiled) = self
            .0
            .get_or_init(|| (pattern.to_string(), Regex::new(pattern).ok()));
        if source == pattern {
            compiled.as_ref().is_some_and(|re| re.is_match(value))
        } else {
            Regex::new(pattern).is_ok_and(|re| re.is_match(value))
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.0.get().is_some()
    }
}

impl fmt::Debug for CompiledRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRegex")
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

/// Compiled state is a cache, not part of the owner's identity.
impl PartialEq for CompiledRegex {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for CompiledRegex {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiles_on_first_use() {
        let slot = CompiledRegex::default();
        assert!(!slot.is_compiled());
        assert!(slot.is_match(r"^/api/\d+$", "/api/7"));
        assert!(slot.is_compiled());
        assert!(!slot.is_match(r"^/api/\d+$", "/api/x"));
    }

    #[test]
    fn test_edited_pattern_is_not_served_stale() {
        let slot = CompiledRegex::default();
        assert!(slot.is_match("^a$", "a"));
        assert!(slot.is_match("^b$", "b"));
        assert!(!slot.is_match("^b$", "a"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let slot = CompiledRegex::default();
        assert!(!slot.is_match("(unclosed", "(unclosed"));
    }

    #[test]
    fn test_clone_keeps_compiled_state() {
        let slot = CompiledRegex::default();
        slot.is_match("x", "x");
        assert!(slot.clone().is_compiled());
    }
}
