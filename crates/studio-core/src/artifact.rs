//! Source artifact and correction records

use serde::Serialize;

/// Current component source of a studio session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceArtifact {
    text: String,
    revision: u64,
}

impl SourceArtifact {
    /// Empty source at revision 0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Source text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Monotonic revision, bumped on every change
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether `revision` is the current one
    #[inline]
    #[must_use]
    pub fn is_current(&self, revision: u64) -> bool {
        self.revision == revision
    }

    /// Replace the text; returns the new revision
    pub fn set(&mut self, text: impl Into<String>) -> u64 {
        self.text = text.into();
        self.revision += 1;
        self.revision
    }
}

/// One automatic correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionAttempt {
    /// Error text that triggered it
    pub triggering_error: String,
    /// 1-based position within the current streak
    pub attempt_number: u32,
    /// Source that failed
    pub source_before: String,
    /// Source returned by the service, once it arrives
    pub source_after: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisions_are_monotonic() {
        let mut artifact = SourceArtifact::new();
        assert_eq!(artifact.set("a"), 1);
        assert_eq!(artifact.set("a"), 2);
        assert!(artifact.is_current(2));
        assert!(!artifact.is_current(1));
    }
}
