//! Conversation history sent with every generation request

use serde::{Deserialize, Serialize};
use studio_registry::WidgetDefinition;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the studio
    User,
    /// The generation service
    Assistant,
    /// Studio notices (errors, corrections)
    System,
}

/// One message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker
    pub role: Role,
    /// Text
    pub content: String,
}

impl Turn {
    /// Turn by `role`
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Append-only conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    /// Empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation reopened from a published widget
    ///
    /// Seeds one assistant turn with the widget's last explanation, if it has one.
    #[must_use]
    pub fn hydrate(definition: &WidgetDefinition) -> Self {
        let mut state = Self::new();
        if let Some(explanation) = definition.explanation.as_deref().filter(|e| !e.trim().is_empty()) {
            state.push(Role::Assistant, explanation);
        }
        state
    }

    /// Append a turn
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn::new(role, content));
    }

    /// All turns, oldest first
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if no turn was added yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Content of the most recent assistant turn
    #[must_use]
    pub fn last_assistant(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydrates_from_explanation() {
        let def = WidgetDefinition::new("w", "export default () => 1;").with_explanation("Shows revenue by region.");
        let conversation = ConversationState::hydrate(&def);
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.last_assistant(), Some("Shows revenue by region."));

        let bare = ConversationState::hydrate(&WidgetDefinition::new("w", "export default () => 1;"));
        assert!(bare.is_empty());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let turn = Turn::new(Role::System, "x");
        assert_eq!(serde_json::to_value(&turn).unwrap()["role"], "system");
    }
}
