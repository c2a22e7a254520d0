//! Name-based identity. A display name maps deterministically to an owner id;
//! there are no credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scopes stored sessions to one user.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Lowercase the name and collapse every whitespace run into a single `-`.
    /// Returns `None` for a blank name.
    pub fn from_display_name(name: &str) -> Option<Self> {
        let id = name
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-");
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: OwnerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl User {
    pub fn from_display_name(name: &str) -> Option<Self> {
        let id = OwnerId::from_display_name(name)?;
        let name = name.trim().to_string();
        Some(Self {
            avatar: Some(avatar_url(&name)),
            id,
            name,
        })
    }

    /// First word of the display name, for greetings.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

fn avatar_url(name: &str) -> String {
    let encoded = name.split_whitespace().collect::<Vec<_>>().join("+");
    format!("https://ui-avatars.com/api/?name={encoded}&background=random")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_id_lowercases_and_collapses_whitespace() {
        let id = OwnerId::from_display_name("Ada   King\tLovelace").unwrap();
        assert_eq!(id.as_str(), "ada-king-lovelace");
    }

    #[test]
    fn owner_id_ignores_surrounding_whitespace() {
        let id = OwnerId::from_display_name("  Grace Hopper ").unwrap();
        assert_eq!(id.as_str(), "grace-hopper");
    }

    #[test]
    fn blank_name_has_no_owner_id() {
        assert!(OwnerId::from_display_name("   ").is_none());
        assert!(User::from_display_name("").is_none());
    }

    #[test]
    fn same_name_same_owner() {
        assert_eq!(
            OwnerId::from_display_name("Alan Turing"),
            OwnerId::from_display_name("alan turing")
        );
    }

    #[test]
    fn user_has_avatar_and_first_name() {
        let user = User::from_display_name("Grace Hopper").unwrap();
        assert_eq!(user.first_name(), "Grace");
        assert!(user.avatar.as_deref().unwrap().contains("name=Grace+Hopper"));
    }
}
