use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A platform category (for Twitch, a game) as reported by the catalog API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: String,
    pub name: String,
}

impl CategoryInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Logins of channels live in one category. Ordered so sampling is reproducible
/// under a seeded RNG.
pub type ChannelLogins = BTreeSet<String>;
