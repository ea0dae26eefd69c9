use serde::{Deserialize, Serialize};

use crate::event::{Borough, EventType};

/// Read-only profile snapshot. Registration, login, and password handling
/// live in the account layer; this crate only consumes the fields that feed
/// engagement decisions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub home_borough: Option<Borough>,
    pub favorite_event_type: Option<EventType>,
    /// Insertion-ordered; the tail is the most recent affinity signal.
    pub saved_event_ids: Vec<String>,
}

impl UserProfile {
    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            user_id: user_id.clone(),
            username: user_id,
            home_borough: None,
            favorite_event_type: None,
            saved_event_ids: Vec::new(),
        }
    }
}
