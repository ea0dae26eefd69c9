use std::collections::HashMap;
use std::sync::Arc;

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::events::EventRepository;
use crate::ports::users::UserRepository;
use crate::util::is_valid_id;

/// Save/unsave bookkeeping over a user's saved-event list. The list is the
/// recommendation engine's affinity signal, so writes go through add-to-set
/// and pull deltas rather than whole-profile replacement.
#[derive(Clone)]
pub struct SavedEventsService {
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventRepository>,
}

impl SavedEventsService {
    pub fn new(users: Arc<dyn UserRepository>, events: Arc<dyn EventRepository>) -> Self {
        Self { users, events }
    }

    /// Returns false when the event was already saved.
    pub async fn save_event(&self, user_id: &str, event_id: &str) -> DomainResult<bool> {
        let (user_id, event_id) = checked_ids(user_id, event_id)?;
        if self.events.find_by_id(&event_id).await?.is_none() {
            return Err(DomainError::EventNotFound(event_id));
        }
        self.users.add_saved_event(&user_id, &event_id).await
    }

    /// Returns false when the event was not on the list.
    pub async fn unsave_event(&self, user_id: &str, event_id: &str) -> DomainResult<bool> {
        let (user_id, event_id) = checked_ids(user_id, event_id)?;
        self.users.remove_saved_event(&user_id, &event_id).await
    }

    pub async fn saved_events(&self, user_id: &str) -> DomainResult<Vec<String>> {
        if !is_valid_id(user_id) {
            return Err(DomainError::InvalidUserId(user_id.to_string()));
        }
        let user_id = user_id.trim();
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(user_id.to_string()))?;
        Ok(user.saved_event_ids)
    }

    pub async fn savers_count(&self, event_id: &str) -> DomainResult<u64> {
        if !is_valid_id(event_id) {
            return Err(DomainError::InvalidEventId(event_id.to_string()));
        }
        self.users.count_savers(event_id.trim()).await
    }

    /// Batch counts; every requested id gets an entry, zero when nobody
    /// saved it.
    pub async fn savers_count_many(
        &self,
        event_ids: &[String],
    ) -> DomainResult<HashMap<String, u64>> {
        for event_id in event_ids {
            if !is_valid_id(event_id) {
                return Err(DomainError::InvalidEventId(event_id.clone()));
            }
        }
        let mut counts = self.users.count_savers_many(event_ids).await?;
        for event_id in event_ids {
            counts.entry(event_id.clone()).or_insert(0);
        }
        Ok(counts)
    }
}

fn checked_ids(user_id: &str, event_id: &str) -> DomainResult<(String, String)> {
    if !is_valid_id(user_id) {
        return Err(DomainError::InvalidUserId(user_id.to_string()));
    }
    if !is_valid_id(event_id) {
        return Err(DomainError::InvalidEventId(event_id.to_string()));
    }
    Ok((user_id.trim().to_string(), event_id.trim().to_string()))
}
