use std::collections::HashMap;

use crate::DomainResult;
use crate::user::UserProfile;

pub trait UserRepository: Send + Sync {
    fn find_by_id(
        &self,
        user_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>>;

    /// Add-to-set semantics: returns false when the event was already saved.
    fn add_saved_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    /// Pull semantics: returns false when the event was not saved.
    fn remove_saved_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<bool>>;

    fn count_savers(
        &self,
        event_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<u64>>;

    /// Batch variant; the result carries an entry (possibly 0) for every
    /// requested id.
    fn count_savers_many(
        &self,
        event_ids: &[String],
    ) -> crate::ports::BoxFuture<'_, DomainResult<HashMap<String, u64>>>;
}
