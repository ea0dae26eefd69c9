use crate::DomainResult;
use crate::comments::Comment;
use crate::event::Event;

/// Store contract for event documents. Comment mutations are delta-only:
/// the store appends one comment or removes an exact id set as a single
/// atomic operation, never replacing the whole document from a stale read.
pub trait EventRepository: Send + Sync {
    fn create(&self, event: &Event) -> crate::ports::BoxFuture<'_, DomainResult<Event>>;

    fn find_by_id(
        &self,
        event_id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Event>>>;

    fn list_all(&self) -> crate::ports::BoxFuture<'_, DomainResult<Vec<Event>>>;

    /// Atomic append of one comment to the event's embedded collection.
    /// Fails with `EventNotFound` when the event no longer exists.
    fn push_comment(
        &self,
        event_id: &str,
        comment: &Comment,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    /// Atomic removal of every comment whose id is in `comment_ids`.
    /// Returns the number actually removed; ids already gone are skipped,
    /// not errors. Fails with `EventNotFound` when the event no longer
    /// exists and `Conflict` when the store detects a concurrent writer.
    fn pull_comments(
        &self,
        event_id: &str,
        comment_ids: &[String],
    ) -> crate::ports::BoxFuture<'_, DomainResult<usize>>;
}
