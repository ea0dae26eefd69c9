use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::event::Event;
use crate::ports::events::EventRepository;
use crate::util::{is_valid_id, now_ms, uuid_v7_without_dashes};

pub const MAX_COMMENT_LENGTH: usize = 2_000;

/// Bounded retry budget for delete when the store reports a concurrent
/// writer. Validation and authorization failures are never retried.
const MAX_DELETE_ATTEMPTS: u32 = 3;

/// One entry in an event's flat, parent-referencing comment collection.
/// `parent_id = None` marks a top-level comment; a non-null parent always
/// references another comment inside the same event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub comment_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub created_at_ms: i64,
    pub parent_id: Option<String>,
}

/// Nested reply tree for rendering. Roots and reply lists keep the
/// collection's insertion order.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentDeletion {
    pub removed: usize,
}

#[derive(Clone)]
pub struct CommentService {
    events: Arc<dyn EventRepository>,
}

impl CommentService {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self { events }
    }

    pub async fn add_comment(
        &self,
        event_id: &str,
        author_id: &str,
        author_name: &str,
        text: &str,
        parent_id: Option<&str>,
    ) -> DomainResult<Comment> {
        if !is_valid_id(event_id) {
            return Err(DomainError::InvalidEventId(event_id.to_string()));
        }
        if !is_valid_id(author_id) {
            return Err(DomainError::InvalidUserId(author_id.to_string()));
        }
        if let Some(parent_id) = parent_id {
            if !is_valid_id(parent_id) {
                return Err(DomainError::InvalidCommentId(parent_id.to_string()));
            }
        }
        let text = validate_comment_text(text)?;

        let event_id = event_id.trim();
        let event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| DomainError::EventNotFound(event_id.to_string()))?;

        let parent_id = match parent_id {
            Some(parent_id) => {
                let parent_id = parent_id.trim();
                if !event
                    .comments
                    .iter()
                    .any(|comment| comment.comment_id == parent_id)
                {
                    return Err(DomainError::ParentNotFound(parent_id.to_string()));
                }
                Some(parent_id.to_string())
            }
            None => None,
        };

        let comment = Comment {
            comment_id: uuid_v7_without_dashes(),
            author_id: author_id.trim().to_string(),
            author_name: author_name.trim().to_string(),
            text,
            created_at_ms: now_ms(),
            parent_id,
        };
        self.events.push_comment(event_id, &comment).await?;
        Ok(comment)
    }

    /// Removes the target comment and every transitive descendant as one
    /// atomic store operation. The requester must be the comment's author.
    pub async fn delete_comment(
        &self,
        event_id: &str,
        comment_id: &str,
        requester_id: &str,
    ) -> DomainResult<CommentDeletion> {
        if !is_valid_id(event_id) {
            return Err(DomainError::InvalidEventId(event_id.to_string()));
        }
        if !is_valid_id(comment_id) {
            return Err(DomainError::InvalidCommentId(comment_id.to_string()));
        }
        if !is_valid_id(requester_id) {
            return Err(DomainError::InvalidUserId(requester_id.to_string()));
        }
        let event_id = event_id.trim();
        let comment_id = comment_id.trim();
        let requester_id = requester_id.trim();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let event = self
                .events
                .find_by_id(event_id)
                .await?
                .ok_or_else(|| DomainError::EventNotFound(event_id.to_string()))?;
            let target = event
                .comments
                .iter()
                .find(|comment| comment.comment_id == comment_id)
                .ok_or_else(|| DomainError::CommentNotFound(comment_id.to_string()))?;
            if target.author_id != requester_id {
                return Err(DomainError::NotOwner(comment_id.to_string()));
            }

            let doomed = collect_subtree(&event.comments, comment_id);
            match self.events.pull_comments(event_id, &doomed).await {
                // Removing nothing while the target sat in our snapshot
                // means another writer won the race; re-fetch and retry.
                Ok(0) => {}
                Ok(removed) => return Ok(CommentDeletion { removed }),
                Err(DomainError::Conflict) => {}
                Err(err) => return Err(err),
            }

            if attempt >= MAX_DELETE_ATTEMPTS {
                return Err(DomainError::Conflict);
            }
        }
    }

    /// Fetches an event and groups its flat comment collection into the
    /// nested reply tree the rendering layer consumes.
    pub async fn thread_view(&self, event_id: &str) -> DomainResult<Vec<CommentNode>> {
        if !is_valid_id(event_id) {
            return Err(DomainError::InvalidEventId(event_id.to_string()));
        }
        let event_id = event_id.trim();
        let event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or_else(|| DomainError::EventNotFound(event_id.to_string()))?;
        Ok(comment_forest(&event))
    }
}

fn validate_comment_text(text: &str) -> DomainResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation("comment text is required".into()));
    }
    if trimmed.chars().count() > MAX_COMMENT_LENGTH {
        return Err(DomainError::Validation(format!(
            "comment text exceeds max length of {MAX_COMMENT_LENGTH}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Collects `root_id` plus every transitive descendant. One pass builds a
/// children index, then an explicit worklist walks it, so cost is O(n) and
/// stack depth stays flat regardless of how deep the reply chain goes. The
/// seen-set keeps the walk terminating even if a corrupted store holds a
/// parent cycle.
fn collect_subtree(comments: &[Comment], root_id: &str) -> Vec<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for comment in comments {
        if let Some(parent_id) = comment.parent_id.as_deref() {
            children
                .entry(parent_id)
                .or_default()
                .push(comment.comment_id.as_str());
        }
    }

    let mut collected = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut worklist = vec![root_id];
    while let Some(id) = worklist.pop() {
        if !seen.insert(id) {
            continue;
        }
        collected.push(id.to_string());
        if let Some(kids) = children.get(id) {
            worklist.extend(kids.iter().copied());
        }
    }
    collected
}

/// Groups a flat parent-referencing collection into a nested forest.
/// Comments whose parent is missing from the collection are surfaced as
/// roots rather than dropped. Single reverse pass; a child always follows
/// its parent in insertion order, so by the time a comment is moved into
/// its parent, its own reply list is complete.
pub fn comment_forest(event: &Event) -> Vec<CommentNode> {
    let present: HashSet<&str> = event
        .comments
        .iter()
        .map(|comment| comment.comment_id.as_str())
        .collect();
    let mut nodes: HashMap<String, CommentNode> = event
        .comments
        .iter()
        .map(|comment| {
            (
                comment.comment_id.clone(),
                CommentNode {
                    comment: comment.clone(),
                    replies: Vec::new(),
                },
            )
        })
        .collect();

    let mut roots: Vec<CommentNode> = Vec::new();
    for comment in event.comments.iter().rev() {
        let Some(node) = nodes.remove(&comment.comment_id) else {
            continue;
        };
        let parent = comment
            .parent_id
            .as_deref()
            .filter(|parent_id| present.contains(parent_id) && *parent_id != comment.comment_id);
        match parent.and_then(|parent_id| nodes.get_mut(parent_id)) {
            Some(parent_node) => parent_node.replies.insert(0, node),
            None => roots.insert(0, node),
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Borough, EventSource, EventType};
    use crate::ports::BoxFuture;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct InMemoryEvents {
        store: Arc<RwLock<HashMap<String, Event>>>,
    }

    impl InMemoryEvents {
        async fn insert(&self, event: Event) {
            self.store
                .write()
                .await
                .insert(event.event_id.clone(), event);
        }

        async fn comments_of(&self, event_id: &str) -> Vec<Comment> {
            self.store
                .read()
                .await
                .get(event_id)
                .map(|event| event.comments.clone())
                .unwrap_or_default()
        }
    }

    impl EventRepository for InMemoryEvents {
        fn create(&self, event: &Event) -> BoxFuture<'_, DomainResult<Event>> {
            let event = event.clone();
            let store = self.store.clone();
            Box::pin(async move {
                let mut store = store.write().await;
                if store.contains_key(&event.event_id) {
                    return Err(DomainError::Conflict);
                }
                store.insert(event.event_id.clone(), event.clone());
                Ok(event)
            })
        }

        fn find_by_id(&self, event_id: &str) -> BoxFuture<'_, DomainResult<Option<Event>>> {
            let event_id = event_id.to_string();
            let store = self.store.clone();
            Box::pin(async move { Ok(store.read().await.get(&event_id).cloned()) })
        }

        fn list_all(&self) -> BoxFuture<'_, DomainResult<Vec<Event>>> {
            let store = self.store.clone();
            Box::pin(async move { Ok(store.read().await.values().cloned().collect()) })
        }

        fn push_comment(
            &self,
            event_id: &str,
            comment: &Comment,
        ) -> BoxFuture<'_, DomainResult<()>> {
            let event_id = event_id.to_string();
            let comment = comment.clone();
            let store = self.store.clone();
            Box::pin(async move {
                let mut store = store.write().await;
                let event = store
                    .get_mut(&event_id)
                    .ok_or(DomainError::EventNotFound(event_id))?;
                event.comments.push(comment);
                Ok(())
            })
        }

        fn pull_comments(
            &self,
            event_id: &str,
            comment_ids: &[String],
        ) -> BoxFuture<'_, DomainResult<usize>> {
            let event_id = event_id.to_string();
            let doomed: HashSet<String> = comment_ids.iter().cloned().collect();
            let store = self.store.clone();
            Box::pin(async move {
                let mut store = store.write().await;
                let event = store
                    .get_mut(&event_id)
                    .ok_or(DomainError::EventNotFound(event_id))?;
                let before = event.comments.len();
                event
                    .comments
                    .retain(|comment| !doomed.contains(&comment.comment_id));
                Ok(before - event.comments.len())
            })
        }
    }

    /// Serves a fixed snapshot but fails every pull with Conflict, like a
    /// store whose conditional write keeps losing to another writer.
    struct ContestedEvents {
        snapshot: Event,
    }

    impl EventRepository for ContestedEvents {
        fn create(&self, event: &Event) -> BoxFuture<'_, DomainResult<Event>> {
            let event = event.clone();
            Box::pin(async move { Ok(event) })
        }

        fn find_by_id(&self, _event_id: &str) -> BoxFuture<'_, DomainResult<Option<Event>>> {
            let snapshot = self.snapshot.clone();
            Box::pin(async move { Ok(Some(snapshot)) })
        }

        fn list_all(&self) -> BoxFuture<'_, DomainResult<Vec<Event>>> {
            let snapshot = self.snapshot.clone();
            Box::pin(async move { Ok(vec![snapshot]) })
        }

        fn push_comment(
            &self,
            _event_id: &str,
            _comment: &Comment,
        ) -> BoxFuture<'_, DomainResult<()>> {
            Box::pin(async move { Err(DomainError::Conflict) })
        }

        fn pull_comments(
            &self,
            _event_id: &str,
            _comment_ids: &[String],
        ) -> BoxFuture<'_, DomainResult<usize>> {
            Box::pin(async move { Err(DomainError::Conflict) })
        }
    }

    fn sample_event() -> Event {
        Event {
            event_id: uuid_v7_without_dashes(),
            name: "Grand Street Clean-Up".to_string(),
            event_type: EventType::CleanUp,
            borough: Borough::Brooklyn,
            location: "Grand St & Union Ave".to_string(),
            start_at_ms: Some(now_ms() + 86_400_000),
            end_at_ms: Some(now_ms() + 90_000_000),
            is_public: true,
            source: EventSource::UserCreated,
            created_by: Some(uuid_v7_without_dashes()),
            street_closure: None,
            community_board: None,
            created_at_ms: now_ms(),
            updated_at_ms: None,
            comments: Vec::new(),
        }
    }

    async fn seeded_service() -> (CommentService, Arc<InMemoryEvents>, String) {
        let repo = Arc::new(InMemoryEvents::default());
        let event = sample_event();
        let event_id = event.event_id.clone();
        repo.insert(event).await;
        (CommentService::new(repo.clone()), repo, event_id)
    }

    #[tokio::test]
    async fn add_comment_appends_trimmed_text() {
        let (service, repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        let comment = service
            .add_comment(&event_id, &author, "maria", "  see you there  ", None)
            .await
            .expect("add");

        assert_eq!(comment.text, "see you there");
        assert_eq!(comment.parent_id, None);
        let stored = repo.comments_of(&event_id).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].comment_id, comment.comment_id);
    }

    #[tokio::test]
    async fn add_comment_links_parent_and_two_calls_make_two_comments() {
        let (service, repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        let root = service
            .add_comment(&event_id, &author, "maria", "anyone going?", None)
            .await
            .unwrap();
        let reply_a = service
            .add_comment(&event_id, &author, "maria", "me", Some(&root.comment_id))
            .await
            .unwrap();
        let reply_b = service
            .add_comment(&event_id, &author, "maria", "me", Some(&root.comment_id))
            .await
            .unwrap();

        assert_ne!(reply_a.comment_id, reply_b.comment_id);
        assert_eq!(reply_a.parent_id.as_deref(), Some(root.comment_id.as_str()));
        assert_eq!(repo.comments_of(&event_id).await.len(), 3);
    }

    #[tokio::test]
    async fn add_comment_rejects_empty_and_oversized_text() {
        let (service, repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        let err = service
            .add_comment(&event_id, &author, "maria", "   ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let oversized = "x".repeat(MAX_COMMENT_LENGTH + 1);
        let err = service
            .add_comment(&event_id, &author, "maria", &oversized, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        assert!(repo.comments_of(&event_id).await.is_empty());
    }

    #[tokio::test]
    async fn add_comment_with_unknown_parent_leaves_collection_unchanged() {
        let (service, repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();
        let ghost = uuid_v7_without_dashes();

        let err = service
            .add_comment(&event_id, &author, "maria", "hello", Some(&ghost))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ParentNotFound(id) if id == ghost));
        assert!(repo.comments_of(&event_id).await.is_empty());
    }

    #[tokio::test]
    async fn add_comment_validates_id_shapes_before_touching_store() {
        let (service, _repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        assert!(matches!(
            service
                .add_comment("nope", &author, "m", "hi", None)
                .await
                .unwrap_err(),
            DomainError::InvalidEventId(_)
        ));
        assert!(matches!(
            service
                .add_comment(&event_id, "nope", "m", "hi", None)
                .await
                .unwrap_err(),
            DomainError::InvalidUserId(_)
        ));
        assert!(matches!(
            service
                .add_comment(&event_id, &author, "m", "hi", Some("nope"))
                .await
                .unwrap_err(),
            DomainError::InvalidCommentId(_)
        ));
    }

    #[tokio::test]
    async fn add_comment_to_missing_event_is_not_found() {
        let (service, _repo, _event_id) = seeded_service().await;
        let err = service
            .add_comment(
                &uuid_v7_without_dashes(),
                &uuid_v7_without_dashes(),
                "m",
                "hi",
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::EventNotFound(_)));
    }

    #[tokio::test]
    async fn delete_cascades_through_descendants_and_spares_siblings() {
        let (service, repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        // root_a
        //   child_a1
        //     grandchild
        //   child_a2
        // root_b
        let root_a = service
            .add_comment(&event_id, &author, "m", "root a", None)
            .await
            .unwrap();
        let child_a1 = service
            .add_comment(&event_id, &author, "m", "a1", Some(&root_a.comment_id))
            .await
            .unwrap();
        let grandchild = service
            .add_comment(&event_id, &author, "m", "deep", Some(&child_a1.comment_id))
            .await
            .unwrap();
        let child_a2 = service
            .add_comment(&event_id, &author, "m", "a2", Some(&root_a.comment_id))
            .await
            .unwrap();
        let root_b = service
            .add_comment(&event_id, &author, "m", "root b", None)
            .await
            .unwrap();

        let deletion = service
            .delete_comment(&event_id, &child_a1.comment_id, &author)
            .await
            .expect("delete");
        assert_eq!(deletion.removed, 2);

        let survivors = repo.comments_of(&event_id).await;
        let ids: Vec<&str> = survivors
            .iter()
            .map(|comment| comment.comment_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                root_a.comment_id.as_str(),
                child_a2.comment_id.as_str(),
                root_b.comment_id.as_str(),
            ]
        );
        // No surviving comment may still reference a removed id.
        for comment in &survivors {
            if let Some(parent_id) = comment.parent_id.as_deref() {
                assert_ne!(parent_id, child_a1.comment_id);
                assert_ne!(parent_id, grandchild.comment_id);
            }
        }
    }

    #[tokio::test]
    async fn add_then_delete_restores_collection_size() {
        let (service, repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        service
            .add_comment(&event_id, &author, "m", "first", None)
            .await
            .unwrap();
        let before = repo.comments_of(&event_id).await.len();

        let comment = service
            .add_comment(&event_id, &author, "m", "second", None)
            .await
            .unwrap();
        service
            .delete_comment(&event_id, &comment.comment_id, &author)
            .await
            .unwrap();

        assert_eq!(repo.comments_of(&event_id).await.len(), before);
    }

    #[tokio::test]
    async fn delete_as_non_owner_fails_and_changes_nothing() {
        let (service, repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();
        let stranger = uuid_v7_without_dashes();

        let comment = service
            .add_comment(&event_id, &author, "m", "mine", None)
            .await
            .unwrap();
        let err = service
            .delete_comment(&event_id, &comment.comment_id, &stranger)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotOwner(id) if id == comment.comment_id));
        assert_eq!(repo.comments_of(&event_id).await.len(), 1);
    }

    #[tokio::test]
    async fn delete_of_missing_comment_is_not_found() {
        let (service, _repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        let err = service
            .delete_comment(&event_id, &uuid_v7_without_dashes(), &author)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::CommentNotFound(_)));
    }

    #[tokio::test]
    async fn second_delete_of_same_comment_is_not_found() {
        let (service, _repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        let comment = service
            .add_comment(&event_id, &author, "m", "ephemeral", None)
            .await
            .unwrap();
        service
            .delete_comment(&event_id, &comment.comment_id, &author)
            .await
            .unwrap();
        let err = service
            .delete_comment(&event_id, &comment.comment_id, &author)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::CommentNotFound(_)));
    }

    #[tokio::test]
    async fn delete_handles_a_thousand_level_reply_chain() {
        let (service, repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        // Built directly in the store; driving add_comment a thousand times
        // re-reads the event each round.
        let mut chain = Vec::new();
        let mut parent: Option<String> = None;
        for depth in 0..1_000 {
            let comment = Comment {
                comment_id: uuid_v7_without_dashes(),
                author_id: author.clone(),
                author_name: "m".to_string(),
                text: format!("depth {depth}"),
                created_at_ms: now_ms(),
                parent_id: parent.clone(),
            };
            parent = Some(comment.comment_id.clone());
            chain.push(comment);
        }
        let root_id = chain[0].comment_id.clone();
        {
            let mut store = repo.store.write().await;
            store.get_mut(&event_id).unwrap().comments = chain;
        }

        let deletion = service
            .delete_comment(&event_id, &root_id, &author)
            .await
            .expect("delete chain");
        assert_eq!(deletion.removed, 1_000);
        assert!(repo.comments_of(&event_id).await.is_empty());
    }

    #[tokio::test]
    async fn contested_delete_surfaces_conflict_after_bounded_retries() {
        let author = uuid_v7_without_dashes();
        let mut event = sample_event();
        let comment = Comment {
            comment_id: uuid_v7_without_dashes(),
            author_id: author.clone(),
            author_name: "m".to_string(),
            text: "contested".to_string(),
            created_at_ms: now_ms(),
            parent_id: None,
        };
        event.comments.push(comment.clone());
        let event_id = event.event_id.clone();
        let service = CommentService::new(Arc::new(ContestedEvents { snapshot: event }));

        let err = service
            .delete_comment(&event_id, &comment.comment_id, &author)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict));
    }

    #[tokio::test]
    async fn forest_groups_replies_and_keeps_insertion_order() {
        let (service, _repo, event_id) = seeded_service().await;
        let author = uuid_v7_without_dashes();

        let root_a = service
            .add_comment(&event_id, &author, "m", "a", None)
            .await
            .unwrap();
        let root_b = service
            .add_comment(&event_id, &author, "m", "b", None)
            .await
            .unwrap();
        let reply_1 = service
            .add_comment(&event_id, &author, "m", "a-1", Some(&root_a.comment_id))
            .await
            .unwrap();
        let reply_2 = service
            .add_comment(&event_id, &author, "m", "a-2", Some(&root_a.comment_id))
            .await
            .unwrap();
        let nested = service
            .add_comment(&event_id, &author, "m", "a-1-i", Some(&reply_1.comment_id))
            .await
            .unwrap();

        let forest = service.thread_view(&event_id).await.unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].comment.comment_id, root_a.comment_id);
        assert_eq!(forest[1].comment.comment_id, root_b.comment_id);
        assert_eq!(forest[0].replies.len(), 2);
        assert_eq!(forest[0].replies[0].comment.comment_id, reply_1.comment_id);
        assert_eq!(forest[0].replies[1].comment.comment_id, reply_2.comment_id);
        assert_eq!(
            forest[0].replies[0].replies[0].comment.comment_id,
            nested.comment_id
        );
    }

    #[tokio::test]
    async fn forest_surfaces_orphans_as_roots() {
        let repo = Arc::new(InMemoryEvents::default());
        let mut event = sample_event();
        let author = uuid_v7_without_dashes();
        event.comments.push(Comment {
            comment_id: uuid_v7_without_dashes(),
            author_id: author.clone(),
            author_name: "m".to_string(),
            text: "parent got pulled".to_string(),
            created_at_ms: now_ms(),
            parent_id: Some(uuid_v7_without_dashes()),
        });
        let event_id = event.event_id.clone();
        repo.insert(event).await;

        let forest = CommentService::new(repo).thread_view(&event_id).await.unwrap();
        assert_eq!(forest.len(), 1);
        assert!(forest[0].replies.is_empty());
    }
}
