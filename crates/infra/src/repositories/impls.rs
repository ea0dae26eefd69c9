use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cityline_domain::DomainResult;
use cityline_domain::comments::Comment;
use cityline_domain::error::DomainError;
use cityline_domain::event::{Borough, Event, EventSource, EventType};
use cityline_domain::ports::events::EventRepository;
use cityline_domain::ports::users::UserRepository;
use cityline_domain::user::UserProfile;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{
    Surreal,
    engine::remote::ws::{Client, Ws},
    opt::auth::Root,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::RwLock;

use crate::db::DbConfig;

const COMMENT_PULL_CONFLICT_TOTAL: &str = "cityline_store_comment_pull_conflict_total";

#[derive(Default)]
pub struct InMemoryEventRepository {
    store: Arc<RwLock<HashMap<String, Event>>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventRepository for InMemoryEventRepository {
    fn create(
        &self,
        event: &Event,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<Event>> {
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

    fn find_by_id(
        &self,
        event_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<Option<Event>>> {
        let event_id = event_id.to_string();
        let store = self.store.clone();
        Box::pin(async move { Ok(store.read().await.get(&event_id).cloned()) })
    }

    fn list_all(&self) -> cityline_domain::ports::BoxFuture<'_, DomainResult<Vec<Event>>> {
        let store = self.store.clone();
        Box::pin(async move {
            let mut events: Vec<Event> = store.read().await.values().cloned().collect();
            events.sort_by(|left, right| {
                left.created_at_ms
                    .cmp(&right.created_at_ms)
                    .then_with(|| left.event_id.cmp(&right.event_id))
            });
            Ok(events)
        })
    }

    fn push_comment(
        &self,
        event_id: &str,
        comment: &Comment,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<()>> {
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
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<usize>> {
        let event_id = event_id.to_string();
        let doomed: HashSet<String> = comment_ids.iter().cloned().collect();
        let store = self.store.clone();
        Box::pin(async move {
            // Whole removal happens under one write guard, so the delta is
            // atomic with respect to concurrent pushes and pulls.
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

#[derive(Default)]
pub struct InMemoryUserRepository {
    store: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profiles are owned by the account layer; the memory backend takes
    /// them pre-built.
    pub async fn upsert(&self, profile: UserProfile) {
        self.store
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_id(
        &self,
        user_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        let store = self.store.clone();
        Box::pin(async move { Ok(store.read().await.get(&user_id).cloned()) })
    }

    fn add_saved_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<bool>> {
        let user_id = user_id.to_string();
        let event_id = event_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            let user = store
                .get_mut(&user_id)
                .ok_or(DomainError::UserNotFound(user_id))?;
            if user.saved_event_ids.contains(&event_id) {
                return Ok(false);
            }
            user.saved_event_ids.push(event_id);
            Ok(true)
        })
    }

    fn remove_saved_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<bool>> {
        let user_id = user_id.to_string();
        let event_id = event_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let mut store = store.write().await;
            let user = store
                .get_mut(&user_id)
                .ok_or(DomainError::UserNotFound(user_id))?;
            let before = user.saved_event_ids.len();
            user.saved_event_ids.retain(|saved| saved != &event_id);
            Ok(user.saved_event_ids.len() < before)
        })
    }

    fn count_savers(
        &self,
        event_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<u64>> {
        let event_id = event_id.to_string();
        let store = self.store.clone();
        Box::pin(async move {
            let count = store
                .read()
                .await
                .values()
                .filter(|user| user.saved_event_ids.contains(&event_id))
                .count() as u64;
            Ok(count)
        })
    }

    fn count_savers_many(
        &self,
        event_ids: &[String],
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<HashMap<String, u64>>> {
        let event_ids = event_ids.to_vec();
        let store = self.store.clone();
        Box::pin(async move {
            let store = store.read().await;
            let mut counts: HashMap<String, u64> = HashMap::new();
            for user in store.values() {
                for saved in &user.saved_event_ids {
                    if event_ids.contains(saved) {
                        *counts.entry(saved.clone()).or_default() += 1;
                    }
                }
            }
            Ok(counts)
        })
    }
}

pub struct SurrealEventRepository {
    client: Arc<Surreal<Client>>,
}

impl SurrealEventRepository {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: connect(db_config).await?,
        })
    }

    fn decode_event_rows(rows: Vec<Value>) -> DomainResult<Vec<Event>> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<SurrealEventRow>(row)
                    .map_err(|err| DomainError::Storage(format!("invalid event row: {err}")))
                    .and_then(SurrealEventRow::into_event)
            })
            .collect()
    }

    fn build_event_row(event: &Event) -> DomainResult<SurrealEventCreateRow> {
        Ok(SurrealEventCreateRow {
            event_id: event.event_id.clone(),
            name: event.name.clone(),
            event_type: event.event_type.as_str().to_string(),
            borough: event.borough.as_str().to_string(),
            location: event.location.clone(),
            start_at: event.start_at_ms.map(to_rfc3339).transpose()?,
            end_at: event.end_at_ms.map(to_rfc3339).transpose()?,
            is_public: event.is_public,
            source: event.source.as_str().to_string(),
            created_by: event.created_by.clone(),
            street_closure: event.street_closure.clone(),
            community_board: event.community_board,
            created_at: to_rfc3339(event.created_at_ms)?,
            updated_at: event.updated_at_ms.map(to_rfc3339).transpose()?,
            comments: event.comments.iter().map(SurrealCommentRow::from).collect(),
        })
    }
}

const EVENT_SELECT_FIELDS: &str = "event_id, name, event_type, borough, location, \
    IF start_at = NONE { NONE } ELSE { <string>start_at } AS start_at, \
    IF end_at = NONE { NONE } ELSE { <string>end_at } AS end_at, \
    is_public, source, created_by, street_closure, community_board, \
    <string>created_at AS created_at, \
    IF updated_at = NONE { NONE } ELSE { <string>updated_at } AS updated_at, \
    comments";

impl EventRepository for SurrealEventRepository {
    fn create(
        &self,
        event: &Event,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<Event>> {
        let row = match Self::build_event_row(event) {
            Ok(row) => row,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let client = self.client.clone();
        Box::pin(async move {
            let event_id = row.event_id.clone();
            let mut query = String::from(
                "CREATE event SET \
                    event_id = $event_id, \
                    name = $name, \
                    event_type = $event_type, \
                    borough = $borough, \
                    location = $location, \
                    is_public = $is_public, \
                    source = $source, \
                    created_by = $created_by, \
                    street_closure = $street_closure, \
                    community_board = $community_board, \
                    comments = $comments, \
                    created_at = <datetime>$created_at",
            );
            if row.start_at.is_some() {
                query.push_str(", start_at = <datetime>$start_at");
            } else {
                query.push_str(", start_at = NONE");
            }
            if row.end_at.is_some() {
                query.push_str(", end_at = <datetime>$end_at");
            } else {
                query.push_str(", end_at = NONE");
            }
            if row.updated_at.is_some() {
                query.push_str(", updated_at = <datetime>$updated_at");
            } else {
                query.push_str(", updated_at = NONE");
            }
            query.push(';');

            let mut pending = client.query(&query);
            pending = pending.bind(("event_id", row.event_id));
            pending = pending.bind(("name", row.name));
            pending = pending.bind(("event_type", row.event_type));
            pending = pending.bind(("borough", row.borough));
            pending = pending.bind(("location", row.location));
            pending = pending.bind(("is_public", row.is_public));
            pending = pending.bind(("source", row.source));
            pending = pending.bind(("created_by", row.created_by));
            pending = pending.bind(("street_closure", row.street_closure));
            pending = pending.bind(("community_board", row.community_board.map(i64::from)));
            pending = pending.bind(("comments", row.comments));
            pending = pending.bind(("created_at", row.created_at));
            if let Some(start_at) = row.start_at {
                pending = pending.bind(("start_at", start_at));
            }
            if let Some(end_at) = row.end_at {
                pending = pending.bind(("end_at", end_at));
            }
            if let Some(updated_at) = row.updated_at {
                pending = pending.bind(("updated_at", updated_at));
            }
            pending.await.map_err(map_surreal_error)?;

            let select = format!(
                "SELECT {EVENT_SELECT_FIELDS} FROM event WHERE event_id = $event_id LIMIT 1"
            );
            let mut response = client
                .query(select.as_str())
                .bind(("event_id", event_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            let mut events = Self::decode_event_rows(rows)?;
            events
                .pop()
                .ok_or_else(|| DomainError::Storage("create returned no row".to_string()))
        })
    }

    fn find_by_id(
        &self,
        event_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<Option<Event>>> {
        let event_id = event_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let select = format!(
                "SELECT {EVENT_SELECT_FIELDS} FROM event WHERE event_id = $event_id LIMIT 1"
            );
            let mut response = client
                .query(select.as_str())
                .bind(("event_id", event_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            let mut events = Self::decode_event_rows(rows)?;
            Ok(events.pop())
        })
    }

    fn list_all(&self) -> cityline_domain::ports::BoxFuture<'_, DomainResult<Vec<Event>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let select =
                format!("SELECT {EVENT_SELECT_FIELDS} FROM event ORDER BY created_at ASC");
            let mut response = client
                .query(select.as_str())
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            Self::decode_event_rows(rows)
        })
    }

    fn push_comment(
        &self,
        event_id: &str,
        comment: &Comment,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<()>> {
        let event_id = event_id.to_string();
        let row = SurrealCommentRow::from(comment);
        let client = self.client.clone();
        Box::pin(async move {
            // Single-statement append; no read-modify-write of the document.
            let mut response = client
                .query(
                    "UPDATE event SET comments += $comment \
                     WHERE event_id = $event_id RETURN event_id",
                )
                .bind(("comment", row))
                .bind(("event_id", event_id.clone()))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            if rows.is_empty() {
                return Err(DomainError::EventNotFound(event_id));
            }
            Ok(())
        })
    }

    fn pull_comments(
        &self,
        event_id: &str,
        comment_ids: &[String],
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<usize>> {
        let event_id = event_id.to_string();
        let doomed: Vec<String> = comment_ids.to_vec();
        let client = self.client.clone();
        Box::pin(async move {
            // One conditional statement removes exactly the computed id set,
            // so an interleaved writer can never be overwritten from a stale
            // snapshot. RETURN BEFORE yields the pre-image for the removed
            // count.
            let result = client
                .query(
                    "UPDATE event \
                     SET comments = comments[WHERE comment_id NOT INSIDE $doomed] \
                     WHERE event_id = $event_id RETURN BEFORE",
                )
                .bind(("doomed", doomed.clone()))
                .bind(("event_id", event_id.clone()))
                .await;
            let mut response = match result {
                Ok(response) => response,
                Err(err) => {
                    let mapped = map_surreal_error(err);
                    if matches!(mapped, DomainError::Conflict) {
                        counter!(COMMENT_PULL_CONFLICT_TOTAL).increment(1);
                    }
                    return Err(mapped);
                }
            };
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            let Some(before) = rows.into_iter().next() else {
                return Err(DomainError::EventNotFound(event_id));
            };
            let removed = before
                .get("comments")
                .and_then(Value::as_array)
                .map(|comments| {
                    comments
                        .iter()
                        .filter(|comment| {
                            comment
                                .get("comment_id")
                                .and_then(Value::as_str)
                                .is_some_and(|id| doomed.iter().any(|doomed_id| doomed_id == id))
                        })
                        .count()
                })
                .unwrap_or(0);
            Ok(removed)
        })
    }
}

pub struct SurrealUserRepository {
    client: Arc<Surreal<Client>>,
}

impl SurrealUserRepository {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: connect(db_config).await?,
        })
    }

    fn decode_user_rows(rows: Vec<Value>) -> DomainResult<Vec<UserProfile>> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<SurrealUserRow>(row)
                    .map_err(|err| DomainError::Storage(format!("invalid user row: {err}")))
                    .and_then(SurrealUserRow::into_profile)
            })
            .collect()
    }
}

impl UserRepository for SurrealUserRepository {
    fn find_by_id(
        &self,
        user_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<Option<UserProfile>>> {
        let user_id = user_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT user_id, username, home_borough, favorite_event_type, \
                            saved_event_ids \
                     FROM user WHERE user_id = $user_id LIMIT 1",
                )
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            let mut profiles = Self::decode_user_rows(rows)?;
            Ok(profiles.pop())
        })
    }

    fn add_saved_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<bool>> {
        let user_id = user_id.to_string();
        let event_id = event_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "UPDATE user SET saved_event_ids += $event_id \
                     WHERE user_id = $user_id AND $event_id NOT INSIDE saved_event_ids \
                     RETURN user_id",
                )
                .bind(("event_id", event_id.clone()))
                .bind(("user_id", user_id.clone()))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            if !rows.is_empty() {
                return Ok(true);
            }

            // Nothing matched: either the id was already on the list or the
            // user does not exist. One more lookup tells them apart.
            let mut response = client
                .query("SELECT user_id FROM user WHERE user_id = $user_id LIMIT 1")
                .bind(("user_id", user_id.clone()))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            if rows.is_empty() {
                return Err(DomainError::UserNotFound(user_id));
            }
            Ok(false)
        })
    }

    fn remove_saved_event(
        &self,
        user_id: &str,
        event_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<bool>> {
        let user_id = user_id.to_string();
        let event_id = event_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "UPDATE user SET saved_event_ids -= $event_id \
                     WHERE user_id = $user_id RETURN BEFORE",
                )
                .bind(("event_id", event_id.clone()))
                .bind(("user_id", user_id.clone()))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            let Some(before) = rows.into_iter().next() else {
                return Err(DomainError::UserNotFound(user_id));
            };
            let was_saved = before
                .get("saved_event_ids")
                .and_then(Value::as_array)
                .is_some_and(|saved| {
                    saved
                        .iter()
                        .any(|id| id.as_str().is_some_and(|id| id == event_id))
                });
            Ok(was_saved)
        })
    }

    fn count_savers(
        &self,
        event_id: &str,
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<u64>> {
        let event_id = event_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT count() FROM user \
                     WHERE $event_id INSIDE saved_event_ids GROUP ALL",
                )
                .bind(("event_id", event_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            let count = rows
                .first()
                .and_then(|row| row.get("count"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Ok(count)
        })
    }

    fn count_savers_many(
        &self,
        event_ids: &[String],
    ) -> cityline_domain::ports::BoxFuture<'_, DomainResult<HashMap<String, u64>>> {
        let wanted: HashSet<String> = event_ids.iter().cloned().collect();
        let client = self.client.clone();
        Box::pin(async move {
            // One round trip; the tally happens here instead of N queries.
            let mut response = client
                .query("SELECT VALUE saved_event_ids FROM user")
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;

            let mut counts: HashMap<String, u64> = HashMap::new();
            for row in rows {
                let Some(saved) = row.as_array() else {
                    continue;
                };
                for id in saved {
                    if let Some(id) = id.as_str() {
                        if wanted.contains(id) {
                            *counts.entry(id.to_string()).or_default() += 1;
                        }
                    }
                }
            }
            Ok(counts)
        })
    }
}

async fn connect(db_config: &DbConfig) -> anyhow::Result<Arc<Surreal<Client>>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(&db_config.endpoint).await?;
    db.signin(Root {
        username: &db_config.username,
        password: &db_config.password,
    })
    .await?;
    db.use_ns(&db_config.namespace)
        .use_db(&db_config.database)
        .await?;
    Ok(Arc::new(db))
}

fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    let error_message = err.to_string().to_lowercase();
    if error_message.contains("already exists")
        || error_message.contains("duplicate")
        || error_message.contains("unique")
        || error_message.contains("conflict")
    {
        return DomainError::Conflict;
    }
    DomainError::Storage(format!("surreal query failed: {error_message}"))
}

fn parse_rfc3339(value: &str) -> DomainResult<i64> {
    let dt = OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| DomainError::Storage(format!("invalid timestamp: {err}")))?;
    Ok((dt.unix_timestamp_nanos() / 1_000_000) as i64)
}

fn to_rfc3339(epoch_ms: i64) -> DomainResult<String> {
    let dt = OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000)
        .map_err(|err| DomainError::Storage(format!("invalid ms timestamp: {err}")))?;
    Ok(dt
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string()))
}

#[derive(Debug, Serialize, Deserialize)]
struct SurrealCommentRow {
    comment_id: String,
    author_id: String,
    author_name: String,
    text: String,
    created_at_ms: i64,
    parent_id: Option<String>,
}

impl From<&Comment> for SurrealCommentRow {
    fn from(comment: &Comment) -> Self {
        Self {
            comment_id: comment.comment_id.clone(),
            author_id: comment.author_id.clone(),
            author_name: comment.author_name.clone(),
            text: comment.text.clone(),
            created_at_ms: comment.created_at_ms,
            parent_id: comment.parent_id.clone(),
        }
    }
}

impl From<SurrealCommentRow> for Comment {
    fn from(row: SurrealCommentRow) -> Self {
        Comment {
            comment_id: row.comment_id,
            author_id: row.author_id,
            author_name: row.author_name,
            text: row.text,
            created_at_ms: row.created_at_ms,
            parent_id: row.parent_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct SurrealEventCreateRow {
    event_id: String,
    name: String,
    event_type: String,
    borough: String,
    location: String,
    start_at: Option<String>,
    end_at: Option<String>,
    is_public: bool,
    source: String,
    created_by: Option<String>,
    street_closure: Option<String>,
    community_board: Option<u32>,
    created_at: String,
    updated_at: Option<String>,
    comments: Vec<SurrealCommentRow>,
}

#[derive(Debug, Deserialize)]
struct SurrealEventRow {
    event_id: String,
    name: String,
    event_type: String,
    borough: String,
    location: String,
    start_at: Option<String>,
    end_at: Option<String>,
    is_public: bool,
    source: String,
    created_by: Option<String>,
    street_closure: Option<String>,
    community_board: Option<u32>,
    created_at: String,
    updated_at: Option<String>,
    comments: Vec<SurrealCommentRow>,
}

impl SurrealEventRow {
    fn into_event(self) -> DomainResult<Event> {
        let event_type = self
            .event_type
            .parse::<EventType>()
            .map_err(|_| DomainError::Storage(format!("invalid event type '{}'", self.event_type)))?;
        let borough = self
            .borough
            .parse::<Borough>()
            .map_err(|_| DomainError::Storage(format!("invalid borough '{}'", self.borough)))?;
        let source = self
            .source
            .parse::<EventSource>()
            .map_err(|_| DomainError::Storage(format!("invalid event source '{}'", self.source)))?;
        Ok(Event {
            event_id: self.event_id,
            name: self.name,
            event_type,
            borough,
            location: self.location,
            // Rows seeded from the external feed may hold unparseable
            // timestamps; those events must simply never score.
            start_at_ms: self
                .start_at
                .as_deref()
                .and_then(|start_at| parse_rfc3339(start_at).ok()),
            end_at_ms: self
                .end_at
                .as_deref()
                .and_then(|end_at| parse_rfc3339(end_at).ok()),
            is_public: self.is_public,
            source,
            created_by: self.created_by,
            street_closure: self.street_closure,
            community_board: self.community_board,
            created_at_ms: parse_rfc3339(&self.created_at)?,
            updated_at_ms: self
                .updated_at
                .as_deref()
                .map(parse_rfc3339)
                .transpose()?,
            comments: self.comments.into_iter().map(Comment::from).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SurrealUserRow {
    user_id: String,
    username: String,
    home_borough: Option<String>,
    favorite_event_type: Option<String>,
    #[serde(default)]
    saved_event_ids: Vec<String>,
}

impl SurrealUserRow {
    fn into_profile(self) -> DomainResult<UserProfile> {
        let home_borough = self
            .home_borough
            .as_deref()
            .map(|borough| {
                borough.parse::<Borough>().map_err(|_| {
                    DomainError::Storage(format!("invalid borough '{borough}' on user row"))
                })
            })
            .transpose()?;
        let favorite_event_type = self
            .favorite_event_type
            .as_deref()
            .map(|event_type| {
                event_type.parse::<EventType>().map_err(|_| {
                    DomainError::Storage(format!("invalid event type '{event_type}' on user row"))
                })
            })
            .transpose()?;
        Ok(UserProfile {
            user_id: self.user_id,
            username: self.username,
            home_borough,
            favorite_event_type,
            saved_event_ids: self.saved_event_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityline_domain::util::{now_ms, uuid_v7_without_dashes};

    fn sample_event() -> Event {
        Event {
            event_id: uuid_v7_without_dashes(),
            name: "Smith Street Sidewalk Sale".to_string(),
            event_type: EventType::SidewalkSale,
            borough: Borough::Brooklyn,
            location: "Smith St".to_string(),
            start_at_ms: Some(now_ms() + 3_600_000),
            end_at_ms: Some(now_ms() + 7_200_000),
            is_public: true,
            source: EventSource::NycOpenData,
            created_by: None,
            street_closure: None,
            community_board: Some(6),
            created_at_ms: now_ms(),
            updated_at_ms: None,
            comments: Vec::new(),
        }
    }

    fn sample_comment(author_id: &str, parent_id: Option<&str>) -> Comment {
        Comment {
            comment_id: uuid_v7_without_dashes(),
            author_id: author_id.to_string(),
            author_name: "sam".to_string(),
            text: "looking forward to it".to_string(),
            created_at_ms: now_ms(),
            parent_id: parent_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn memory_events_reject_duplicate_creates() {
        let repo = InMemoryEventRepository::new();
        let event = sample_event();
        repo.create(&event).await.unwrap();
        let err = repo.create(&event).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict));
    }

    #[tokio::test]
    async fn memory_push_and_pull_are_deltas_with_counts() {
        let repo = InMemoryEventRepository::new();
        let event = sample_event();
        let event_id = event.event_id.clone();
        repo.create(&event).await.unwrap();

        let author = uuid_v7_without_dashes();
        let root = sample_comment(&author, None);
        let reply = sample_comment(&author, Some(&root.comment_id));
        repo.push_comment(&event_id, &root).await.unwrap();
        repo.push_comment(&event_id, &reply).await.unwrap();

        let removed = repo
            .pull_comments(
                &event_id,
                &[root.comment_id.clone(), reply.comment_id.clone()],
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);

        // Ids already gone are skipped, not errors.
        let removed = repo
            .pull_comments(&event_id, &[root.comment_id.clone()])
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn memory_comment_ops_require_an_existing_event() {
        let repo = InMemoryEventRepository::new();
        let ghost = uuid_v7_without_dashes();
        let comment = sample_comment(&uuid_v7_without_dashes(), None);

        assert!(matches!(
            repo.push_comment(&ghost, &comment).await.unwrap_err(),
            DomainError::EventNotFound(_)
        ));
        assert!(matches!(
            repo.pull_comments(&ghost, &[comment.comment_id]).await.unwrap_err(),
            DomainError::EventNotFound(_)
        ));
    }

    #[tokio::test]
    async fn memory_list_all_orders_by_creation() {
        let repo = InMemoryEventRepository::new();
        let mut first = sample_event();
        first.created_at_ms = 1_000;
        let mut second = sample_event();
        second.created_at_ms = 2_000;
        repo.create(&second).await.unwrap();
        repo.create(&first).await.unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all[0].event_id, first.event_id);
        assert_eq!(all[1].event_id, second.event_id);
    }

    #[tokio::test]
    async fn memory_users_enforce_set_semantics() {
        let repo = InMemoryUserRepository::new();
        let profile = UserProfile::with_user_id(uuid_v7_without_dashes());
        let user_id = profile.user_id.clone();
        repo.upsert(profile).await;
        let event_id = uuid_v7_without_dashes();

        assert!(repo.add_saved_event(&user_id, &event_id).await.unwrap());
        assert!(!repo.add_saved_event(&user_id, &event_id).await.unwrap());
        assert!(repo.remove_saved_event(&user_id, &event_id).await.unwrap());
        assert!(!repo.remove_saved_event(&user_id, &event_id).await.unwrap());
    }

    #[tokio::test]
    async fn memory_saver_counts_span_users() {
        let repo = InMemoryUserRepository::new();
        let event_a = uuid_v7_without_dashes();
        let event_b = uuid_v7_without_dashes();
        for _ in 0..2 {
            let profile = UserProfile::with_user_id(uuid_v7_without_dashes());
            let user_id = profile.user_id.clone();
            repo.upsert(profile).await;
            repo.add_saved_event(&user_id, &event_a).await.unwrap();
        }

        assert_eq!(repo.count_savers(&event_a).await.unwrap(), 2);
        assert_eq!(repo.count_savers(&event_b).await.unwrap(), 0);

        let counts = repo
            .count_savers_many(&[event_a.clone(), event_b.clone()])
            .await
            .unwrap();
        assert_eq!(counts.get(&event_a), Some(&2));
        // Zero-count ids are absent here; the service layer fills them in.
        assert_eq!(counts.get(&event_b), None);
    }

    #[test]
    fn event_rows_round_trip_through_the_surreal_shape() {
        let mut event = sample_event();
        let author = uuid_v7_without_dashes();
        event.comments.push(sample_comment(&author, None));
        event.updated_at_ms = Some(event.created_at_ms + 500);

        let row = SurrealEventRepository::build_event_row(&event).unwrap();
        let encoded = serde_json::to_value(&row).unwrap();
        let decoded: SurrealEventRow = serde_json::from_value(encoded).unwrap();
        let back = decoded.into_event().unwrap();

        assert_eq!(back.event_id, event.event_id);
        assert_eq!(back.event_type, event.event_type);
        assert_eq!(back.borough, event.borough);
        assert_eq!(back.start_at_ms, event.start_at_ms);
        assert_eq!(back.updated_at_ms, event.updated_at_ms);
        assert_eq!(back.comments, event.comments);
    }

    #[test]
    fn event_rows_tolerate_unparseable_start_times() {
        let row = SurrealEventRow {
            event_id: uuid_v7_without_dashes(),
            name: "feed import".to_string(),
            event_type: "Parade".to_string(),
            borough: "Queens".to_string(),
            location: String::new(),
            start_at: Some("yesterday-ish".to_string()),
            end_at: None,
            is_public: true,
            source: "nyc_open_data".to_string(),
            created_by: None,
            street_closure: None,
            community_board: None,
            created_at: "2025-06-01T12:00:00Z".to_string(),
            updated_at: None,
            comments: Vec::new(),
        };
        let event = row.into_event().unwrap();
        assert_eq!(event.start_at_ms, None);
    }

    #[test]
    fn event_rows_reject_unknown_enums() {
        let row = SurrealEventRow {
            event_id: uuid_v7_without_dashes(),
            name: "bad".to_string(),
            event_type: "Rave".to_string(),
            borough: "Queens".to_string(),
            location: String::new(),
            start_at: None,
            end_at: None,
            is_public: true,
            source: "nyc_open_data".to_string(),
            created_by: None,
            street_closure: None,
            community_board: None,
            created_at: "2025-06-01T12:00:00Z".to_string(),
            updated_at: None,
            comments: Vec::new(),
        };
        assert!(matches!(
            row.into_event().unwrap_err(),
            DomainError::Storage(_)
        ));
    }

    #[test]
    fn timestamp_helpers_round_trip_epoch_ms() {
        assert!(parse_rfc3339("2025-06-01T12:00:00Z").is_ok());
        assert!(parse_rfc3339("junk").is_err());
        assert_eq!(
            parse_rfc3339(&to_rfc3339(1_717_243_200_000).unwrap()).unwrap(),
            1_717_243_200_000
        );
    }
}
