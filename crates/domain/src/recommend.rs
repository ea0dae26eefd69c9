use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::DomainResult;
use crate::error::DomainError;
use crate::event::{Borough, Event, EventType};
use crate::ports::events::EventRepository;
use crate::ports::users::UserRepository;
use crate::user::UserProfile;
use crate::util::{is_valid_id, now_ms};

pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 5;

const STATED_PREFERENCE_WEIGHT: i32 = 2;
const HISTORY_AFFINITY_WEIGHT: i32 = 1;

/// How much of the saved-event history feeds the affinity tables.
/// `WholeHistory` lets preference drift decay slowly; `MostRecent(n)`
/// reproduces the sharper tail-only weighting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryWindow {
    WholeHistory,
    MostRecent(usize),
}

impl Default for HistoryWindow {
    fn default() -> Self {
        HistoryWindow::WholeHistory
    }
}

/// Blends a stated-preference signal, a frequency signal over the saved
/// history, and shuffled backfill so a result is never empty while any
/// future event remains and never starves on sparse data.
#[derive(Clone, Debug, Default)]
pub struct RecommendationEngine {
    history_window: HistoryWindow,
}

impl RecommendationEngine {
    pub fn new(history_window: HistoryWindow) -> Self {
        Self { history_window }
    }

    /// Scores the candidate set for one user. The result holds at most
    /// `limit` events, each distinct, none already saved, and every one
    /// starting strictly after now. Ties keep candidate input order;
    /// randomness only enters through the backfill shuffle.
    pub fn recommend(
        &self,
        user: &UserProfile,
        candidates: &[Event],
        limit: usize,
        rng: &mut impl Rng,
    ) -> Vec<Event> {
        if limit == 0 {
            return Vec::new();
        }
        let now = now_ms();
        let saved: HashSet<&str> = user.saved_event_ids.iter().map(String::as_str).collect();

        let mut seen: HashSet<&str> = HashSet::new();
        let future: Vec<&Event> = candidates
            .iter()
            .filter(|event| {
                event.start_at_ms.is_some_and(|start| start > now)
                    && !saved.contains(event.event_id.as_str())
                    && seen.insert(event.event_id.as_str())
            })
            .collect();

        let (top_types, top_boroughs) = self.affinity_tables(user, candidates);

        let mut scored: Vec<(i32, &Event)> = future
            .iter()
            .map(|event| {
                let mut score = 0;
                if user.favorite_event_type == Some(event.event_type) {
                    score += STATED_PREFERENCE_WEIGHT;
                }
                if user.home_borough == Some(event.borough) {
                    score += STATED_PREFERENCE_WEIGHT;
                }
                if top_types.contains(&event.event_type) {
                    score += HISTORY_AFFINITY_WEIGHT;
                }
                if top_boroughs.contains(&event.borough) {
                    score += HISTORY_AFFINITY_WEIGHT;
                }
                (score, *event)
            })
            .collect();
        // Stable sort: equal scores keep the candidate set's input order.
        scored.sort_by(|left, right| right.0.cmp(&left.0));

        let mut picked: Vec<Event> = scored
            .iter()
            .filter(|(score, _)| *score > 0)
            .take(limit)
            .map(|(_, event)| (*event).clone())
            .collect();

        if picked.len() < limit {
            let chosen: HashSet<&str> =
                picked.iter().map(|event| event.event_id.as_str()).collect();
            let mut pool: Vec<&Event> = future
                .iter()
                .copied()
                .filter(|event| !chosen.contains(event.event_id.as_str()))
                .collect();
            pool.shuffle(rng);
            let missing = limit - picked.len();
            picked.extend(pool.into_iter().take(missing).cloned());
        }
        picked
    }

    /// Frequency tables over the saved events that exist in the candidate
    /// set, reduced to the key(s) tied for the highest count. Empty history
    /// yields empty sets, which contribute nothing to any score.
    fn affinity_tables(
        &self,
        user: &UserProfile,
        candidates: &[Event],
    ) -> (HashSet<EventType>, HashSet<Borough>) {
        let by_id: HashMap<&str, &Event> = candidates
            .iter()
            .map(|event| (event.event_id.as_str(), event))
            .collect();

        let mut type_counts: HashMap<EventType, usize> = HashMap::new();
        let mut borough_counts: HashMap<Borough, usize> = HashMap::new();
        for saved_id in self.history_ids(user) {
            if let Some(event) = by_id.get(saved_id.as_str()) {
                *type_counts.entry(event.event_type).or_default() += 1;
                *borough_counts.entry(event.borough).or_default() += 1;
            }
        }
        (argmax_keys(&type_counts), argmax_keys(&borough_counts))
    }

    fn history_ids<'a>(&self, user: &'a UserProfile) -> &'a [String] {
        match self.history_window {
            HistoryWindow::WholeHistory => &user.saved_event_ids,
            HistoryWindow::MostRecent(window) => {
                let len = user.saved_event_ids.len();
                &user.saved_event_ids[len.saturating_sub(window)..]
            }
        }
    }
}

fn argmax_keys<K: Copy + Eq + Hash>(counts: &HashMap<K, usize>) -> HashSet<K> {
    let Some(max) = counts.values().copied().max() else {
        return HashSet::new();
    };
    counts
        .iter()
        .filter(|(_, count)| **count == max)
        .map(|(key, _)| *key)
        .collect()
}

#[derive(Clone)]
pub struct RecommendationService {
    users: Arc<dyn UserRepository>,
    events: Arc<dyn EventRepository>,
    engine: RecommendationEngine,
}

impl RecommendationService {
    pub fn new(users: Arc<dyn UserRepository>, events: Arc<dyn EventRepository>) -> Self {
        Self::with_engine(users, events, RecommendationEngine::default())
    }

    pub fn with_engine(
        users: Arc<dyn UserRepository>,
        events: Arc<dyn EventRepository>,
        engine: RecommendationEngine,
    ) -> Self {
        Self {
            users,
            events,
            engine,
        }
    }

    /// Resolves the profile and scores the full candidate set. An unknown
    /// user id is an error, never an empty list.
    pub async fn recommended_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<Event>> {
        if !is_valid_id(user_id) {
            return Err(DomainError::InvalidUserId(user_id.to_string()));
        }
        let user_id = user_id.trim();
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(user_id.to_string()))?;
        let candidates = self.events.list_all().await?;
        let mut rng = rand::thread_rng();
        Ok(self.engine.recommend(&user, &candidates, limit, &mut rng))
    }
}
