use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::comments::Comment;
use crate::error::DomainError;
use crate::ports::events::EventRepository;
use crate::util::{is_valid_id, now_ms, uuid_v7_without_dashes};

const MIN_EVENT_NAME_LENGTH: usize = 2;
const MIN_STREET_CLOSURE_LENGTH: usize = 4;

/// Event categories from the NYC permitted-events dataset. Parsing is
/// exact-match on the dataset strings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    #[serde(rename = "Special Event")]
    SpecialEvent,
    #[serde(rename = "Sport - Adult")]
    SportAdult,
    #[serde(rename = "Sport - Youth")]
    SportYouth,
    #[serde(rename = "Production Event")]
    ProductionEvent,
    #[serde(rename = "Open Street Partner Event")]
    OpenStreetPartnerEvent,
    #[serde(rename = "Plaza Partner Event")]
    PlazaPartnerEvent,
    #[serde(rename = "Street Event")]
    StreetEvent,
    #[serde(rename = "Religious Event")]
    ReligiousEvent,
    #[serde(rename = "Farmers Market")]
    FarmersMarket,
    #[serde(rename = "Sidewalk Sale")]
    SidewalkSale,
    #[serde(rename = "Theater Load in and Load Outs")]
    TheaterLoadInAndLoadOuts,
    #[serde(rename = "Parade")]
    Parade,
    #[serde(rename = "Miscellaneous")]
    Miscellaneous,
    #[serde(rename = "Plaza Event")]
    PlazaEvent,
    #[serde(rename = "Block Party")]
    BlockParty,
    #[serde(rename = "Clean-Up")]
    CleanUp,
}

impl EventType {
    pub const ALL: [EventType; 16] = [
        EventType::SpecialEvent,
        EventType::SportAdult,
        EventType::SportYouth,
        EventType::ProductionEvent,
        EventType::OpenStreetPartnerEvent,
        EventType::PlazaPartnerEvent,
        EventType::StreetEvent,
        EventType::ReligiousEvent,
        EventType::FarmersMarket,
        EventType::SidewalkSale,
        EventType::TheaterLoadInAndLoadOuts,
        EventType::Parade,
        EventType::Miscellaneous,
        EventType::PlazaEvent,
        EventType::BlockParty,
        EventType::CleanUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SpecialEvent => "Special Event",
            EventType::SportAdult => "Sport - Adult",
            EventType::SportYouth => "Sport - Youth",
            EventType::ProductionEvent => "Production Event",
            EventType::OpenStreetPartnerEvent => "Open Street Partner Event",
            EventType::PlazaPartnerEvent => "Plaza Partner Event",
            EventType::StreetEvent => "Street Event",
            EventType::ReligiousEvent => "Religious Event",
            EventType::FarmersMarket => "Farmers Market",
            EventType::SidewalkSale => "Sidewalk Sale",
            EventType::TheaterLoadInAndLoadOuts => "Theater Load in and Load Outs",
            EventType::Parade => "Parade",
            EventType::Miscellaneous => "Miscellaneous",
            EventType::PlazaEvent => "Plaza Event",
            EventType::BlockParty => "Block Party",
            EventType::CleanUp => "Clean-Up",
        }
    }
}

impl FromStr for EventType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .find(|candidate| candidate.as_str() == value)
            .copied()
            .ok_or(())
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five fixed geographic partitions. Parsing is case-insensitive.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Borough {
    Manhattan,
    Brooklyn,
    Queens,
    Bronx,
    #[serde(rename = "Staten Island")]
    StatenIsland,
}

impl Borough {
    pub fn as_str(&self) -> &'static str {
        match self {
            Borough::Manhattan => "Manhattan",
            Borough::Brooklyn => "Brooklyn",
            Borough::Queens => "Queens",
            Borough::Bronx => "Bronx",
            Borough::StatenIsland => "Staten Island",
        }
    }
}

impl FromStr for Borough {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "manhattan" => Ok(Borough::Manhattan),
            "brooklyn" => Ok(Borough::Brooklyn),
            "queens" => Ok(Borough::Queens),
            "bronx" => Ok(Borough::Bronx),
            "staten island" => Ok(Borough::StatenIsland),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Borough {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    NycOpenData,
    UserCreated,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::NycOpenData => "nyc_open_data",
            EventSource::UserCreated => "user_created",
        }
    }
}

impl FromStr for EventSource {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "nyc_open_data" => Ok(EventSource::NycOpenData),
            "user_created" => Ok(EventSource::UserCreated),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub name: String,
    pub event_type: EventType,
    pub borough: Borough,
    pub location: String,
    /// Externally seeded rows may carry no resolvable timestamps.
    pub start_at_ms: Option<i64>,
    pub end_at_ms: Option<i64>,
    pub is_public: bool,
    pub source: EventSource,
    pub created_by: Option<String>,
    pub street_closure: Option<String>,
    pub community_board: Option<u32>,
    pub created_at_ms: i64,
    pub updated_at_ms: Option<i64>,
    pub comments: Vec<Comment>,
}

#[derive(Clone, Debug)]
pub struct NewEvent {
    pub name: String,
    pub event_type: String,
    pub location: String,
    pub borough: String,
    pub start_at_ms: i64,
    pub end_at_ms: i64,
    pub publicity: String,
    pub street_closure: Option<String>,
    pub community_board: Option<String>,
}

#[derive(Clone)]
pub struct EventsService {
    events: Arc<dyn EventRepository>,
}

impl EventsService {
    pub fn new(events: Arc<dyn EventRepository>) -> Self {
        Self { events }
    }

    pub async fn create_event(&self, creator_id: &str, input: NewEvent) -> DomainResult<Event> {
        if !is_valid_id(creator_id) {
            return Err(DomainError::InvalidUserId(creator_id.to_string()));
        }
        let name = validate_event_name(&input.name)?;
        let event_type = parse_event_type(&input.event_type)?;
        let borough = parse_borough(&input.borough)?;
        let is_public = parse_publicity(&input.publicity)?;
        let street_closure = input
            .street_closure
            .as_deref()
            .map(validate_street_closure)
            .transpose()?;
        let community_board = input
            .community_board
            .as_deref()
            .map(validate_community_board)
            .transpose()?;
        validate_start_end(input.start_at_ms, input.end_at_ms)?;

        let event = Event {
            event_id: uuid_v7_without_dashes(),
            name,
            event_type,
            borough,
            location: input.location.trim().to_string(),
            start_at_ms: Some(input.start_at_ms),
            end_at_ms: Some(input.end_at_ms),
            is_public,
            source: EventSource::UserCreated,
            created_by: Some(creator_id.trim().to_string()),
            street_closure,
            community_board,
            created_at_ms: now_ms(),
            updated_at_ms: None,
            comments: Vec::new(),
        };
        self.events.create(&event).await
    }

    pub async fn event_by_id(&self, event_id: &str) -> DomainResult<Event> {
        if !is_valid_id(event_id) {
            return Err(DomainError::InvalidEventId(event_id.to_string()));
        }
        self.events
            .find_by_id(event_id.trim())
            .await?
            .ok_or_else(|| DomainError::EventNotFound(event_id.trim().to_string()))
    }

    pub async fn all_events(&self) -> DomainResult<Vec<Event>> {
        self.events.list_all().await
    }
}

pub fn parse_event_type(value: &str) -> DomainResult<EventType> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation("event type is required".into()));
    }
    trimmed.parse::<EventType>().map_err(|_| {
        DomainError::Validation(format!("'{trimmed}' is not a recognized event type"))
    })
}

pub fn parse_borough(value: &str) -> DomainResult<Borough> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation("borough is required".into()));
    }
    trimmed.parse::<Borough>().map_err(|_| {
        DomainError::Validation(
            "borough must be Manhattan, Brooklyn, Queens, Bronx, or Staten Island".into(),
        )
    })
}

/// "public"/"private", case-insensitive. Returns true for public.
pub fn parse_publicity(value: &str) -> DomainResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "public" => Ok(true),
        "private" => Ok(false),
        _ => Err(DomainError::Validation(
            "publicity must be public or private".into(),
        )),
    }
}

fn validate_event_name(value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.len() < MIN_EVENT_NAME_LENGTH {
        return Err(DomainError::Validation(format!(
            "event name must be at least {MIN_EVENT_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_street_closure(value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.len() < MIN_STREET_CLOSURE_LENGTH {
        return Err(DomainError::Validation(format!(
            "street closure must be at least {MIN_STREET_CLOSURE_LENGTH} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_community_board(value: &str) -> DomainResult<u32> {
    let parsed = value.trim().parse::<u32>().map_err(|_| {
        DomainError::Validation("community board must be a positive integer".into())
    })?;
    if parsed == 0 {
        return Err(DomainError::Validation(
            "community board must be a positive integer".into(),
        ));
    }
    Ok(parsed)
}

fn validate_start_end(start_at_ms: i64, end_at_ms: i64) -> DomainResult<()> {
    if start_at_ms >= end_at_ms {
        return Err(DomainError::Validation(
            "event start must be before event end".into(),
        ));
    }
    Ok(())
}
