//! Core data models for cohort.
//!
//! These types are shared across all cohort crates and represent the two
//! entity populations (profiles and collaboration postings), the transient
//! match candidates produced from them, and the persisted notification
//! dedup records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Entity population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    Posting,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Profile => "profile",
            EntityKind::Posting => "posting",
        }
    }

    /// The opposite population.
    pub fn other(&self) -> EntityKind {
        match self {
            EntityKind::Profile => EntityKind::Posting,
            EntityKind::Posting => EntityKind::Profile,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "profile" => Ok(EntityKind::Profile),
            "posting" => Ok(EntityKind::Posting),
            other => Err(Error::Serialization(format!(
                "unknown entity kind: {}",
                other
            ))),
        }
    }
}

/// Lifecycle visibility of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Hidden,
    Published,
    Verified,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Hidden => "hidden",
            Visibility::Published => "published",
            Visibility::Verified => "verified",
        }
    }

    /// Whether entities in this state may appear in matches and KNN results.
    pub fn is_publishable(&self) -> bool {
        matches!(self, Visibility::Published | Visibility::Verified)
    }

    /// All states that pass [`Visibility::is_publishable`], as stored strings.
    pub fn publishable_strs() -> Vec<String> {
        vec![
            Visibility::Published.as_str().to_string(),
            Visibility::Verified.as_str().to_string(),
        ]
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hidden" => Ok(Visibility::Hidden),
            "published" => Ok(Visibility::Published),
            "verified" => Ok(Visibility::Verified),
            other => Err(Error::Serialization(format!(
                "unknown visibility: {}",
                other
            ))),
        }
    }
}

/// A profile or collaboration posting, as read by the core.
///
/// Entities are created and edited elsewhere; the core only reads them and
/// stamps `embedding_updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub kind: EntityKind,
    /// Display name (profiles).
    pub name: Option<String>,
    /// Headline (profiles) or posting title.
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Skills for profiles, required skills for postings.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Interests (profiles only).
    #[serde(default)]
    pub interests: Vec<String>,
    /// Required category (postings only).
    pub category: Option<String>,
    pub visibility: Visibility,
    /// Delivery destination (chat id, address) for profiles.
    pub contact: Option<String>,
    /// Image reference attached to notifications about this entity.
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub embedding_updated_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// New profile with only the required name set.
    pub fn profile(id: Uuid, name: impl Into<String>) -> Self {
        Self::empty(id, EntityKind::Profile).with_name(name)
    }

    /// New posting with its required category, title, and description set.
    pub fn posting(
        id: Uuid,
        category: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut entity = Self::empty(id, EntityKind::Posting)
            .with_title(title)
            .with_description(description);
        entity.category = Some(category.into());
        entity
    }

    fn empty(id: Uuid, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            name: None,
            title: None,
            description: None,
            location: None,
            tags: Vec::new(),
            interests: Vec::new(),
            category: None,
            visibility: Visibility::Published,
            contact: None,
            image_ref: None,
            created_at: Utc::now(),
            embedding_updated_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests = interests.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_publishable(&self) -> bool {
        self.visibility.is_publishable()
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding_updated_at.is_some()
    }

    /// Whether every text field required to build an embedding is present.
    ///
    /// Profiles need a name; postings need a title and a description.
    pub fn has_required_text(&self) -> bool {
        fn present(field: &Option<String>) -> bool {
            field.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
        match self.kind {
            EntityKind::Profile => present(&self.name),
            EntityKind::Posting => present(&self.title) && present(&self.description),
        }
    }

    /// Short human label for logs and notification text.
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("(untitled)")
    }
}

/// Selection criteria for entities that still need an embedding.
#[derive(Debug, Clone)]
pub struct PendingEmbeddingFilter {
    /// Populations to scan.
    pub kinds: Vec<EntityKind>,
    /// Restrict to these visibility states (empty = any state).
    pub visibilities: Vec<Visibility>,
    /// Maximum rows (0 = unbounded).
    pub limit: usize,
}

impl PendingEmbeddingFilter {
    pub fn new(kinds: Vec<EntityKind>) -> Self {
        Self {
            kinds,
            visibilities: Vec::new(),
            limit: 0,
        }
    }

    pub fn with_visibilities(mut self, visibilities: Vec<Visibility>) -> Self {
        self.visibilities = visibilities;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether an entity satisfies the filter.
    ///
    /// Store implementations push this into their query; the in-memory store
    /// evaluates it directly.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.kinds.contains(&entity.kind)
            && !entity.has_embedding()
            && entity.has_required_text()
            && (self.visibilities.is_empty() || self.visibilities.contains(&entity.visibility))
    }
}

// =============================================================================
// VECTOR SEARCH TYPES
// =============================================================================

/// A single KNN result: entity and L2 distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub entity_id: Uuid,
    pub kind: EntityKind,
    pub distance: f32,
}

// =============================================================================
// MATCHING TYPES
// =============================================================================

/// Strategy that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Categorical,
    Similarity,
}

/// Transient (recipient, subject) pair produced by the matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub recipient_id: Uuid,
    pub subject_id: Uuid,
    pub source: MatchSource,
    /// L2 distance for similarity matches.
    pub distance: Option<f32>,
}

impl MatchCandidate {
    pub fn categorical(recipient_id: Uuid, subject_id: Uuid) -> Self {
        Self {
            recipient_id,
            subject_id,
            source: MatchSource::Categorical,
            distance: None,
        }
    }

    pub fn similarity(recipient_id: Uuid, subject_id: Uuid, distance: f32) -> Self {
        Self {
            recipient_id,
            subject_id,
            source: MatchSource::Similarity,
            distance: Some(distance),
        }
    }
}

// =============================================================================
// NOTIFICATION TYPES
// =============================================================================

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A posting matching the recipient's tags was published.
    CollabPublished,
    /// A posting close to the recipient in embedding space was published.
    CollabSuggested,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CollabPublished => "collab_published",
            NotificationKind::CollabSuggested => "collab_suggested",
        }
    }

    /// Kind used for candidates from the given strategy.
    pub fn for_source(source: MatchSource) -> Self {
        match source {
            MatchSource::Categorical => NotificationKind::CollabPublished,
            MatchSource::Similarity => NotificationKind::CollabSuggested,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "collab_published" => Ok(NotificationKind::CollabPublished),
            "collab_suggested" => Ok(NotificationKind::CollabSuggested),
            other => Err(Error::Serialization(format!(
                "unknown notification kind: {}",
                other
            ))),
        }
    }
}

/// Dedup key: at most one record exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub subject_id: Uuid,
}

impl NotificationKey {
    pub fn new(recipient_id: Uuid, kind: NotificationKind, subject_id: Uuid) -> Self {
        Self {
            recipient_id,
            kind,
            subject_id,
        }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.recipient_id, self.kind, self.subject_id)
    }
}

/// Delivery state of a key. A key with no record is `Unsent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    Unsent,
    Created,
    Sent,
}

/// Insert payload for a dedup record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub key: NotificationKey,
    pub text: String,
    pub image_ref: Option<String>,
}

/// Persisted dedup record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub key: NotificationKey,
    pub created_at: DateTime<Utc>,
    /// Null until delivery is confirmed.
    pub sent_at: Option<DateTime<Utc>>,
    pub text: String,
    pub image_ref: Option<String>,
}

impl NotificationRecord {
    pub fn state(&self) -> NotificationState {
        if self.sent_at.is_some() {
            NotificationState::Sent
        } else {
            NotificationState::Created
        }
    }
}

/// State of an optional record.
pub fn notification_state(record: Option<&NotificationRecord>) -> NotificationState {
    record.map_or(NotificationState::Unsent, NotificationRecord::state)
}

// =============================================================================
// DELIVERY TYPES
// =============================================================================

/// Message handed to a delivery channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Destination address (chat id, handle).
    pub destination: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trip_strings() {
        assert_eq!(
            "profile".parse::<EntityKind>().unwrap(),
            EntityKind::Profile
        );
        assert_eq!(EntityKind::Posting.to_string(), "posting");
        assert!("team".parse::<EntityKind>().is_err());
        assert_eq!(EntityKind::Profile.other(), EntityKind::Posting);
    }

    #[test]
    fn test_visibility_publishable() {
        assert!(!Visibility::Hidden.is_publishable());
        assert!(Visibility::Published.is_publishable());
        assert!(Visibility::Verified.is_publishable());
        assert_eq!(
            Visibility::publishable_strs(),
            vec!["published".to_string(), "verified".to_string()]
        );
    }

    #[test]
    fn test_required_text_profile() {
        let id = Uuid::new_v4();
        assert!(Entity::profile(id, "Ann").has_required_text());
        assert!(!Entity::profile(id, "   ").has_required_text());
    }

    #[test]
    fn test_required_text_posting() {
        let id = Uuid::new_v4();
        let posting = Entity::posting(id, "design", "Logo", "Need a logo");
        assert!(posting.has_required_text());

        let mut missing = posting.clone();
        missing.description = None;
        assert!(!missing.has_required_text());
    }

    #[test]
    fn test_pending_filter_matches() {
        let profile = Entity::profile(Uuid::new_v4(), "Ann");
        let filter = PendingEmbeddingFilter::new(vec![EntityKind::Profile]);
        assert!(filter.matches(&profile));

        let mut embedded = profile.clone();
        embedded.embedding_updated_at = Some(Utc::now());
        assert!(!filter.matches(&embedded));

        let postings_only = PendingEmbeddingFilter::new(vec![EntityKind::Posting]);
        assert!(!postings_only.matches(&profile));

        let verified_only = PendingEmbeddingFilter::new(vec![EntityKind::Profile])
            .with_visibilities(vec![Visibility::Verified]);
        assert!(!verified_only.matches(&profile));
    }

    #[test]
    fn test_notification_kind_strings() {
        assert_eq!(
            NotificationKind::CollabPublished.to_string(),
            "collab_published"
        );
        assert_eq!(
            "collab_suggested".parse::<NotificationKind>().unwrap(),
            NotificationKind::CollabSuggested
        );
        assert_eq!(
            NotificationKind::for_source(MatchSource::Categorical),
            NotificationKind::CollabPublished
        );
        let json = serde_json::to_string(&NotificationKind::CollabPublished).unwrap();
        assert_eq!(json, "\"collab_published\"");
    }

    #[test]
    fn test_notification_state() {
        let key = NotificationKey::new(
            Uuid::new_v4(),
            NotificationKind::CollabPublished,
            Uuid::new_v4(),
        );
        let mut record = NotificationRecord {
            key,
            created_at: Utc::now(),
            sent_at: None,
            text: "hi".into(),
            image_ref: None,
        };
        assert_eq!(notification_state(None), NotificationState::Unsent);
        assert_eq!(
            notification_state(Some(&record)),
            NotificationState::Created
        );
        record.sent_at = Some(Utc::now());
        assert_eq!(record.state(), NotificationState::Sent);
    }

    #[test]
    fn test_outbound_message_skips_empty_optionals() {
        let msg = OutboundMessage {
            destination: "42".into(),
            text: "hello".into(),
            image_ref: None,
            action_link: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("image_ref").is_none());
        assert_eq!(json["destination"], "42");
    }
}
