use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::access::{AccessEntry, AccessLevel, AccessPolicy};
use super::ids::{CollectionId, FolderId, ItemId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(rename = "_id")]
    pub id: CollectionId,
    pub name: String,
    pub description: String,
    pub creator_id: UserId,
    pub public: bool,
    pub created: DateTime<Utc>,
}

/// What a folder hangs off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParentType {
    User,
    Collection,
}

impl ParentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParentType::User => "user",
            ParentType::Collection => "collection",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(ParentType::User),
            "collection" => Some(ParentType::Collection),
            _ => None,
        }
    }
}

/// Descriptive fields a study folder carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudyFields {
    pub patient_id: String,
    pub study_date: DateTime<Utc>,
    pub study_modality: String,
}

/// A folder. Studies are folders with `is_study` set and the study fields
/// populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    #[serde(rename = "_id")]
    pub id: FolderId,
    pub name: String,
    pub description: String,
    pub parent_id: Uuid,
    pub parent_collection: ParentType,
    pub creator_id: UserId,
    pub public: bool,
    #[serde(skip)]
    pub access: Vec<AccessEntry>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub is_study: bool,
    pub n_series: i64,
    #[serde(flatten)]
    pub study: Option<StudyFields>,
}

impl Folder {
    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.public, self.access.clone())
    }
}

/// Creation request for a folder. The store applies rename-on-collision when
/// `allow_rename` is set.
#[derive(Debug, Clone)]
pub struct NewFolder {
    pub name: String,
    pub description: String,
    pub parent_id: Uuid,
    pub parent_collection: ParentType,
    pub creator_id: UserId,
    pub public: bool,
    pub allow_rename: bool,
    pub study: Option<StudyFields>,
}

impl NewFolder {
    /// Folder owned by `creator`, who receives admin access on it.
    pub fn into_folder(self, name: String) -> Folder {
        let now = Utc::now();
        Folder {
            id: FolderId::new(),
            name,
            description: self.description,
            parent_id: self.parent_id,
            parent_collection: self.parent_collection,
            creator_id: self.creator_id,
            public: self.public,
            access: vec![AccessEntry {
                user_id: self.creator_id,
                level: AccessLevel::Admin,
            }],
            created: now,
            updated: now,
            is_study: self.study.is_some(),
            n_series: 0,
            study: self.study,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub folder_id: FolderId,
    pub creator_id: UserId,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub is_series: bool,
    pub has_interactive_thumbnail: bool,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub folder_id: FolderId,
    pub creator_id: UserId,
    pub is_series: bool,
}

impl NewItem {
    pub fn into_item(self) -> Item {
        let now = Utc::now();
        Item {
            id: ItemId::new(),
            name: self.name,
            description: self.description,
            folder_id: self.folder_id,
            creator_id: self.creator_id,
            created: now,
            updated: now,
            is_series: self.is_series,
            has_interactive_thumbnail: false,
        }
    }
}

/// Outcome of an atomic `nSeries` adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    Applied(i64),
    /// The decrement would have taken the counter below zero; nothing changed.
    Underflow,
    /// The folder no longer exists.
    Missing,
}

/// Girder-style rename for a colliding sibling: `name (n)`.
pub fn collision_name(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{base} ({attempt})")
    }
}
