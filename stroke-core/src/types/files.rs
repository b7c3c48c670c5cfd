use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{FileId, ItemId, UserId};

/// Kind of entity a file is attached to outside item ownership.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentType {
    Item,
}

impl AttachmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentType::Item => "item",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "item" => Some(AttachmentType::Item),
            _ => None,
        }
    }
}

/// A stored file. Ordinary files belong to an item through `item_id`;
/// artifacts have `item_id == None` and point at their item through the
/// attachment pair instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "_id")]
    pub id: FileId,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub sha256: String,
    pub item_id: Option<ItemId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attached_to_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attached_to_type: Option<AttachmentType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub interactive_thumbnails_uid: Option<String>,
    pub creator_id: Option<UserId>,
    pub created: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_artifact(&self) -> bool {
        self.interactive_thumbnails_uid.is_some()
    }

    pub fn is_attached_to_item(&self, item: ItemId) -> bool {
        self.attached_to_type == Some(AttachmentType::Item)
            && self.attached_to_id == Some(item.as_uuid())
    }

    /// Move the file off item ownership and onto a direct item attachment.
    pub fn reparent_as_artifact(&mut self, item: ItemId) {
        self.interactive_thumbnails_uid = Some(self.name.clone());
        self.attached_to_id = Some(item.as_uuid());
        self.attached_to_type = Some(AttachmentType::Item);
        self.item_id = None;
    }
}

/// A completed upload request: where the bytes went and what the caller
/// said about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub item_id: ItemId,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub creator_id: Option<UserId>,
    /// Opaque caller-supplied reference, usually JSON.
    pub reference: Option<String>,
}

impl Upload {
    pub fn to_file(&self, sha256: String) -> FileRecord {
        FileRecord {
            id: FileId::new(),
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            sha256,
            item_id: Some(self.item_id),
            attached_to_id: None,
            attached_to_type: None,
            interactive_thumbnails_uid: None,
            creator_id: self.creator_id,
            created: Utc::now(),
        }
    }
}
