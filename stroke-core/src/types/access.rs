use serde::{Deserialize, Serialize};

use super::ids::UserId;
use super::users::User;

/// Permission level on a folder, inherited by its items and their files.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read = 0,
    Write = 1,
    Admin = 2,
}

impl AccessLevel {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            2 => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    pub user_id: UserId,
    pub level: AccessLevel,
}

/// The effective access-control list of a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub public: bool,
    pub entries: Vec<AccessEntry>,
}

impl AccessPolicy {
    pub fn new(public: bool, entries: Vec<AccessEntry>) -> Self {
        Self { public, entries }
    }

    /// Highest level the viewer holds, `None` when it cannot even read.
    pub fn level_for(&self, viewer: Option<&User>) -> Option<AccessLevel> {
        if let Some(user) = viewer {
            if user.admin {
                return Some(AccessLevel::Admin);
            }
            let granted = self
                .entries
                .iter()
                .filter(|entry| entry.user_id == user.id)
                .map(|entry| entry.level)
                .max();
            if granted.is_some() {
                return granted;
            }
        }

        self.public.then_some(AccessLevel::Read)
    }

    pub fn allows(&self, viewer: Option<&User>, level: AccessLevel) -> bool {
        self.level_for(viewer).is_some_and(|held| held >= level)
    }
}
