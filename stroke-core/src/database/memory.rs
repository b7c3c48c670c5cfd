//! Process-local entity store.
//!
//! All state sits behind one `RwLock`, so every port call is atomic with
//! respect to every other one. Used when no `DATABASE_URL` is configured and
//! throughout the test suites.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::{
    database::ports::{
        collections::CollectionsRepository,
        files::FilesRepository,
        folders::FoldersRepository,
        items::{DeletedItem, ItemFilter, ItemsRepository},
        sessions::SessionsRepository,
        settings::SettingsRepository,
        users::UsersRepository,
    },
    error::{CatalogError, Result},
    types::{
        AccessEntry, AccessLevel, Collection, CollectionId, CounterOutcome, FileId, FileRecord,
        Folder, FolderId, Item, ItemId, NewFolder, NewItem, Page, SeriesSortField, SessionRecord,
        Sort, SortDirection, StudySortField, User, UserId, catalog::collision_name,
    },
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    sessions: HashMap<String, SessionRecord>,
    collections: HashMap<CollectionId, Collection>,
    folders: HashMap<FolderId, Folder>,
    items: HashMap<ItemId, Item>,
    files: HashMap<FileId, FileRecord>,
    settings: HashMap<String, Value>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryStore")
            .field("users", &state.users.len())
            .field("folders", &state.folders.len())
            .field("items", &state.items.len())
            .field("files", &state.files.len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

fn compare_studies(a: &Folder, b: &Folder, field: StudySortField) -> Ordering {
    let by_field = match field {
        StudySortField::PatientId => a
            .study
            .as_ref()
            .map(|s| &s.patient_id)
            .cmp(&b.study.as_ref().map(|s| &s.patient_id)),
        StudySortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        StudySortField::StudyDate => a
            .study
            .as_ref()
            .map(|s| s.study_date)
            .cmp(&b.study.as_ref().map(|s| s.study_date)),
        StudySortField::StudyModality => a
            .study
            .as_ref()
            .map(|s| &s.study_modality)
            .cmp(&b.study.as_ref().map(|s| &s.study_modality)),
        StudySortField::NSeries => a.n_series.cmp(&b.n_series),
        StudySortField::Created => a.created.cmp(&b.created),
    };
    by_field.then_with(|| a.id.cmp(&b.id))
}

fn compare_items(a: &Item, b: &Item, field: SeriesSortField) -> Ordering {
    let by_field = match field {
        SeriesSortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SeriesSortField::Created => a.created.cmp(&b.created),
    };
    by_field.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl FoldersRepository for MemoryStore {
    async fn create_folder(&self, folder: NewFolder) -> Result<Folder> {
        let mut state = self.state.write();

        let taken = |name: &str, state: &MemoryState| {
            state.folders.values().any(|existing| {
                existing.parent_id == folder.parent_id
                    && existing.parent_collection == folder.parent_collection
                    && existing.name == name
            })
        };

        let base = folder.name.trim().to_string();
        let mut attempt = 0;
        let name = loop {
            let candidate = collision_name(&base, attempt);
            if !taken(&candidate, &state) {
                break candidate;
            }
            if !folder.allow_rename {
                return Err(CatalogError::conflict(format!(
                    "a folder named {base} already exists here"
                )));
            }
            attempt += 1;
        };

        let created = folder.into_folder(name);
        state.folders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_folder(&self, id: FolderId) -> Result<Option<Folder>> {
        Ok(self.state.read().folders.get(&id).cloned())
    }

    async fn list_studies(
        &self,
        viewer: Option<&User>,
        sort: Sort<StudySortField>,
        page: Page,
    ) -> Result<Vec<Folder>> {
        let state = self.state.read();
        let mut studies: Vec<Folder> = state
            .folders
            .values()
            .filter(|folder| folder.is_study)
            .filter(|folder| folder.policy().allows(viewer, AccessLevel::Read))
            .cloned()
            .collect();
        studies.sort_by(|a, b| directed(compare_studies(a, b, sort.field), sort.direction));
        Ok(page.slice(studies))
    }

    async fn adjust_series_count(&self, id: FolderId, delta: i64) -> Result<CounterOutcome> {
        let mut state = self.state.write();
        let Some(folder) = state.folders.get_mut(&id) else {
            return Ok(CounterOutcome::Missing);
        };
        let next = folder.n_series + delta;
        if next < 0 {
            return Ok(CounterOutcome::Underflow);
        }
        folder.n_series = next;
        folder.updated = Utc::now();
        Ok(CounterOutcome::Applied(next))
    }

    async fn grant_access(&self, id: FolderId, user: UserId, level: AccessLevel) -> Result<()> {
        let mut state = self.state.write();
        let folder = state
            .folders
            .get_mut(&id)
            .ok_or_else(|| CatalogError::not_found(format!("folder {id}")))?;
        folder.access.retain(|entry| entry.user_id != user);
        folder.access.push(AccessEntry {
            user_id: user,
            level,
        });
        Ok(())
    }
}

#[async_trait]
impl ItemsRepository for MemoryStore {
    async fn create_item(&self, item: NewItem) -> Result<Item> {
        let mut state = self.state.write();
        if !state.folders.contains_key(&item.folder_id) {
            return Err(CatalogError::not_found(format!("folder {}", item.folder_id)));
        }
        let created = item.into_item();
        state.items.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self.state.read().items.get(&id).cloned())
    }

    async fn list_child_items(
        &self,
        folder: FolderId,
        filter: ItemFilter,
        sort: Sort<SeriesSortField>,
        page: Page,
    ) -> Result<Vec<Item>> {
        let state = self.state.read();
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|item| item.folder_id == folder)
            .filter(|item| !filter.series_only || item.is_series)
            .cloned()
            .collect();
        items.sort_by(|a, b| directed(compare_items(a, b, sort.field), sort.direction));
        Ok(page.slice(items))
    }

    async fn count_child_items(&self, folder: FolderId, filter: ItemFilter) -> Result<i64> {
        let state = self.state.read();
        let count = state
            .items
            .values()
            .filter(|item| item.folder_id == folder)
            .filter(|item| !filter.series_only || item.is_series)
            .count();
        Ok(count as i64)
    }

    async fn set_thumbnail_flag(&self, id: ItemId, value: bool) -> Result<bool> {
        let mut state = self.state.write();
        match state.items.get_mut(&id) {
            Some(item) => {
                item.has_interactive_thumbnail = value;
                item.updated = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_item(&self, id: ItemId) -> Result<Option<DeletedItem>> {
        let mut state = self.state.write();
        let Some(item) = state.items.remove(&id) else {
            return Ok(None);
        };
        let owned: Vec<FileId> = state
            .files
            .values()
            .filter(|file| file.item_id == Some(id))
            .map(|file| file.id)
            .collect();
        let files = owned
            .iter()
            .filter_map(|file| state.files.remove(file))
            .collect();
        Ok(Some(DeletedItem { item, files }))
    }
}

#[async_trait]
impl FilesRepository for MemoryStore {
    async fn create_file(&self, file: FileRecord) -> Result<FileRecord> {
        let mut state = self.state.write();
        if let Some(item) = file.item_id
            && !state.items.contains_key(&item)
        {
            return Err(CatalogError::not_found(format!("item {item}")));
        }
        state.files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn get_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        Ok(self.state.read().files.get(&id).cloned())
    }

    async fn save_file(&self, file: &FileRecord) -> Result<FileRecord> {
        let mut state = self.state.write();
        match state.files.get_mut(&file.id) {
            Some(stored) => {
                *stored = file.clone();
                Ok(file.clone())
            }
            None => Err(CatalogError::not_found(format!("file {}", file.id))),
        }
    }

    async fn list_item_files(&self, item: ItemId) -> Result<Vec<FileRecord>> {
        let state = self.state.read();
        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|file| file.item_id == Some(item))
            .cloned()
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(files)
    }

    async fn list_attached(&self, item: ItemId) -> Result<Vec<FileRecord>> {
        let state = self.state.read();
        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|file| file.is_attached_to_item(item))
            .cloned()
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(files)
    }

    async fn find_artifact(&self, item: ItemId, uid: &str) -> Result<Option<FileRecord>> {
        let state = self.state.read();
        Ok(state
            .files
            .values()
            .find(|file| {
                file.is_attached_to_item(item)
                    && file.interactive_thumbnails_uid.as_deref() == Some(uid)
            })
            .cloned())
    }

    async fn delete_file(&self, id: FileId) -> Result<Option<FileRecord>> {
        Ok(self.state.write().files.remove(&id))
    }

    async fn count_by_sha256(&self, sha256: &str) -> Result<i64> {
        let state = self.state.read();
        Ok(state.files.values().filter(|f| f.sha256 == sha256).count() as i64)
    }
}

#[async_trait]
impl UsersRepository for MemoryStore {
    async fn create_user(&self, user: User) -> Result<User> {
        let mut state = self.state.write();
        if state.users.values().any(|u| u.login == user.login) {
            return Err(CatalogError::conflict(format!(
                "login {} is already taken",
                user.login
            )));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    async fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let login = login.trim().to_lowercase();
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.login == login)
            .cloned())
    }

    async fn count_users(&self) -> Result<i64> {
        Ok(self.state.read().users.len() as i64)
    }
}

#[async_trait]
impl SessionsRepository for MemoryStore {
    async fn create_session(&self, session: SessionRecord) -> Result<()> {
        self.state
            .write()
            .sessions
            .insert(session.token_hash.clone(), session);
        Ok(())
    }

    async fn get_session(&self, token_hash: &str) -> Result<Option<SessionRecord>> {
        Ok(self.state.read().sessions.get(token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool> {
        Ok(self.state.write().sessions.remove(token_hash).is_some())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write();
        let before = state.sessions.len();
        state.sessions.retain(|_, session| !session.is_expired(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[async_trait]
impl CollectionsRepository for MemoryStore {
    async fn create_collection(&self, collection: Collection) -> Result<Collection> {
        let mut state = self.state.write();
        if state
            .collections
            .values()
            .any(|existing| existing.name == collection.name)
        {
            return Err(CatalogError::conflict(format!(
                "a collection named {} already exists",
                collection.name
            )));
        }
        state.collections.insert(collection.id, collection.clone());
        Ok(collection)
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        Ok(self.state.read().collections.get(&id).cloned())
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.state.read().settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: Value) -> Result<()> {
        self.state.write().settings.insert(key.to_string(), value);
        Ok(())
    }

    async fn unset_setting(&self, key: &str) -> Result<()> {
        self.state.write().settings.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParentType, StudyFields};

    fn study(owner: &User, name: &str, public: bool) -> NewFolder {
        NewFolder {
            name: name.into(),
            description: String::new(),
            parent_id: owner.id.as_uuid(),
            parent_collection: ParentType::User,
            creator_id: owner.id,
            public,
            allow_rename: true,
            study: Some(StudyFields {
                patient_id: name.into(),
                study_date: Utc::now(),
                study_modality: "CT".into(),
            }),
        }
    }

    #[tokio::test]
    async fn colliding_folder_names_are_renamed() {
        let store = MemoryStore::new();
        let owner = User::new("owner", "o@example.org", "O", "Wner", false);

        let first = store.create_folder(study(&owner, "P001", false)).await.unwrap();
        let second = store.create_folder(study(&owner, "P001", false)).await.unwrap();
        let third = store.create_folder(study(&owner, "P001", false)).await.unwrap();

        assert_eq!(first.name, "P001");
        assert_eq!(second.name, "P001 (1)");
        assert_eq!(third.name, "P001 (2)");
    }

    #[tokio::test]
    async fn collision_without_rename_conflicts() {
        let store = MemoryStore::new();
        let owner = User::new("owner", "o@example.org", "O", "Wner", false);
        store.create_folder(study(&owner, "P001", false)).await.unwrap();

        let mut again = study(&owner, "P001", false);
        again.allow_rename = false;
        let err = store.create_folder(again).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn series_counter_refuses_underflow() {
        let store = MemoryStore::new();
        let owner = User::new("owner", "o@example.org", "O", "Wner", false);
        let folder = store.create_folder(study(&owner, "P001", false)).await.unwrap();

        assert_eq!(
            store.adjust_series_count(folder.id, 1).await.unwrap(),
            CounterOutcome::Applied(1)
        );
        assert_eq!(
            store.adjust_series_count(folder.id, -1).await.unwrap(),
            CounterOutcome::Applied(0)
        );
        assert_eq!(
            store.adjust_series_count(folder.id, -1).await.unwrap(),
            CounterOutcome::Underflow
        );
        assert_eq!(
            store.adjust_series_count(FolderId::new(), 1).await.unwrap(),
            CounterOutcome::Missing
        );
    }

    #[tokio::test]
    async fn listing_filters_by_permission_before_paging() {
        let store = MemoryStore::new();
        let owner = User::new("owner", "o@example.org", "O", "Wner", false);
        store.create_folder(study(&owner, "A", false)).await.unwrap();
        store.create_folder(study(&owner, "B", true)).await.unwrap();
        store.create_folder(study(&owner, "C", true)).await.unwrap();

        let anonymous = store
            .list_studies(None, Sort::ascending(StudySortField::PatientId), Page::new(Some(1), Some(1)))
            .await
            .unwrap();
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].name, "C");

        let mine = store
            .list_studies(Some(&owner), Sort::ascending(StudySortField::PatientId), Page::default())
            .await
            .unwrap();
        assert_eq!(mine.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_login_conflicts() {
        let store = MemoryStore::new();
        store
            .create_user(User::new("Guest", "g@example.org", "G", "U", false))
            .await
            .unwrap();
        let err = store
            .create_user(User::new("guest", "other@example.org", "G", "U", false))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleting_an_item_takes_its_own_files() {
        let store = MemoryStore::new();
        let owner = store
            .create_user(User::new("owner", "o@example.org", "O", "Wner", false))
            .await
            .unwrap();
        let folder = store.create_folder(study(&owner, "P001", false)).await.unwrap();
        let item = store
            .create_item(NewItem {
                name: "S1".into(),
                description: String::new(),
                folder_id: folder.id,
                creator_id: owner.id,
                is_series: true,
            })
            .await
            .unwrap();
        let upload = crate::types::Upload {
            item_id: item.id,
            name: "scan.dcm".into(),
            mime_type: "application/dicom".into(),
            size: 4,
            creator_id: Some(owner.id),
            reference: None,
        };
        let file = store.create_file(upload.to_file("ab".repeat(32))).await.unwrap();

        let deleted = store.delete_item(item.id).await.unwrap().unwrap();
        assert_eq!(deleted.item.id, item.id);
        assert_eq!(deleted.files, vec![file.clone()]);
        assert!(store.get_file(file.id).await.unwrap().is_none());
        assert!(store.delete_item(item.id).await.unwrap().is_none());
    }
}
