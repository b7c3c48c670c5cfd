pub mod access;
pub mod catalog;
pub mod files;
pub mod ids;
pub mod paging;
pub mod users;

pub use access::{AccessEntry, AccessLevel, AccessPolicy};
pub use catalog::{
    Collection, CounterOutcome, Folder, Item, NewFolder, NewItem, ParentType, StudyFields,
};
pub use files::{AttachmentType, FileRecord, Upload};
pub use ids::{CollectionId, FileId, FolderId, ItemId, JobId, UserId};
pub use paging::{Page, SeriesSortField, Sort, SortDirection, StudySortField};
pub use users::{GUEST_LOGIN, SessionRecord, TokenScope, User};
