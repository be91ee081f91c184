pub mod error;
pub mod models;

pub use error::{DiaryError, Result};
pub use models::{
    DiaryEntry, EntryImage, EntryView, EntryWithImageId, NotificationJob, PaginatedEntries,
    QueryParams, SortBy, UserId,
};
