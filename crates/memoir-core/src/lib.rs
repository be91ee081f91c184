//! Encrypted diary core.
//!
//! Entry text is encrypted at rest (memoir-crypto) and images are bounded and
//! re-encoded before persisting (memoir-image). Queries decrypt to search and
//! paginate in a fixed pipeline. Cached results stay coherent through group
//! version rotation, and outbound email rides a bounded queue drained by a
//! single best-effort worker.
//!
//! HTTP, auth and DI live outside this crate; callers hand every operation an
//! authenticated user id and a cancellation token.

pub mod cache;
pub mod notify;
pub mod query;
pub mod store;

use std::sync::Arc;

use memoir_crypto::ContentCipher;
use memoir_db::Database;
use memoir_types::{DiaryError, Result, UserId};
use tokio_util::sync::CancellationToken;

pub use cache::{DiaryCaches, TtlCache};
pub use notify::{EmailSender, NotificationQueue, NotificationReceiver, run_notification_worker};
pub use query::QueryEngine;
pub use store::EntryStore;

/// The store and query engine wired over one database, cipher and cache set.
pub struct Diary {
    pub store: EntryStore,
    pub query: QueryEngine,
}

impl Diary {
    pub fn new(db: Arc<Database>, cipher: ContentCipher) -> Self {
        let cipher = Arc::new(cipher);
        let caches = Arc::new(DiaryCaches::new());
        Self {
            store: EntryStore::new(db.clone(), cipher.clone(), caches.clone()),
            query: QueryEngine::new(db, cipher, caches),
        }
    }
}

pub(crate) fn ensure_caller(user_id: UserId) -> Result<()> {
    if user_id.is_nil() {
        return Err(DiaryError::Unauthorized);
    }
    Ok(())
}

pub(crate) fn ensure_live(ct: &CancellationToken) -> Result<()> {
    if ct.is_cancelled() {
        return Err(DiaryError::Cancelled);
    }
    Ok(())
}
