//! Sitewatch engine: page sessions, the site store and the scan cycle.
mod decode;
mod fetch;
mod notify;
mod persist;
mod retry;
mod scan;
mod store;
mod types;

pub use fetch::{FetchSettings, HttpSession, HttpSessionProvider, PageSession, SessionProvider};
pub use notify::{LogNotifier, Notifier, NotifyError, OutboxNotifier};
pub use persist::{ensure_dir, write_atomic, PersistError};
pub use retry::{
    retry_task, AttemptFailure, RetryOutcome, RetryPolicy, ScanTask, DEFAULT_MAX_ATTEMPTS,
};
pub use scan::{AbandonedSite, CycleError, CycleReport, PendingPolicy, ScanSettings, Scanner};
pub use store::{LocalStore, SiteChange, SiteRecord, SiteStore, StoreError};
pub use types::{FailureKind, FetchError, ScanError, ScanStage};
