//! Sitewatch core: page classification, fingerprinting and change detection.
mod classify;
mod digest;
mod dom;
mod error;
mod fingerprint;
mod links;
mod sanitize;
mod schedule;

pub use classify::find_element_with_most_direct_text;
pub use digest::{compose_digest, time_difference_description, Digest, SiteOutcome};
pub use dom::{Content, Document, Node, NodeId, Page};
pub use error::{ExtractError, FingerprintError};
pub use fingerprint::{
    apply_extraction, comparer, is_content_dominant, quick_extract, ExtractionSettings,
    Fingerprint, Strategy, DEFAULT_CONTENT_RATIO,
};
pub use links::get_internal_links;
pub use sanitize::{is_external_link, remove_external_links, remove_tag, sanitize, unwrap_tag};
pub use schedule::{HourRange, Schedule, ScheduleError};
