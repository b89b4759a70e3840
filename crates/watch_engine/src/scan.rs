use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use engine_logging::{clear_scan_cycle, engine_debug, engine_info, engine_warn, set_scan_cycle};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use watch_core::{
    apply_extraction, compose_digest, ExtractionSettings, Fingerprint, Page, SiteOutcome,
};

use crate::fetch::{PageSession, SessionProvider};
use crate::notify::Notifier;
use crate::retry::{retry_task, AttemptFailure, RetryOutcome, RetryPolicy, ScanTask};
use crate::store::{SiteChange, SiteRecord, SiteStore, StoreError};
use crate::{FetchError, ScanError};

/// What happens to a pending url whose first scan is abandoned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingPolicy {
    /// The entry is dequeued before it is scanned; an abandoned scan drops it.
    #[default]
    DropOnYield,
    /// Abandoned entries go back on the queue for the next cycle.
    RequeueOnFailure,
}

#[derive(Debug, Clone, Default)]
pub struct ScanSettings {
    pub retry: RetryPolicy,
    pub extraction: ExtractionSettings,
    pub pending_policy: PendingPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedSite {
    pub url: String,
    pub failures: Vec<AttemptFailure>,
}

/// Everything one scan cycle observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Known sites scanned successfully, in url order.
    pub outcomes: Vec<SiteOutcome>,
    /// Pending urls that became site records.
    pub added: Vec<String>,
    pub abandoned: Vec<AbandonedSite>,
}

impl CycleReport {
    pub fn changed_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| !outcome.same).count()
    }
}

/// Failures that stop a whole cycle before any site is scanned.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("could not open page session: {0}")]
    Session(#[from] FetchError),
    #[error("could not list sites: {0}")]
    Store(#[from] StoreError),
}

/// Scan context carried from one cycle to the next.
#[derive(Debug, Default)]
pub struct Scanner {
    settings: ScanSettings,
    cycle: u64,
    last_report: Option<CycleReport>,
}

impl Scanner {
    pub fn new(settings: ScanSettings) -> Self {
        Self {
            settings,
            cycle: 0,
            last_report: None,
        }
    }

    /// Number of cycles started so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Runs the pending pass and then the known-site pass over one shared
    /// session. Site failures are recorded in the report, never returned.
    pub async fn run_cycle(
        &mut self,
        sessions: &dyn SessionProvider,
        store: &dyn SiteStore,
    ) -> Result<CycleReport, CycleError> {
        self.cycle += 1;
        set_scan_cycle(self.cycle);
        let result = self.scan_all(sessions, store).await;
        match &result {
            Ok(report) => {
                engine_info!(
                    "Cycle finished: {} scanned, {} changed, {} added, {} abandoned",
                    report.outcomes.len(),
                    report.changed_count(),
                    report.added.len(),
                    report.abandoned.len()
                );
                self.last_report = Some(report.clone());
            }
            Err(err) => engine_warn!("Cycle aborted: {}", err),
        }
        clear_scan_cycle();
        result
    }

    async fn scan_all(
        &self,
        sessions: &dyn SessionProvider,
        store: &dyn SiteStore,
    ) -> Result<CycleReport, CycleError> {
        // Sites added by the pending pass wait for the next cycle's rescan.
        let mut known = store.list_urls()?;
        known.sort();
        let pending = store.list_pending()?;

        let mut session = sessions.open_session()?;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        for url in pending {
            self.scan_pending(session.as_mut(), store, &url, &mut report)
                .await;
        }
        for url in known {
            self.scan_known(session.as_mut(), store, &url, &mut report)
                .await;
        }

        session.close().await;
        Ok(report)
    }

    async fn scan_pending(
        &self,
        session: &mut dyn PageSession,
        store: &dyn SiteStore,
        url: &str,
        report: &mut CycleReport,
    ) {
        if let Err(err) = store.dequeue_pending(url) {
            engine_warn!("Skipping pending {}: {}", url, err);
            return;
        }

        let outcome = match parse_site_url(url) {
            Ok(base) => {
                let mut task = NewSite {
                    url: url.to_string(),
                    base,
                    extraction: self.settings.extraction,
                };
                retry_task(self.settings.retry, session, &mut task).await
            }
            Err(error) => abandon_at_once(error),
        };

        match outcome {
            RetryOutcome::Completed {
                value: (title, fingerprint),
                attempts,
            } => {
                engine_debug!(
                    "New site {} classified as {:?} [{}] after {} attempt(s)",
                    url,
                    fingerprint.strategy(),
                    fingerprint.digest(),
                    attempts
                );
                match store.create(url, &title, fingerprint) {
                    Ok(()) => {
                        engine_info!("Added site {}", url);
                        report.added.push(url.to_string());
                    }
                    Err(err) => engine_warn!("Could not add site {}: {}", url, err),
                }
            }
            RetryOutcome::Abandoned { failures } => {
                log_abandoned(url, &failures);
                if self.settings.pending_policy == PendingPolicy::RequeueOnFailure {
                    if let Err(err) = store.enqueue_pending(url) {
                        engine_warn!("Could not requeue {}: {}", url, err);
                    }
                }
                report.abandoned.push(AbandonedSite {
                    url: url.to_string(),
                    failures,
                });
            }
        }
    }

    async fn scan_known(
        &self,
        session: &mut dyn PageSession,
        store: &dyn SiteStore,
        url: &str,
        report: &mut CycleReport,
    ) {
        let record = match store.get(url) {
            Ok(record) => record,
            Err(err) => {
                engine_warn!("Skipping site {}: {}", url, err);
                return;
            }
        };

        let outcome = match parse_site_url(url) {
            Ok(base) => {
                let mut task = RescanSite {
                    base,
                    record: record.clone(),
                };
                retry_task(self.settings.retry, session, &mut task).await
            }
            Err(error) => abandon_at_once(error),
        };

        match outcome {
            RetryOutcome::Completed {
                value: rescan,
                attempts,
            } => {
                engine_debug!(
                    "Rescanned {} in {} attempt(s): {}",
                    url,
                    attempts,
                    if rescan.same { "unchanged" } else { "changed" }
                );
                let change = (!rescan.same).then(|| SiteChange {
                    title: rescan.title.clone(),
                    fingerprint: rescan.fingerprint,
                });
                if let Err(err) = store.update(url, change) {
                    engine_warn!("Could not update site {}: {}", url, err);
                    return;
                }
                report.outcomes.push(SiteOutcome {
                    same: rescan.same,
                    url: url.to_string(),
                    title: rescan.title,
                    previous_update: record.latest_updated,
                });
            }
            RetryOutcome::Abandoned { failures } => {
                log_abandoned(url, &failures);
                report.abandoned.push(AbandonedSite {
                    url: url.to_string(),
                    failures,
                });
            }
        }
    }

    /// Composes the digest for `report` and hands it to `notifier`.
    pub fn notify<Tz>(&self, report: &CycleReport, notifier: &dyn Notifier, now: &DateTime<Tz>)
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let digest = compose_digest(&report.outcomes, &report.added, now);
        if let Err(err) = notifier.send(&digest.subject, &digest.html_body) {
            engine_warn!("Could not send digest '{}': {}", digest.subject, err);
        }
    }
}

fn parse_site_url(url: &str) -> Result<Url, ScanError> {
    Url::parse(url).map_err(|err| ScanError::InvalidUrl {
        url: url.to_string(),
        message: err.to_string(),
    })
}

/// A url that cannot be parsed will not fix itself on retry.
fn abandon_at_once<T>(error: ScanError) -> RetryOutcome<T> {
    RetryOutcome::Abandoned {
        failures: vec![AttemptFailure {
            attempt: 1,
            error,
            reset_error: None,
        }],
    }
}

fn log_abandoned(url: &str, failures: &[AttemptFailure]) {
    let stage = failures.last().map(|failure| failure.error.stage());
    engine_warn!(
        "Abandoned {} after {} attempt(s), last stage {:?}",
        url,
        failures.len(),
        stage
    );
    for failure in failures {
        engine_debug!("  attempt {}: {}", failure.attempt, failure.error);
        if let Some(reset) = &failure.reset_error {
            engine_debug!("  session reset failed: {}", reset);
        }
    }
}

async fn load_page(session: &mut dyn PageSession, url: &str) -> Result<Page, ScanError> {
    session.open(url).await?;
    let html = session.current_document_html().await?;
    Ok(Page::parse(&html))
}

/// First scan of a pending url: full classification.
struct NewSite {
    url: String,
    base: Url,
    extraction: ExtractionSettings,
}

#[async_trait::async_trait]
impl ScanTask for NewSite {
    type Output = (String, Fingerprint);

    async fn attempt(
        &mut self,
        session: &mut dyn PageSession,
    ) -> Result<Self::Output, ScanError> {
        let page = load_page(session, &self.url).await?;
        let fingerprint = apply_extraction(&self.base, &page.document, &self.extraction)?;
        Ok((page.title_or(&self.url).to_string(), fingerprint))
    }
}

struct Rescan {
    same: bool,
    title: String,
    fingerprint: Fingerprint,
}

/// Rescan of a known site with the strategy chosen at its first scan.
struct RescanSite {
    base: Url,
    record: SiteRecord,
}

#[async_trait::async_trait]
impl ScanTask for RescanSite {
    type Output = Rescan;

    async fn attempt(&mut self, session: &mut dyn PageSession) -> Result<Rescan, ScanError> {
        let page = load_page(session, &self.record.url).await?;
        let stored = &self.record.fingerprint;
        let fingerprint = stored.strategy().extract(&self.base, &page.document)?;
        let same = stored.same_content(&fingerprint)?;
        Ok(Rescan {
            same,
            title: page.title_or(&self.record.url).to_string(),
            fingerprint,
        })
    }
}
