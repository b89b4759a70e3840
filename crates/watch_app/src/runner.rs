use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use engine_logging::{engine_debug, engine_error, engine_info};
use watch_core::Schedule;
use watch_engine::{
    ensure_dir, HttpSessionProvider, LogNotifier, Notifier, OutboxNotifier, Scanner,
    SessionProvider, SiteStore,
};

use crate::config::AppConfig;

/// Drives scan cycles on the calling thread.
pub struct Runner {
    scanner: Scanner,
    schedule: Schedule,
    sessions: Box<dyn SessionProvider>,
    notifier: Box<dyn Notifier>,
    store: Arc<dyn SiteStore>,
    runtime: tokio::runtime::Runtime,
}

impl Runner {
    pub fn new(config: &AppConfig, store: Arc<dyn SiteStore>) -> anyhow::Result<Self> {
        let schedule = config.schedule()?;
        let notifier: Box<dyn Notifier> = match &config.outbox_dir {
            Some(dir) => {
                ensure_dir(dir).with_context(|| format!("outbox directory {dir:?}"))?;
                Box::new(OutboxNotifier::new(dir))
            }
            None => Box::new(LogNotifier),
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("building scan runtime")?;

        Ok(Self {
            scanner: Scanner::new(config.scan_settings()),
            schedule,
            sessions: Box::new(HttpSessionProvider::new(config.fetch_settings())),
            notifier,
            store,
            runtime,
        })
    }

    /// Runs one cycle and sends its digest. A cycle that cannot start is
    /// logged and produces no digest.
    pub fn run_once(&mut self) {
        let cycle = self
            .runtime
            .block_on(self.scanner.run_cycle(self.sessions.as_ref(), self.store.as_ref()));
        match cycle {
            Ok(report) => self
                .scanner
                .notify(&report, self.notifier.as_ref(), &Local::now()),
            Err(err) => engine_error!("Scan cycle {} failed: {}", self.scanner.cycle(), err),
        }
    }

    /// Runs a cycle at every schedule slot inside the active hours. Never
    /// returns.
    pub fn run_forever(&mut self) -> ! {
        loop {
            let now = Local::now().naive_local();
            if self.schedule.is_active(now) {
                self.run_once();
            } else {
                engine_debug!("Outside active hours at {}", now.format("%H:%M"));
            }
            let now = Local::now().naive_local();
            let next = self.schedule.next_run_after(now);
            engine_info!("Next scan slot at {}", next.format("%Y-%m-%d %H:%M"));
            thread::sleep(wait_until(now, next));
        }
    }
}

fn wait_until(now: NaiveDateTime, next: NaiveDateTime) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use watch_engine::LocalStore;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn wait_is_never_negative() {
        assert_eq!(wait_until(at(10, 0), at(9, 0)), Duration::ZERO);
        assert_eq!(wait_until(at(9, 0), at(9, 30)), Duration::from_secs(1800));
    }

    #[test]
    fn outbox_directory_is_created_up_front() {
        let temp = tempfile::TempDir::new().unwrap();
        let outbox = temp.path().join("digests");
        let config = AppConfig {
            outbox_dir: Some(outbox.clone()),
            ..AppConfig::default()
        };

        Runner::new(&config, Arc::new(LocalStore::in_memory())).unwrap();
        assert!(outbox.is_dir());
    }

    #[test]
    fn empty_store_cycle_still_sends_a_digest() {
        engine_logging::initialize_for_tests();
        let temp = tempfile::TempDir::new().unwrap();
        let outbox = temp.path().join("digests");
        let config = AppConfig {
            outbox_dir: Some(outbox.clone()),
            ..AppConfig::default()
        };

        let mut runner = Runner::new(&config, Arc::new(LocalStore::in_memory())).unwrap();
        runner.run_once();

        assert_eq!(runner.scanner.cycle(), 1);
        assert_eq!(std::fs::read_dir(&outbox).unwrap().count(), 1);
    }
}
