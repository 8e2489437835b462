pub mod error_log;
pub mod notifier;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use crate::config::Config;
use crate::daemon::error_log::ErrorLog;
use crate::daemon::notifier::Notifier;
use crate::error::RelayError;
use crate::mail::Mailbox;

/// Granularity at which the sleep between cycles notices a stop request.
const STOP_POLL: Duration = Duration::from_millis(250);

pub struct DaemonConfig {
    pub interval_secs: u64,
    pub lookback_secs: u64,
}

impl From<&Config> for DaemonConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            interval_secs: cfg.relay.interval_secs,
            lookback_secs: cfg.relay.lookback_secs,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Matches returned by the search.
    pub found: usize,
    /// Mails delivered and marked read.
    pub relayed: usize,
    /// Mails that hit a fetch, send or mark-read failure.
    pub failed: usize,
    /// Set when auth or search failed and the cycle was cut short.
    pub aborted: bool,
}

/// Sequential scan → notify → mark-read loop.
pub struct Daemon<'a> {
    cfg: DaemonConfig,
    base_query: Box<dyn Fn(Option<i64>) -> String + 'a>,
    notifier: Notifier<'a>,
    error_log: ErrorLog,
    last_cycle_at: Option<DateTime<Local>>,
}

impl<'a> Daemon<'a> {
    pub fn new(
        cfg: DaemonConfig,
        query: impl Fn(Option<i64>) -> String + 'a,
        notifier: Notifier<'a>,
        error_log: ErrorLog,
    ) -> Self {
        Self {
            cfg,
            base_query: Box::new(query),
            notifier,
            error_log,
            last_cycle_at: None,
        }
    }

    pub fn last_cycle_at(&self) -> Option<DateTime<Local>> {
        self.last_cycle_at
    }

    fn record(&self, err: &anyhow::Error) {
        if let Err(e) = self.error_log.record(err) {
            error!("could not write {}: {e:#}", self.error_log.path().display());
        }
    }

    fn query_for(&self, started: DateTime<Local>) -> String {
        if self.cfg.lookback_secs == 0 {
            return (self.base_query)(None);
        }
        let anchor = self.last_cycle_at.unwrap_or(started);
        (self.base_query)(Some(anchor.timestamp() - self.cfg.lookback_secs as i64))
    }

    /// One pass. `connect` performs the auth step and yields a mailbox handle.
    pub fn run_cycle<M, F>(&mut self, connect: F) -> CycleReport
    where
        M: Mailbox,
        F: FnOnce() -> Result<M>,
    {
        let started = Local::now();
        let query = self.query_for(started);
        let mut report = CycleReport::default();

        let finish = |this: &mut Self, report: CycleReport| {
            this.last_cycle_at = Some(started);
            report
        };

        let mailbox = match connect().context(RelayError::AuthFailure) {
            Ok(m) => m,
            Err(e) => {
                error!("{e:#}");
                self.record(&e);
                report.aborted = true;
                return finish(self, report);
            }
        };

        let summaries = match mailbox
            .search(&query)
            .with_context(|| RelayError::ScanFailure {
                query: query.clone(),
            }) {
            Ok(s) => s,
            Err(e) => {
                warn!("{e:#}");
                self.record(&e);
                report.aborted = true;
                return finish(self, report);
            }
        };

        report.found = summaries.len();
        if summaries.is_empty() {
            info!("no new messages since last check");
            return finish(self, report);
        }
        info!("{} new message(s)", summaries.len());

        for summary in &summaries {
            match self.relay_one(&mailbox, &summary.id) {
                Ok(()) => report.relayed += 1,
                Err(e) => {
                    error!("{e:#}");
                    self.record(&e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "cycle done: {} found, {} relayed, {} failed",
            report.found, report.relayed, report.failed
        );
        finish(self, report)
    }

    /// Fetch, deliver, then mark read. A failed delivery leaves the mail unread.
    fn relay_one<M: Mailbox>(&self, mailbox: &M, id: &str) -> Result<()> {
        let content = mailbox
            .fetch(id)
            .context(RelayError::FetchFailure { id: id.to_string() })?;

        let sent = self
            .notifier
            .notify(id, content.subject_or_placeholder(), &content.body)?;
        info!("relayed {id} in {sent} chat message(s)");

        mailbox
            .mark_read(id)
            .context(RelayError::MarkReadFailure { id: id.to_string() })
    }

    /// Run cycles until `running` is cleared. The interval is measured from the
    /// end of one cycle to the start of the next.
    pub fn run<M, F>(&mut self, mut connect: F, running: &AtomicBool) -> Result<()>
    where
        M: Mailbox,
        F: FnMut() -> Result<M>,
    {
        let interval = Duration::from_secs(self.cfg.interval_secs);
        while running.load(Ordering::SeqCst) {
            self.run_cycle(&mut connect);
            sleep_unless_stopped(interval, running);
        }
        info!("stop requested; exiting");
        Ok(())
    }
}

fn sleep_unless_stopped(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STOP_POLL.min(deadline - now));
    }
}

/// Flag cleared on Ctrl-C / SIGTERM.
pub fn install_stop_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_returns_early_when_stopped() {
        let running = AtomicBool::new(false);
        let t = Instant::now();
        sleep_unless_stopped(Duration::from_secs(30), &running);
        assert!(t.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_waits_for_interval() {
        let running = AtomicBool::new(true);
        let t = Instant::now();
        sleep_unless_stopped(Duration::from_millis(300), &running);
        assert!(t.elapsed() >= Duration::from_millis(300));
    }
}
