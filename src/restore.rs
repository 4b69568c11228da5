//! Recreates saved windows a batch of tabs at a time.
//!
//! Every tab of a batch is created concurrently, waited on until the host
//! reports it started loading (or a deadline passes), and discarded straight
//! away so a large session does not end up fully loaded in memory. Batches
//! run strictly one after the other.

use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::host::{Browser, CreateTab, HostError, StatusChange, Tab, TabId, TabUpdate, WindowId};
use crate::model::{TabRecord, WindowSnapshot};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(4);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Upper bound on tabs created at once. Zero is treated as one.
    pub batch_size: usize,
    /// How long to wait for a new tab to report a status change.
    pub load_timeout: Duration,
    /// Pause before regrouping, giving the host time to settle new tabs.
    pub settle_delay: Duration,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("window {window}: {kind} tab index {index} is out of range for {len} tabs")]
    IndexOutOfRange {
        window: usize,
        kind: &'static str,
        index: usize,
        len: usize,
    },
}

/// How the wait on a freshly created tab ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct CreatedTab {
    /// The tab as last returned by the host (post-discard when discarded).
    pub tab: Tab,
    pub outcome: LoadOutcome,
    pub discarded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub window_id: Option<WindowId>,
    pub created: usize,
    pub discarded: usize,
    pub timed_out: usize,
    pub groups: usize,
    pub pinned: usize,
}

/// Original tab position to the id the host assigned after recreation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMap(Vec<TabId>);

impl PositionMap {
    pub fn from_tabs(tabs: &[Tab]) -> Self {
        Self(tabs.iter().map(|t| t.id).collect())
    }

    pub fn get(&self, index: usize) -> Option<TabId> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Splits `items` into consecutive batches of at most `size` items.
pub fn batches<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.max(1))
}

/// Waits until `tab_id` reports `loading` or `complete`, or until `deadline`
/// elapses. A closed status stream can never deliver, so it ends the wait
/// as timed out.
pub async fn wait_for_status(
    events: &mut broadcast::Receiver<StatusChange>,
    tab_id: TabId,
    deadline: Duration,
) -> LoadOutcome {
    let observed = async {
        loop {
            match events.recv().await {
                Ok(change) if change.tab_id == tab_id && change.status.is_load_transition() => {
                    return LoadOutcome::Ready;
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(tab = %tab_id, skipped, "status stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => return LoadOutcome::TimedOut,
            }
        }
    };

    tokio::time::timeout(deadline, observed)
        .await
        .unwrap_or(LoadOutcome::TimedOut)
}

pub struct Restorer<'a, B: Browser + ?Sized> {
    browser: &'a B,
    options: RestoreOptions,
}

impl<'a, B: Browser + ?Sized> Restorer<'a, B> {
    pub fn new(browser: &'a B, options: RestoreOptions) -> Self {
        Self { browser, options }
    }

    pub fn options(&self) -> &RestoreOptions {
        &self.options
    }

    /// Restores windows one at a time, in order. The first failure stops
    /// the restore; windows already created stay open.
    pub async fn open_windows(
        &self,
        windows: &[WindowSnapshot],
    ) -> Result<Vec<RestoreReport>, RestoreError> {
        let mut reports = Vec::with_capacity(windows.len());
        for (position, snapshot) in windows.iter().enumerate() {
            reports.push(self.restore_window(position, snapshot).await?);
        }
        Ok(reports)
    }

    pub async fn restore_window(
        &self,
        position: usize,
        snapshot: &WindowSnapshot,
    ) -> Result<RestoreReport, RestoreError> {
        if let Some((kind, index)) = snapshot.first_invalid_index() {
            return Err(RestoreError::IndexOutOfRange {
                window: position,
                kind,
                index,
                len: snapshot.tabs.len(),
            });
        }

        let window = self.browser.create_window().await?;
        let starter = window.tabs.first().map(|t| t.id);
        let mut report = RestoreReport {
            window_id: Some(window.id),
            ..RestoreReport::default()
        };

        for (n, batch) in batches(&snapshot.tabs, self.options.batch_size).enumerate() {
            debug!(window = %window.id, batch = n, tabs = batch.len(), "creating batch");
            let results = join_all(
                batch
                    .iter()
                    .map(|record| self.create_and_discard(window.id, record)),
            )
            .await;
            for created in results {
                let created = created?;
                report.created += 1;
                if created.discarded {
                    report.discarded += 1;
                }
                if created.outcome == LoadOutcome::TimedOut {
                    report.timed_out += 1;
                }
            }
        }

        // An empty snapshot keeps the starter tab; removing it would close
        // the window.
        if let Some(starter) = starter.filter(|_| !snapshot.tabs.is_empty()) {
            self.browser.remove_tab(starter).await?;
        }

        let current = self.browser.window(window.id).await?;
        let positions = PositionMap::from_tabs(&current.tabs);
        let resolve = |kind: &'static str, index: usize| {
            positions.get(index).ok_or(RestoreError::IndexOutOfRange {
                window: position,
                kind,
                index,
                len: positions.len(),
            })
        };

        if !snapshot.tab_groups.is_empty() {
            tokio::time::sleep(self.options.settle_delay).await;
            for group in snapshot.tab_groups.values() {
                let tab_ids = group
                    .tab_indices
                    .iter()
                    .map(|&index| resolve("group", index))
                    .collect::<Result<Vec<_>, _>>()?;
                let group_id = self.browser.group_tabs(window.id, &tab_ids).await?;
                self.browser
                    .update_tab_group(group_id, group.to_update())
                    .await?;
                report.groups += 1;
            }
        }

        for &index in &snapshot.pinned_tab_indices {
            let tab_id = resolve("pinned", index)?;
            self.browser.update_tab(tab_id, TabUpdate::pin()).await?;
            report.pinned += 1;
        }

        info!(
            window = %window.id,
            created = report.created,
            discarded = report.discarded,
            timed_out = report.timed_out,
            groups = report.groups,
            "restored window"
        );
        Ok(report)
    }

    /// Creates one tab, waits for its first load transition and discards it.
    /// A tab that never reports is left running.
    async fn create_and_discard(
        &self,
        window_id: WindowId,
        record: &TabRecord,
    ) -> Result<CreatedTab, HostError> {
        // Subscribe first so a status change sent during creation is kept.
        let mut events = self.browser.subscribe_status();
        let tab = self
            .browser
            .create_tab(CreateTab {
                window_id,
                url: record.url.clone(),
                pinned: record.pinned,
                active: false,
            })
            .await?;

        match wait_for_status(&mut events, tab.id, self.options.load_timeout).await {
            LoadOutcome::Ready => {
                let tab = self.browser.discard_tab(tab.id).await?;
                Ok(CreatedTab {
                    tab,
                    outcome: LoadOutcome::Ready,
                    discarded: true,
                })
            }
            LoadOutcome::TimedOut => {
                warn!(url = %record.url, tab = %tab.id, "tab did not start loading in time");
                Ok(CreatedTab {
                    tab,
                    outcome: LoadOutcome::TimedOut,
                    discarded: false,
                })
            }
        }
    }
}
