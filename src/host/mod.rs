//! The host browser seen through the capabilities the popup consumes:
//! windows, tabs, tab groups and the tab status-change stream.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

pub use memory::MemoryBrowser;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Loading state reported by the host for a tab.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    #[default]
    Unloaded,
    Loading,
    Complete,
}

impl TabStatus {
    /// Whether a change to this status counts as the tab having started or
    /// finished loading.
    pub fn is_load_transition(self) -> bool {
        matches!(self, TabStatus::Loading | TabStatus::Complete)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    #[default]
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    pub index: usize,
    pub url: String,
    pub title: String,
    pub pinned: bool,
    pub active: bool,
    pub discarded: bool,
    pub status: TabStatus,
    /// `None` is the host's "not in any group" sentinel.
    pub group_id: Option<GroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    pub focused: bool,
    pub tabs: Vec<Tab>,
}

impl Window {
    pub fn discarded_count(&self) -> usize {
        self.tabs.iter().filter(|t| t.discarded).count()
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabGroup {
    pub id: GroupId,
    pub window_id: WindowId,
    pub title: Option<String>,
    pub color: GroupColor,
    pub collapsed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub tab_id: TabId,
    pub status: TabStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTab {
    pub window_id: WindowId,
    pub url: String,
    pub pinned: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabUpdate {
    pub pinned: Option<bool>,
    pub active: Option<bool>,
}

impl TabUpdate {
    pub fn pin() -> Self {
        Self {
            pinned: Some(true),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupUpdate {
    pub title: Option<String>,
    pub color: Option<GroupColor>,
    pub collapsed: Option<bool>,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no window with id {0}")]
    NoSuchWindow(WindowId),
    #[error("no tab with id {0}")]
    NoSuchTab(TabId),
    #[error("no tab group with id {0}")]
    NoSuchGroup(GroupId),
    #[error("host rejected the request: {0}")]
    Rejected(String),
}

/// Window, tab and tab-group capabilities of the host browser.
///
/// Identifiers are assigned by the host and are not stable: recreating a
/// window or tab, or discarding a tab, may hand out a fresh id.
#[async_trait]
pub trait Browser: Send + Sync {
    /// All windows with their tabs populated, in host order.
    async fn windows(&self) -> Result<Vec<Window>, HostError>;

    async fn window(&self, id: WindowId) -> Result<Window, HostError>;

    /// Opens a new window. The host gives it one starter tab.
    async fn create_window(&self) -> Result<Window, HostError>;

    async fn create_tab(&self, props: CreateTab) -> Result<Tab, HostError>;

    /// Releases the tab's memory while keeping it in the tab strip.
    async fn discard_tab(&self, id: TabId) -> Result<Tab, HostError>;

    async fn remove_tab(&self, id: TabId) -> Result<(), HostError>;

    async fn update_tab(&self, id: TabId, update: TabUpdate) -> Result<Tab, HostError>;

    /// Groups the tabs into a new group inside `window_id`.
    async fn group_tabs(&self, window_id: WindowId, tab_ids: &[TabId]) -> Result<GroupId, HostError>;

    async fn tab_group(&self, id: GroupId) -> Result<TabGroup, HostError>;

    async fn update_tab_group(&self, id: GroupId, update: GroupUpdate) -> Result<TabGroup, HostError>;

    /// Subscribes to tab status changes. Only changes sent after the call
    /// are observed.
    fn subscribe_status(&self) -> broadcast::Receiver<StatusChange>;
}
