use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{
    Browser, CreateTab, GroupColor, GroupId, GroupUpdate, HostError, StatusChange, Tab, TabGroup,
    TabId, TabStatus, TabUpdate, Window, WindowId,
};

const NEW_TAB_URL: &str = "chrome://newtab/";
const STATUS_CHANNEL_CAPACITY: usize = 1024;

/// Serializable model of every window, tab and group the in-memory host
/// knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserState {
    pub windows: Vec<Window>,
    #[serde(default)]
    pub groups: BTreeMap<GroupId, TabGroup>,
    #[serde(default)]
    pub next_id: u32,
}

impl BrowserState {
    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn highest_id(&self) -> u32 {
        let windows = self.windows.iter().map(|w| w.id.0);
        let tabs = self.windows.iter().flat_map(|w| w.tabs.iter().map(|t| t.id.0));
        let groups = self.groups.keys().map(|g| g.0);
        windows.chain(tabs).chain(groups).max().unwrap_or(0)
    }

    fn locate(&self, id: TabId) -> Option<(usize, usize)> {
        self.windows.iter().enumerate().find_map(|(w, window)| {
            window
                .tabs
                .iter()
                .position(|t| t.id == id)
                .map(|t| (w, t))
        })
    }

    fn window_index(&self, id: WindowId) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    fn focus(&mut self, id: WindowId) {
        for window in &mut self.windows {
            window.focused = window.id == id;
        }
    }

    /// Restores the positional fields after tabs moved, and forgets groups
    /// that no longer hold any tab.
    fn normalize(&mut self) {
        let mut live_groups = HashSet::new();
        for window in &mut self.windows {
            for (index, tab) in window.tabs.iter_mut().enumerate() {
                tab.index = index;
                tab.window_id = window.id;
                if let Some(group) = tab.group_id {
                    live_groups.insert(group);
                }
            }
        }
        self.groups.retain(|id, _| live_groups.contains(id));
    }
}

/// A call the in-memory host served, in the order it was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    CreateWindow(WindowId),
    CreateTab(TabId),
    DiscardTab { from: TabId, to: TabId },
    RemoveTab(TabId),
    UpdateTab(TabId),
    GroupTabs(GroupId),
    UpdateGroup(GroupId),
}

/// Host operations [`MemoryBrowser::reject_next`] can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateWindow,
    CreateTab,
    DiscardTab,
    RemoveTab,
    UpdateTab,
    GroupTabs,
    UpdateGroup,
}

struct Inner {
    state: BrowserState,
    stalled: HashSet<String>,
    rejected: HashSet<Operation>,
    journal: Vec<HostCall>,
}

impl Inner {
    /// Consumes a pending rejection of `op`.
    fn check(&mut self, op: Operation) -> Result<(), HostError> {
        if self.rejected.remove(&op) {
            return Err(HostError::Rejected(format!("{:?} refused", op)));
        }
        Ok(())
    }
}

/// In-process browser host.
///
/// Tabs report `loading` then `complete` as soon as they are created, unless
/// their url was registered with [`MemoryBrowser::stall_url`]. Discarding a
/// tab hands it a fresh id, like hosts that swap the tab's contents on
/// discard.
pub struct MemoryBrowser {
    inner: Mutex<Inner>,
    events: broadcast::Sender<StatusChange>,
}

impl Default for MemoryBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBrowser {
    pub fn new() -> Self {
        Self::from_state(BrowserState::default())
    }

    pub fn from_state(mut state: BrowserState) -> Self {
        state.next_id = state.next_id.max(state.highest_id());
        state.normalize();
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                state,
                stalled: HashSet::new(),
                rejected: HashSet::new(),
                journal: Vec::new(),
            }),
            events,
        }
    }

    /// Loads a previously saved browser. A missing file yields a browser
    /// with a single focused window.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let browser = Self::new();
            browser.seed_window(&[NEW_TAB_URL]);
            return Ok(browser);
        }
        let json = fs::read_to_string(path)?;
        let state: BrowserState = serde_json::from_str(&json)?;
        Ok(Self::from_state(state))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.state())?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn state(&self) -> BrowserState {
        self.lock().state.clone()
    }

    /// Calls served so far.
    pub fn journal(&self) -> Vec<HostCall> {
        self.lock().journal.clone()
    }

    /// Opens a focused window holding already-loaded tabs for `urls`.
    pub fn seed_window(&self, urls: &[&str]) -> WindowId {
        let mut inner = self.lock();
        let state = &mut inner.state;
        let window_id = WindowId(state.alloc());
        let mut tabs = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            tabs.push(Tab {
                id: TabId(state.alloc()),
                window_id,
                index,
                url: url.to_string(),
                title: title_for(url),
                pinned: false,
                active: index == 0,
                discarded: false,
                status: TabStatus::Complete,
                group_id: None,
            });
        }
        state.windows.push(Window {
            id: window_id,
            focused: false,
            tabs,
        });
        state.focus(window_id);
        window_id
    }

    /// Tabs created for `url` never report a status change.
    pub fn stall_url(&self, url: &str) {
        self.lock().stalled.insert(url.to_string());
    }

    /// The next call of `op` fails with [`HostError::Rejected`] and changes
    /// nothing.
    pub fn reject_next(&self, op: Operation) {
        self.lock().rejected.insert(op);
    }

    pub fn focus_window(&self, id: WindowId) {
        self.lock().state.focus(id);
    }

    /// Makes every window report itself as unfocused, as hosts do once the
    /// popup's own window loses focus.
    pub fn blur_all(&self) {
        for window in &mut self.lock().state.windows {
            window.focused = false;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn title_for(url: &str) -> String {
    if url == NEW_TAB_URL {
        "New Tab".to_string()
    } else {
        url.to_string()
    }
}

#[async_trait]
impl Browser for MemoryBrowser {
    async fn windows(&self) -> Result<Vec<Window>, HostError> {
        Ok(self.lock().state.windows.clone())
    }

    async fn window(&self, id: WindowId) -> Result<Window, HostError> {
        self.lock()
            .state
            .windows
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or(HostError::NoSuchWindow(id))
    }

    async fn create_window(&self) -> Result<Window, HostError> {
        let mut inner = self.lock();
        inner.check(Operation::CreateWindow)?;
        let state = &mut inner.state;
        let window_id = WindowId(state.alloc());
        let starter = Tab {
            id: TabId(state.alloc()),
            window_id,
            index: 0,
            url: NEW_TAB_URL.to_string(),
            title: title_for(NEW_TAB_URL),
            pinned: false,
            active: true,
            discarded: false,
            status: TabStatus::Complete,
            group_id: None,
        };
        let window = Window {
            id: window_id,
            focused: true,
            tabs: vec![starter],
        };
        state.windows.push(window.clone());
        state.focus(window_id);
        inner.journal.push(HostCall::CreateWindow(window_id));
        Ok(window)
    }

    async fn create_tab(&self, props: CreateTab) -> Result<Tab, HostError> {
        let (tab, reports) = {
            let mut inner = self.lock();
            inner.check(Operation::CreateTab)?;
            let reports = !inner.stalled.contains(&props.url);
            let state = &mut inner.state;
            let w = state
                .window_index(props.window_id)
                .ok_or(HostError::NoSuchWindow(props.window_id))?;
            let id = TabId(state.alloc());
            let window = &mut state.windows[w];
            if props.active {
                for tab in &mut window.tabs {
                    tab.active = false;
                }
            }
            let tab = Tab {
                id,
                window_id: props.window_id,
                index: window.tabs.len(),
                title: title_for(&props.url),
                url: props.url,
                pinned: props.pinned,
                active: props.active,
                discarded: false,
                status: if reports {
                    TabStatus::Complete
                } else {
                    TabStatus::Unloaded
                },
                group_id: None,
            };
            window.tabs.push(tab.clone());
            inner.journal.push(HostCall::CreateTab(id));
            (tab, reports)
        };

        if reports {
            // No receivers is not an error for the host.
            for status in [TabStatus::Loading, TabStatus::Complete] {
                let _ = self.events.send(StatusChange {
                    tab_id: tab.id,
                    status,
                });
            }
        }
        Ok(tab)
    }

    async fn discard_tab(&self, id: TabId) -> Result<Tab, HostError> {
        let mut inner = self.lock();
        inner.check(Operation::DiscardTab)?;
        let (w, t) = inner.state.locate(id).ok_or(HostError::NoSuchTab(id))?;
        let fresh = TabId(inner.state.alloc());
        let tab = &mut inner.state.windows[w].tabs[t];
        tab.id = fresh;
        tab.discarded = true;
        tab.status = TabStatus::Unloaded;
        let tab = tab.clone();
        inner.journal.push(HostCall::DiscardTab { from: id, to: fresh });
        Ok(tab)
    }

    async fn remove_tab(&self, id: TabId) -> Result<(), HostError> {
        let mut inner = self.lock();
        inner.check(Operation::RemoveTab)?;
        let (w, t) = inner.state.locate(id).ok_or(HostError::NoSuchTab(id))?;
        inner.state.windows[w].tabs.remove(t);
        if inner.state.windows[w].tabs.is_empty() {
            inner.state.windows.remove(w);
        }
        inner.state.normalize();
        inner.journal.push(HostCall::RemoveTab(id));
        Ok(())
    }

    async fn update_tab(&self, id: TabId, update: TabUpdate) -> Result<Tab, HostError> {
        let mut inner = self.lock();
        inner.check(Operation::UpdateTab)?;
        let (w, t) = inner.state.locate(id).ok_or(HostError::NoSuchTab(id))?;
        let window = &mut inner.state.windows[w];
        if update.active == Some(true) {
            for tab in &mut window.tabs {
                tab.active = false;
            }
        }
        let tab = &mut window.tabs[t];
        if let Some(pinned) = update.pinned {
            tab.pinned = pinned;
        }
        if let Some(active) = update.active {
            tab.active = active;
        }
        let tab = tab.clone();
        inner.journal.push(HostCall::UpdateTab(id));
        Ok(tab)
    }

    async fn group_tabs(&self, window_id: WindowId, tab_ids: &[TabId]) -> Result<GroupId, HostError> {
        if tab_ids.is_empty() {
            return Err(HostError::Rejected("cannot group zero tabs".to_string()));
        }
        let mut inner = self.lock();
        inner.check(Operation::GroupTabs)?;
        let w = inner
            .state
            .window_index(window_id)
            .ok_or(HostError::NoSuchWindow(window_id))?;
        for id in tab_ids {
            if !inner.state.windows[w].tabs.iter().any(|t| t.id == *id) {
                return Err(HostError::Rejected(format!(
                    "tab {} is not in window {}",
                    id, window_id
                )));
            }
        }

        let group_id = GroupId(inner.state.alloc());
        for tab in &mut inner.state.windows[w].tabs {
            if tab_ids.contains(&tab.id) {
                tab.group_id = Some(group_id);
            }
        }
        inner.state.groups.insert(
            group_id,
            TabGroup {
                id: group_id,
                window_id,
                title: None,
                color: GroupColor::default(),
                collapsed: false,
            },
        );
        inner.state.normalize();
        inner.journal.push(HostCall::GroupTabs(group_id));
        Ok(group_id)
    }

    async fn tab_group(&self, id: GroupId) -> Result<TabGroup, HostError> {
        self.lock()
            .state
            .groups
            .get(&id)
            .cloned()
            .ok_or(HostError::NoSuchGroup(id))
    }

    async fn update_tab_group(&self, id: GroupId, update: GroupUpdate) -> Result<TabGroup, HostError> {
        let mut inner = self.lock();
        inner.check(Operation::UpdateGroup)?;
        let group = inner
            .state
            .groups
            .get_mut(&id)
            .ok_or(HostError::NoSuchGroup(id))?;
        if let Some(title) = update.title {
            group.title = Some(title);
        }
        if let Some(color) = update.color {
            group.color = color;
        }
        if let Some(collapsed) = update.collapsed {
            group.collapsed = collapsed;
        }
        let group = group.clone();
        inner.journal.push(HostCall::UpdateGroup(id));
        Ok(group)
    }

    fn subscribe_status(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_window_has_starter_tab() {
        let browser = MemoryBrowser::new();
        let window = browser.create_window().await.unwrap();
        assert_eq!(window.tabs.len(), 1);
        assert_eq!(window.tabs[0].url, NEW_TAB_URL);
        assert!(window.focused);
    }

    #[tokio::test]
    async fn test_create_tab_reports_loading_then_complete() {
        let browser = MemoryBrowser::new();
        let window = browser.seed_window(&["https://a.test"]);
        let mut rx = browser.subscribe_status();

        let tab = browser
            .create_tab(CreateTab {
                window_id: window,
                url: "https://b.test".to_string(),
                pinned: false,
                active: false,
            })
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.tab_id, tab.id);
        assert_eq!(first.status, TabStatus::Loading);
        assert_eq!(second.status, TabStatus::Complete);
    }

    #[tokio::test]
    async fn test_stalled_url_reports_nothing() {
        let browser = MemoryBrowser::new();
        let window = browser.seed_window(&["https://a.test"]);
        browser.stall_url("https://slow.test");
        let mut rx = browser.subscribe_status();

        let tab = browser
            .create_tab(CreateTab {
                window_id: window,
                url: "https://slow.test".to_string(),
                pinned: false,
                active: false,
            })
            .await
            .unwrap();

        assert_eq!(tab.status, TabStatus::Unloaded);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_discard_reassigns_id_and_keeps_position() {
        let browser = MemoryBrowser::new();
        let window = browser.seed_window(&["https://a.test", "https://b.test"]);
        let before = browser.window(window).await.unwrap();

        let discarded = browser.discard_tab(before.tabs[1].id).await.unwrap();

        assert_ne!(discarded.id, before.tabs[1].id);
        assert!(discarded.discarded);
        let after = browser.window(window).await.unwrap();
        assert_eq!(after.tabs[1].id, discarded.id);
        assert_eq!(after.tabs[1].url, "https://b.test");
        assert!(matches!(
            browser.discard_tab(before.tabs[1].id).await,
            Err(HostError::NoSuchTab(_))
        ));
    }

    #[tokio::test]
    async fn test_removing_last_tab_closes_window() {
        let browser = MemoryBrowser::new();
        let window = browser.create_window().await.unwrap();
        browser.remove_tab(window.tabs[0].id).await.unwrap();
        assert!(matches!(
            browser.window(window.id).await,
            Err(HostError::NoSuchWindow(_))
        ));
    }

    #[tokio::test]
    async fn test_group_tabs_and_update() {
        let browser = MemoryBrowser::new();
        let window = browser.seed_window(&["https://a.test", "https://b.test", "https://c.test"]);
        let tabs = browser.window(window).await.unwrap().tabs;

        let group = browser
            .group_tabs(window, &[tabs[0].id, tabs[2].id])
            .await
            .unwrap();
        let updated = browser
            .update_tab_group(
                group,
                GroupUpdate {
                    title: Some("work".to_string()),
                    color: Some(GroupColor::Blue),
                    collapsed: Some(true),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title.as_deref(), Some("work"));
        assert_eq!(updated.color, GroupColor::Blue);
        let tabs = browser.window(window).await.unwrap().tabs;
        assert_eq!(tabs[0].group_id, Some(group));
        assert_eq!(tabs[1].group_id, None);
        assert_eq!(tabs[2].group_id, Some(group));
    }

    #[tokio::test]
    async fn test_group_tabs_rejects_foreign_tab() {
        let browser = MemoryBrowser::new();
        let first = browser.seed_window(&["https://a.test"]);
        let second = browser.seed_window(&["https://b.test"]);
        let foreign = browser.window(second).await.unwrap().tabs[0].id;

        let result = browser.group_tabs(first, &[foreign]).await;
        assert!(matches!(result, Err(HostError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_reject_next_fails_once_without_changes() {
        let browser = MemoryBrowser::new();
        let window = browser.seed_window(&["https://a.test"]);
        let tab = browser.window(window).await.unwrap().tabs[0].id;

        browser.reject_next(Operation::UpdateTab);
        let result = browser.update_tab(tab, TabUpdate::pin()).await;
        assert!(matches!(result, Err(HostError::Rejected(_))));
        assert!(!browser.window(window).await.unwrap().tabs[0].pinned);

        let pinned = browser.update_tab(tab, TabUpdate::pin()).await.unwrap();
        assert!(pinned.pinned);
    }

    #[test]
    fn test_save_and_load_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("browser.json");
        let browser = MemoryBrowser::new();
        browser.seed_window(&["https://a.test", "https://b.test"]);

        browser.save_to(&path).unwrap();
        let loaded = MemoryBrowser::load_from(&path).unwrap();

        assert_eq!(loaded.state(), browser.state());
    }

    #[test]
    fn test_load_missing_file_opens_one_window() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MemoryBrowser::load_from(&dir.path().join("none.json")).unwrap();
        let state = browser.state();
        assert_eq!(state.windows.len(), 1);
        assert!(state.windows[0].focused);
    }

    #[test]
    fn test_from_state_continues_id_sequence() {
        let source = MemoryBrowser::new();
        source.seed_window(&["https://a.test"]);
        let mut state = source.state();
        state.next_id = 0;

        let browser = MemoryBrowser::from_state(state);
        let id = browser.seed_window(&["https://b.test"]);
        assert!(id.0 > 2);
    }
}
