use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host::{GroupColor, GroupId, GroupUpdate, Tab, TabGroup};

/// A saved snapshot of every window, tab, group and pin at one point in time.
///
/// Sessions carry no id; they are addressed by position in the stored list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub windows: Vec<WindowSnapshot>,
}

/// One window of a session. Pins and group membership refer to tabs by
/// position in `tabs`, since host ids do not survive a restore.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub tabs: Vec<TabRecord>,
    #[serde(default)]
    pub pinned_tab_indices: Vec<usize>,
    /// Keyed by the group id the host used when the snapshot was taken.
    #[serde(default)]
    pub tab_groups: BTreeMap<GroupId, TabGroupSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroupSnapshot {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub color: GroupColor,
    #[serde(default)]
    pub collapsed: bool,
    pub tab_indices: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
}

impl Session {
    pub fn new(windows: Vec<WindowSnapshot>) -> Self {
        Self {
            timestamp: Utc::now(),
            windows,
        }
    }

    pub fn refresh_timestamp(&mut self) {
        self.timestamp = Utc::now();
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn tab_count(&self) -> usize {
        self.windows.iter().map(|w| w.tabs.len()).sum()
    }
}

impl WindowSnapshot {
    /// First pin or group index that does not point into `tabs`, as
    /// `(what, index)`.
    pub fn first_invalid_index(&self) -> Option<(&'static str, usize)> {
        let len = self.tabs.len();
        if let Some(&index) = self.pinned_tab_indices.iter().find(|&&i| i >= len) {
            return Some(("pinned", index));
        }
        self.tab_groups
            .values()
            .flat_map(|g| g.tab_indices.iter())
            .find(|&&i| i >= len)
            .map(|&i| ("group", i))
    }
}

impl TabGroupSnapshot {
    pub fn from_group(group: &TabGroup, first_index: usize) -> Self {
        Self {
            title: group.title.clone(),
            color: group.color,
            collapsed: group.collapsed,
            tab_indices: vec![first_index],
        }
    }

    /// Display properties to re-apply on a recreated group.
    pub fn to_update(&self) -> GroupUpdate {
        GroupUpdate {
            title: self.title.clone(),
            color: Some(self.color),
            collapsed: Some(self.collapsed),
        }
    }
}

impl From<&Tab> for TabRecord {
    fn from(tab: &Tab) -> Self {
        Self {
            url: tab.url.clone(),
            title: tab.title.clone(),
            pinned: tab.pinned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(url: &str) -> TabRecord {
        TabRecord {
            url: url.to_string(),
            title: url.to_string(),
            pinned: false,
        }
    }

    #[test]
    fn test_wire_format_uses_camel_case_and_millis() {
        let mut window = WindowSnapshot {
            tabs: vec![record("https://a.test"), record("https://b.test")],
            pinned_tab_indices: vec![0],
            tab_groups: BTreeMap::new(),
        };
        window.tab_groups.insert(
            GroupId(7),
            TabGroupSnapshot {
                title: Some("docs".to_string()),
                color: GroupColor::Purple,
                collapsed: false,
                tab_indices: vec![1],
            },
        );
        let session = Session {
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            windows: vec![window],
        };

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value["windows"][0]["pinnedTabIndices"][0], 0);
        assert_eq!(value["windows"][0]["tabGroups"]["7"]["color"], "purple");
        assert_eq!(value["windows"][0]["tabGroups"]["7"]["tabIndices"][0], 1);

        let restored: Session = serde_json::from_value(value).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn test_full_host_tab_objects_are_accepted() {
        let json = r#"{
            "timestamp": 1650000000000,
            "windows": [{
                "tabGroups": {},
                "pinnedTabIndices": [],
                "tabs": [{
                    "active": true,
                    "discarded": false,
                    "groupId": -1,
                    "id": 42,
                    "index": 0,
                    "pinned": false,
                    "title": "Example",
                    "url": "https://example.com/"
                }]
            }]
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.windows[0].tabs[0].url, "https://example.com/");
        assert_eq!(session.windows[0].tabs[0].title, "Example");
    }

    #[test]
    fn test_counts() {
        let session = Session::new(vec![
            WindowSnapshot {
                tabs: vec![record("a"), record("b")],
                ..WindowSnapshot::default()
            },
            WindowSnapshot {
                tabs: vec![record("c")],
                ..WindowSnapshot::default()
            },
        ]);
        assert_eq!(session.window_count(), 2);
        assert_eq!(session.tab_count(), 3);
    }

    #[test]
    fn test_first_invalid_index() {
        let mut window = WindowSnapshot {
            tabs: vec![record("a"), record("b")],
            pinned_tab_indices: vec![1],
            tab_groups: BTreeMap::new(),
        };
        assert_eq!(window.first_invalid_index(), None);

        window.tab_groups.insert(
            GroupId(1),
            TabGroupSnapshot {
                title: None,
                color: GroupColor::Grey,
                collapsed: false,
                tab_indices: vec![0, 2],
            },
        );
        assert_eq!(window.first_invalid_index(), Some(("group", 2)));

        window.pinned_tab_indices.push(5);
        assert_eq!(window.first_invalid_index(), Some(("pinned", 5)));
    }

    #[test]
    fn test_refresh_timestamp_moves_forward() {
        let mut session = Session::new(Vec::new());
        session.timestamp = Utc.timestamp_millis_opt(0).unwrap();
        session.refresh_timestamp();
        assert!(session.timestamp.timestamp() > 0);
    }
}
