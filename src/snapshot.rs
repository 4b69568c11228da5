use tracing::debug;

use crate::host::{Browser, HostError, Window};
use crate::model::{Session, TabGroupSnapshot, TabRecord, WindowSnapshot};

/// Captures every open window into a new session.
pub async fn capture<B: Browser + ?Sized>(browser: &B) -> Result<Session, HostError> {
    let windows = browser.windows().await?;
    let mut snapshots = Vec::with_capacity(windows.len());
    for window in &windows {
        snapshots.push(capture_window(browser, window).await?);
    }
    let session = Session::new(snapshots);
    debug!(
        windows = session.window_count(),
        tabs = session.tab_count(),
        "captured session"
    );
    Ok(session)
}

/// Records tabs in strip order, the positions of pinned tabs, and group
/// membership by position. Each group's display properties are fetched once.
pub async fn capture_window<B: Browser + ?Sized>(
    browser: &B,
    window: &Window,
) -> Result<WindowSnapshot, HostError> {
    let mut snapshot = WindowSnapshot::default();

    for (index, tab) in window.tabs.iter().enumerate() {
        snapshot.tabs.push(TabRecord::from(tab));

        if tab.pinned {
            snapshot.pinned_tab_indices.push(index);
        }

        let Some(group_id) = tab.group_id else {
            continue;
        };
        if let Some(group) = snapshot.tab_groups.get_mut(&group_id) {
            group.tab_indices.push(index);
        } else {
            let group = browser.tab_group(group_id).await?;
            snapshot
                .tab_groups
                .insert(group_id, TabGroupSnapshot::from_group(&group, index));
        }
    }

    Ok(snapshot)
}
