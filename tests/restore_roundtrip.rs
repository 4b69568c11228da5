use tab_freezer::host::{
    Browser, GroupColor, GroupUpdate, MemoryBrowser, TabUpdate, Window, WindowId,
};
use tab_freezer::model::{TabGroupSnapshot, WindowSnapshot};
use tab_freezer::restore::{RestoreOptions, Restorer};
use tab_freezer::snapshot;
use tab_freezer::store::{MemoryStore, SessionStore};

/// Group keys are host ids and change across a restore; compare by content.
fn groups_by_position(window: &WindowSnapshot) -> Vec<TabGroupSnapshot> {
    let mut groups: Vec<TabGroupSnapshot> = window.tab_groups.values().cloned().collect();
    groups.sort_by(|a, b| a.tab_indices.cmp(&b.tab_indices));
    groups
}

fn assert_same_layout(before: &[WindowSnapshot], after: &[WindowSnapshot]) {
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after) {
        assert_eq!(b.tabs, a.tabs);
        assert_eq!(b.pinned_tab_indices, a.pinned_tab_indices);
        assert_eq!(groups_by_position(b), groups_by_position(a));
    }
}

async fn window(browser: &MemoryBrowser, id: WindowId) -> Window {
    browser.window(id).await.unwrap()
}

/// Two windows: one with a pinned first tab, one with a titled group over
/// tabs 1, 2 and 4.
async fn seed_source() -> MemoryBrowser {
    let browser = MemoryBrowser::new();
    let first = browser.seed_window(&["https://mail.test", "https://news.test", "https://docs.test"]);
    let second = browser.seed_window(&[
        "https://a.test",
        "https://b.test",
        "https://c.test",
        "https://d.test",
        "https://e.test",
    ]);

    let pinned = window(&browser, first).await.tabs[0].id;
    browser.update_tab(pinned, TabUpdate::pin()).await.unwrap();

    let tabs = window(&browser, second).await.tabs;
    let group = browser
        .group_tabs(second, &[tabs[1].id, tabs[2].id, tabs[4].id])
        .await
        .unwrap();
    browser
        .update_tab_group(
            group,
            GroupUpdate {
                title: Some("Research".to_string()),
                color: Some(GroupColor::Blue),
                collapsed: None,
            },
        )
        .await
        .unwrap();
    browser
}

#[tokio::test(start_paused = true)]
async fn restore_reproduces_captured_layout() {
    let source = seed_source().await;
    let saved = snapshot::capture(&source).await.unwrap();
    assert_eq!(saved.window_count(), 2);
    assert_eq!(saved.tab_count(), 8);
    assert_eq!(saved.windows[0].pinned_tab_indices, vec![0]);
    let group = groups_by_position(&saved.windows[1]);
    assert_eq!(group.len(), 1);
    assert_eq!(group[0].tab_indices, vec![1, 2, 4]);
    assert_eq!(group[0].title.as_deref(), Some("Research"));
    assert_eq!(group[0].color, GroupColor::Blue);

    let target = MemoryBrowser::new();
    let reports = Restorer::new(&target, RestoreOptions::default())
        .open_windows(&saved.windows)
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].pinned, 1);
    assert_eq!(reports[1].groups, 1);

    let windows = target.windows().await.unwrap();
    assert_eq!(windows.len(), 2);
    for w in &windows {
        assert!(w.tabs.iter().all(|t| t.discarded), "window {} has live tabs", w.id);
    }

    let restored = snapshot::capture(&target).await.unwrap();
    assert_same_layout(&saved.windows, &restored.windows);
}

#[tokio::test(start_paused = true)]
async fn restore_survives_small_batches_and_stalled_tabs() {
    let source = seed_source().await;
    let saved = snapshot::capture(&source).await.unwrap();

    let target = MemoryBrowser::new();
    target.stall_url("https://d.test");
    let options = RestoreOptions {
        batch_size: 2,
        ..RestoreOptions::default()
    };
    let reports = Restorer::new(&target, options)
        .open_windows(&saved.windows)
        .await
        .unwrap();
    assert_eq!(reports[1].timed_out, 1);

    let windows = target.windows().await.unwrap();
    let stalled = windows[1]
        .tabs
        .iter()
        .find(|t| t.url == "https://d.test")
        .unwrap();
    assert!(!stalled.discarded);

    let restored = snapshot::capture(&target).await.unwrap();
    assert_same_layout(&saved.windows, &restored.windows);
}

#[tokio::test(start_paused = true)]
async fn stored_session_restores_after_reload() {
    let source = seed_source().await;
    let store = SessionStore::new(MemoryStore::default());
    store.append(snapshot::capture(&source).await.unwrap()).unwrap();

    let sessions = store.load().unwrap();
    let target = MemoryBrowser::new();
    Restorer::new(&target, RestoreOptions::default())
        .open_windows(&sessions[0].windows)
        .await
        .unwrap();

    let restored = snapshot::capture(&target).await.unwrap();
    assert_same_layout(&sessions[0].windows, &restored.windows);
}
