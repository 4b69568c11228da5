use tracing::debug;

use crate::host::{Browser, HostError, Window, WindowId};

/// Discards the active tab of the focused window. Returns whether a tab was
/// discarded.
pub async fn freeze_active_tab<B: Browser + ?Sized>(browser: &B) -> Result<bool, HostError> {
    let windows = browser.windows().await?;
    let Some(tab) = windows
        .iter()
        .find(|w| w.focused)
        .and_then(Window::active_tab)
    else {
        return Ok(false);
    };
    browser.discard_tab(tab.id).await?;
    debug!(tab = %tab.id, "froze active tab");
    Ok(true)
}

/// Discards every tab of one window. Returns the number discarded.
pub async fn freeze_window<B: Browser + ?Sized>(
    browser: &B,
    window_id: WindowId,
) -> Result<usize, HostError> {
    let window = browser.window(window_id).await?;
    discard_all(browser, &window).await
}

/// Discards every tab of every window.
pub async fn freeze_all<B: Browser + ?Sized>(browser: &B) -> Result<usize, HostError> {
    let mut frozen = 0;
    for window in browser.windows().await? {
        frozen += discard_all(browser, &window).await?;
    }
    Ok(frozen)
}

async fn discard_all<B: Browser + ?Sized>(browser: &B, window: &Window) -> Result<usize, HostError> {
    for tab in &window.tabs {
        browser.discard_tab(tab.id).await?;
    }
    debug!(window = %window.id, tabs = window.tabs.len(), "froze window");
    Ok(window.tabs.len())
}
