use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{layout::Rect, Frame};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::clipboard;
use crate::config::Config;
use crate::event::{self, AppEvent};
use crate::freeze;
use crate::host::Browser;
use crate::model::Session;
use crate::popup::{self, render, PopupAction, PopupContext, Row, Trigger};
use crate::restore::{RestoreError, RestoreReport, Restorer};
use crate::snapshot;
use crate::store::{KeyValueStore, SessionStore};
use crate::tui::Tui;

/// One popup session: everything here is dropped when the popup closes.
pub struct App<K> {
    pub should_quit: bool,
    browser: Arc<dyn Browser>,
    store: SessionStore<K>,
    config: Config,
    ctx: PopupContext,
    /// Session list as loaded for the current render.
    sessions: Vec<Session>,
    rows: Vec<Row>,
    selected: usize,
    status: Option<String>,
    restoring: bool,
    event_tx: mpsc::UnboundedSender<AppEvent>,
}

impl<K: KeyValueStore> App<K> {
    pub fn new(
        browser: Arc<dyn Browser>,
        store: SessionStore<K>,
        config: Config,
        event_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            browser,
            store,
            config,
            ctx: PopupContext::new(),
            sessions: Vec::new(),
            rows: Vec::new(),
            selected: 0,
            status: None,
            restoring: false,
            event_tx,
        }
    }

    /// Shows the popup in the terminal until the user closes it. A restore
    /// still in flight is awaited before returning.
    pub async fn run(
        browser: Arc<dyn Browser>,
        store: SessionStore<K>,
        config: Config,
    ) -> anyhow::Result<()> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        event::start_event_loop(event_tx.clone());

        let mut tui = Tui::open()?;

        let mut app = App::new(browser, store, config, event_tx);
        app.refresh().await?;

        loop {
            tui.draw(|frame, area| app.draw(frame, area))?;

            match event_rx.recv().await {
                Some(event) => app.handle_event(event).await?,
                None => break,
            }

            if app.should_quit {
                break;
            }
        }

        if app.restoring {
            app.status = Some("Finishing restore…".to_string());
            tui.draw(|frame, area| app.draw(frame, area))?;
            while app.restoring {
                match event_rx.recv().await {
                    Some(AppEvent::RestoreFinished(result)) => app.finish_restore(result),
                    Some(_) => continue,
                    None => break,
                }
            }
        }

        Ok(())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        render::render(
            &self.rows,
            self.selected,
            self.status.as_deref(),
            &self.config.theme,
            frame,
            area,
        );
    }

    /// Rebuilds the whole popup from the browser and the store.
    pub async fn refresh(&mut self) -> anyhow::Result<()> {
        let windows = self.browser.windows().await?;
        self.sessions = match self.store.load() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "could not load saved sessions");
                self.status = Some(format!("Saved sessions unreadable: {}", e));
                Vec::new()
            }
        };
        let view = popup::build_view(&windows, &self.sessions, &mut self.ctx);
        self.rows = view.rows();
        self.selected = popup::clamp_selection(&self.rows, self.selected);
        Ok(())
    }

    pub async fn handle_event(&mut self, event: AppEvent) -> anyhow::Result<()> {
        match event {
            AppEvent::Key(key) => self.handle_key(key).await,
            AppEvent::Resize => Ok(()),
            AppEvent::RestoreFinished(result) => {
                self.finish_restore(result);
                self.refresh().await
            }
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<()> {
        let action = match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
                return Ok(());
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                return Ok(());
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = popup::step_selection(&self.rows, self.selected, false);
                return Ok(());
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = popup::step_selection(&self.rows, self.selected, true);
                return Ok(());
            }
            KeyCode::Char('s') => Some(PopupAction::SaveSession),
            KeyCode::Char('e') => Some(PopupAction::Export),
            KeyCode::Enter | KeyCode::Char(' ') => self.selected_action(Trigger::Enter),
            KeyCode::Char(c) => self.selected_action(Trigger::Key(c)),
            _ => None,
        };

        let Some(action) = action else {
            return Ok(());
        };
        if let Err(e) = self.perform(action).await {
            warn!(?action, error = %e, "popup action failed");
            self.status = Some(format!("Error: {}", e));
            self.refresh().await?;
        }
        Ok(())
    }

    fn selected_action(&self, trigger: Trigger) -> Option<PopupAction> {
        self.rows.get(self.selected)?.action_for(trigger)
    }

    pub async fn perform(&mut self, action: PopupAction) -> anyhow::Result<()> {
        self.status = None;
        match action {
            PopupAction::FreezeActiveTab => {
                freeze::freeze_active_tab(self.browser.as_ref()).await?;
            }
            PopupAction::FreezeAll => {
                let frozen = freeze::freeze_all(self.browser.as_ref()).await?;
                self.status = Some(format!("Froze {} tabs", frozen));
            }
            PopupAction::FreezeWindow(id) => {
                freeze::freeze_window(self.browser.as_ref(), id).await?;
            }
            PopupAction::ToggleWindow(id) => self.ctx.toggle_expanded(id),
            PopupAction::SaveSession => {
                let mut session = snapshot::capture(self.browser.as_ref()).await?;
                session.refresh_timestamp();
                let windows = session.window_count();
                self.store.append(session)?;
                self.status = Some(format!("Saved session ({} windows)", windows));
            }
            PopupAction::Export => self.export()?,
            PopupAction::OpenSession(index) => self.open_session(index),
            PopupAction::DeleteSession(index) => {
                self.store.delete(&mut self.sessions, index)?;
            }
        }
        self.refresh().await
    }

    fn export(&mut self) -> anyhow::Result<()> {
        let raw = self.store.export_raw()?.unwrap_or_else(|| "[]".to_string());
        let message = match clipboard::copy_to_clipboard(&raw) {
            Ok(()) => "Copied to clipboard",
            Err(e) => {
                warn!(error = %e, "export failed");
                "Export failed"
            }
        };
        self.status = Some(message.to_string());
        Ok(())
    }

    /// Starts restoring a session in the background; completion arrives as
    /// [`AppEvent::RestoreFinished`]. A running restore cannot be stopped, and
    /// only one runs at a time.
    fn open_session(&mut self, index: usize) {
        if self.restoring {
            self.status = Some("Restore already running".to_string());
            return;
        }
        let Some(session) = self.sessions.get(index).cloned() else {
            return;
        };
        let browser = Arc::clone(&self.browser);
        let options = self.config.restore.clone();
        let event_tx = self.event_tx.clone();

        info!(windows = session.window_count(), tabs = session.tab_count(), "opening session");
        self.restoring = true;
        self.status = Some(format!("Restoring {} windows…", session.window_count()));

        tokio::spawn(async move {
            let result = Restorer::new(browser.as_ref(), options)
                .open_windows(&session.windows)
                .await;
            let _ = event_tx.send(AppEvent::RestoreFinished(result));
        });
    }

    fn finish_restore(&mut self, result: Result<Vec<RestoreReport>, RestoreError>) {
        self.restoring = false;
        self.status = Some(match result {
            Ok(reports) => {
                let tabs: usize = reports.iter().map(|r| r.created).sum();
                let timed_out: usize = reports.iter().map(|r| r.timed_out).sum();
                if timed_out > 0 {
                    format!(
                        "Restored {} windows, {} tabs ({} did not load in time)",
                        reports.len(),
                        tabs,
                        timed_out
                    )
                } else {
                    format!("Restored {} windows, {} tabs", reports.len(), tabs)
                }
            }
            Err(e) => {
                warn!(error = %e, "restore failed");
                format!("Restore failed: {}", e)
            }
        });
    }
}
