//! The popup UI, rebuilt from live browser state and saved sessions every
//! time it is shown.

pub mod render;

use std::collections::HashSet;

use chrono::Local;

use crate::host::{Window, WindowId};
use crate::model::Session;

pub const WARNING: &str = "Do NOT freeze tabs with unsaved work!";

/// State that outlives a single render within one popup session.
///
/// A fresh context is created every time the popup is opened.
#[derive(Debug, Default)]
pub struct PopupContext {
    /// The window that was focused when the popup opened. Freezing tabs can
    /// leave every window unfocused and a restore focuses its new windows,
    /// so the first focused window seen is kept for the whole session.
    focused_window: Option<WindowId>,
    expanded: HashSet<WindowId>,
}

impl PopupContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.focused_window
    }

    pub fn toggle_expanded(&mut self, id: WindowId) {
        if !self.expanded.remove(&id) {
            self.expanded.insert(id);
        }
    }

    pub fn is_expanded(&self, id: WindowId) -> bool {
        self.expanded.contains(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupAction {
    FreezeActiveTab,
    FreezeAll,
    FreezeWindow(WindowId),
    ToggleWindow(WindowId),
    SaveSession,
    Export,
    /// Index into the session list of the current render.
    OpenSession(usize),
    DeleteSession(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSection {
    pub id: WindowId,
    pub heading: String,
    pub highlighted: bool,
    pub first_tab_title: Option<String>,
    pub tab_titles: Vec<String>,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupView {
    pub windows: Vec<WindowSection>,
    pub sessions: Vec<SessionEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Enter,
    Key(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub trigger: Trigger,
    pub label: &'static str,
    pub action: PopupAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Warning,
    Action,
    WindowHeading { highlighted: bool },
    TabTitle,
    SectionTitle,
    Session,
    Note,
    Blank,
}

/// One line of the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub kind: RowKind,
    pub text: String,
    pub detail: Option<String>,
    pub buttons: Vec<Button>,
}

impl Row {
    fn plain(kind: RowKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            detail: None,
            buttons: Vec::new(),
        }
    }

    fn action(text: impl Into<String>, action: PopupAction) -> Self {
        Self {
            buttons: vec![Button {
                trigger: Trigger::Enter,
                label: "run",
                action,
            }],
            ..Self::plain(RowKind::Action, text)
        }
    }

    pub fn is_selectable(&self) -> bool {
        !self.buttons.is_empty()
    }

    pub fn action_for(&self, trigger: Trigger) -> Option<PopupAction> {
        self.buttons
            .iter()
            .find(|b| b.trigger == trigger)
            .map(|b| b.action)
    }
}

pub fn window_heading(window: &Window) -> String {
    format!(
        "Window ({}/{} frozen tabs)",
        window.discarded_count(),
        window.tabs.len()
    )
}

pub fn session_label(session: &Session) -> String {
    let local = session.timestamp.with_timezone(&Local);
    format!(
        "{} windows, {} tabs - {} - {}",
        session.window_count(),
        session.tab_count(),
        local.format("%x"),
        local.format("%X")
    )
}

/// Builds the popup from scratch. `ctx` carries the focused-window cache
/// and expanded sections across renders of one popup session.
pub fn build_view(windows: &[Window], sessions: &[Session], ctx: &mut PopupContext) -> PopupView {
    if ctx.focused_window.is_none() {
        ctx.focused_window = windows.iter().find(|w| w.focused).map(|w| w.id);
    }

    let windows = windows
        .iter()
        .map(|w| WindowSection {
            id: w.id,
            heading: window_heading(w),
            highlighted: ctx.focused_window == Some(w.id),
            first_tab_title: w.tabs.first().map(|t| t.title.clone()),
            tab_titles: w.tabs.iter().map(|t| t.title.clone()).collect(),
            expanded: ctx.is_expanded(w.id),
        })
        .collect();

    let sessions = sessions
        .iter()
        .enumerate()
        .map(|(index, s)| SessionEntry {
            index,
            label: session_label(s),
        })
        .collect();

    PopupView { windows, sessions }
}

impl PopupView {
    /// Flattens the view into display rows.
    pub fn rows(&self) -> Vec<Row> {
        let mut rows = vec![
            Row::plain(RowKind::Warning, WARNING),
            Row::action("Freeze active tab", PopupAction::FreezeActiveTab),
            Row::action("Freeze all tabs in all windows", PopupAction::FreezeAll),
            Row::plain(RowKind::Blank, ""),
        ];

        for section in &self.windows {
            let marker = if section.expanded { "▾" } else { "▸" };
            rows.push(Row {
                kind: RowKind::WindowHeading {
                    highlighted: section.highlighted,
                },
                text: format!("{} {}", marker, section.heading),
                detail: section.first_tab_title.clone(),
                buttons: vec![
                    Button {
                        trigger: Trigger::Enter,
                        label: "tabs",
                        action: PopupAction::ToggleWindow(section.id),
                    },
                    Button {
                        trigger: Trigger::Key('f'),
                        label: "freeze all tabs",
                        action: PopupAction::FreezeWindow(section.id),
                    },
                ],
            });
            if section.expanded {
                for title in &section.tab_titles {
                    rows.push(Row::plain(RowKind::TabTitle, format!("    • {}", title)));
                }
            }
        }

        rows.push(Row::plain(RowKind::Blank, ""));
        rows.push(Row::action(
            format!("Save session ({} windows)", self.windows.len()),
            PopupAction::SaveSession,
        ));
        rows.push(Row::action("Export", PopupAction::Export));
        rows.push(Row::plain(RowKind::Blank, ""));
        rows.push(Row::plain(RowKind::SectionTitle, "Saved sessions"));

        if self.sessions.is_empty() {
            rows.push(Row::plain(RowKind::Note, "No saved sessions."));
        }
        for entry in &self.sessions {
            rows.push(Row {
                kind: RowKind::Session,
                text: entry.label.clone(),
                detail: None,
                buttons: vec![
                    Button {
                        trigger: Trigger::Enter,
                        label: "open",
                        action: PopupAction::OpenSession(entry.index),
                    },
                    Button {
                        trigger: Trigger::Key('d'),
                        label: "delete",
                        action: PopupAction::DeleteSession(entry.index),
                    },
                ],
            });
        }

        rows
    }
}

/// Moves `current` to the next selectable row, staying put at either end.
pub fn step_selection(rows: &[Row], current: usize, forward: bool) -> usize {
    let candidates = rows.iter().enumerate().filter(|(_, r)| r.is_selectable());
    let next = if forward {
        candidates.map(|(i, _)| i).find(|&i| i > current)
    } else {
        candidates.map(|(i, _)| i).filter(|&i| i < current).last()
    };
    next.unwrap_or(current)
}

/// Keeps a selection valid after the rows were rebuilt.
pub fn clamp_selection(rows: &[Row], current: usize) -> usize {
    if rows.get(current).is_some_and(Row::is_selectable) {
        return current;
    }
    let before = rows[..current.min(rows.len())]
        .iter()
        .rposition(Row::is_selectable);
    before
        .or_else(|| rows.iter().position(Row::is_selectable))
        .unwrap_or(0)
}
