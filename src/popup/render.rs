use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::{Row, RowKind, Trigger};
use crate::config::Theme;

const HINTS: &str = "[↑↓] move  [enter] select  [s] save  [e] export  [q] close";

pub fn render(
    rows: &[Row],
    selected: usize,
    status: Option<&str>,
    theme: &Theme,
    frame: &mut Frame,
    area: Rect,
) {
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title("───── tab-freezer ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [body, footer] = Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(inner);

    let height = body.height as usize;
    let offset = scroll_offset(selected, height);
    let width = body.width as usize;

    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .skip(offset)
        .take(height)
        .map(|(i, row)| row_line(row, i == selected, width, theme))
        .collect();
    frame.render_widget(Paragraph::new(lines), body);

    let footer_line = match status {
        Some(msg) => Line::styled(format!(" {}", msg), Style::default().fg(theme.accent)),
        None => Line::styled(format!(" {}", HINTS), Style::default().fg(theme.dim)),
    };
    frame.render_widget(Paragraph::new(footer_line), footer);
}

fn scroll_offset(selected: usize, height: usize) -> usize {
    if height == 0 {
        return 0;
    }
    selected.saturating_sub(height - 1)
}

fn row_line<'a>(row: &'a Row, is_selected: bool, width: usize, theme: &Theme) -> Line<'a> {
    let prefix = if is_selected { " ▸ " } else { "   " };
    let base = match row.kind {
        RowKind::Warning => Style::default()
            .fg(theme.warning)
            .add_modifier(Modifier::BOLD),
        RowKind::WindowHeading { highlighted: true } => {
            Style::default().fg(Color::Black).bg(theme.highlight)
        }
        RowKind::SectionTitle => Style::default()
            .fg(theme.accent)
            .add_modifier(Modifier::BOLD),
        RowKind::TabTitle | RowKind::Note => Style::default().fg(theme.dim),
        _ => Style::default().fg(theme.fg),
    };
    let text_style = if is_selected {
        base.add_modifier(Modifier::BOLD)
    } else {
        base
    };

    let mut spans = vec![
        Span::styled(prefix, Style::default().fg(theme.accent)),
        Span::styled(row.text.as_str(), text_style),
    ];

    if is_selected {
        for button in row.buttons.iter().filter(|b| b.trigger != Trigger::Enter) {
            if let Trigger::Key(key) = button.trigger {
                spans.push(Span::styled(
                    format!("  [{}] {}", key, button.label),
                    Style::default().fg(theme.dim),
                ));
            }
        }
    }

    if let Some(detail) = &row.detail {
        let used: usize = spans.iter().map(|s| s.content.width()).sum();
        let room = width.saturating_sub(used + 4);
        if room > 0 {
            spans.push(Span::styled(
                format!("  - {}", truncate(detail, room)),
                Style::default().fg(theme.dim),
            ));
        }
    }

    Line::from(spans)
}

/// Cuts `text` to at most `max` display columns, ending in an ellipsis when
/// shortened.
pub fn truncate(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}
