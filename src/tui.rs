use crossterm::{
    cursor, execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Frame, Terminal};
use std::io::{self, Stdout};

pub const POPUP_WIDTH: u16 = 72;
pub const POPUP_HEIGHT: u16 = 40;

/// The terminal while the popup is shown. Opening takes over the screen;
/// dropping gives it back.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    pub fn open() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen, cursor::Hide) {
            restore_terminal();
            return Err(e.into());
        }
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        terminal.clear()?;
        Ok(Self { terminal })
    }

    /// Draws one frame; `f` receives the popup's area within the screen.
    pub fn draw(&mut self, f: impl FnOnce(&mut Frame, Rect)) -> anyhow::Result<()> {
        self.terminal.draw(|frame| {
            let area = popup_area(frame.area());
            f(frame, area)
        })?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// A popup-sized rectangle anchored at the top of `screen`, centered
/// horizontally. Small screens are used whole.
pub fn popup_area(screen: Rect) -> Rect {
    let width = screen.width.min(POPUP_WIDTH);
    let height = screen.height.min(POPUP_HEIGHT);
    Rect {
        x: screen.x + (screen.width - width) / 2,
        y: screen.y,
        width,
        height,
    }
}

fn restore_terminal() {
    let _ = execute!(io::stdout(), cursor::Show, LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
}

/// Gives the terminal back before the default panic output is printed.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        restore_terminal();
        previous(info);
    }));
}
