use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::restore::{RestoreError, RestoreReport};

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    /// A restore started from the popup has ended.
    RestoreFinished(Result<Vec<RestoreReport>, RestoreError>),
}

/// Forwards terminal input to `event_tx` until the receiver goes away.
pub fn start_event_loop(event_tx: mpsc::UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut reader = EventStream::new();
        while let Some(Ok(event)) = reader.next().await {
            let app_event = match event {
                Event::Key(key) if key.kind != KeyEventKind::Release => AppEvent::Key(key),
                Event::Resize(_, _) => AppEvent::Resize,
                _ => continue,
            };
            if event_tx.send(app_event).is_err() {
                break;
            }
        }
    });
}
