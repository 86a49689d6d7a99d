//! Debounced autosave for free-text fields such as the fee `protocolo`.
//!
//! Edits are buffered and written after a quiet interval, or at once when the field
//! loses focus. A newer edit restarts the interval. Saves run one at a time on the
//! field's own task, and a failed save puts the last confirmed value back on display.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Destination of an autosaved value.
pub trait FieldSink: Send + Sync {
    /// Writes the value and returns it as stored, which may be normalized.
    fn persist(&self, value: &str) -> Result<String, AutosaveError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutosaveError {
    #[error("autosave task has stopped")]
    Closed,
    #[error("save failed: {0}")]
    Save(String),
}

/// Snapshot of the field as the user sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutosaveState {
    pub displayed: String,
    pub saved: String,
    pub dirty: bool,
    pub saves: u64,
    pub last_error: Option<String>,
}

enum Command {
    Edit(String),
    Blur,
}

pub struct AutosaveField {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<AutosaveState>,
    task: JoinHandle<()>,
}

impl AutosaveField {
    /// Starts the field task on the current tokio runtime.
    pub fn spawn(initial: impl Into<String>, quiet: Duration, sink: Arc<dyn FieldSink>) -> Self {
        let initial = initial.into();
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(AutosaveState {
            displayed: initial.clone(),
            saved: initial,
            dirty: false,
            saves: 0,
            last_error: None,
        });

        let task = tokio::spawn(run(receiver, state_tx, quiet, sink));

        Self {
            commands,
            state,
            task,
        }
    }

    pub fn edit(&self, value: impl Into<String>) -> Result<(), AutosaveError> {
        self.commands
            .send(Command::Edit(value.into()))
            .map_err(|_| AutosaveError::Closed)
    }

    /// Focus left the field: save now instead of waiting for the interval.
    pub fn blur(&self) -> Result<(), AutosaveError> {
        self.commands
            .send(Command::Blur)
            .map_err(|_| AutosaveError::Closed)
    }

    pub fn state(&self) -> AutosaveState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveState> {
        self.state.clone()
    }

    /// Flushes any pending edit, stops the task and returns the final state.
    pub async fn close(self) -> Result<AutosaveState, AutosaveError> {
        let Self {
            commands,
            state,
            task,
        } = self;
        drop(commands);
        task.await.map_err(|_| AutosaveError::Closed)?;
        let last = state.borrow().clone();
        Ok(last)
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<AutosaveState>,
    quiet: Duration,
    sink: Arc<dyn FieldSink>,
) {
    let mut pending: Option<String> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Edit(value)) => {
                    deadline = Some(Instant::now() + quiet);
                    state.send_modify(|current| {
                        current.displayed = value.clone();
                        current.dirty = true;
                    });
                    pending = Some(value);
                }
                Some(Command::Blur) => {
                    deadline = None;
                    if let Some(value) = pending.take() {
                        save(&state, sink.as_ref(), value);
                    }
                }
                None => {
                    if let Some(value) = pending.take() {
                        save(&state, sink.as_ref(), value);
                    }
                    break;
                }
            },
            _ = timer => {
                deadline = None;
                if let Some(value) = pending.take() {
                    save(&state, sink.as_ref(), value);
                }
            }
        }
    }
}

fn save(state: &watch::Sender<AutosaveState>, sink: &dyn FieldSink, value: String) {
    if state.borrow().saved == value {
        state.send_modify(|current| current.dirty = false);
        return;
    }

    match sink.persist(&value) {
        Ok(stored) => {
            debug!(chars = stored.chars().count(), "autosave committed");
            state.send_modify(|current| {
                if current.displayed == value {
                    current.displayed = stored.clone();
                }
                current.saved = stored;
                current.dirty = false;
                current.saves += 1;
                current.last_error = None;
            });
        }
        Err(err) => {
            warn!(error = %err, "autosave failed, reverting field");
            state.send_modify(|current| {
                current.displayed = current.saved.clone();
                current.dirty = false;
                current.last_error = Some(err.to_string());
            });
        }
    }
}
