use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What started a refresh. All triggers run the same refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Initial,
    Manual,
    WindowChanged,
    Scheduled,
}

/// Window a refresh cycle loads, and the token it commits with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub window_id: String,
    pub token: u64,
}

#[derive(Debug, Default)]
struct Selection {
    window_id: String,
    generation: u64,
}

/// Currently selected reporting window id ("24h", "7d", ...) and the
/// refresh generation.
///
/// The two live under one lock: a ticket's window is always the selection
/// as of its token, so the newest token never carries an outdated window.
/// Any string is stored; an empty selection is reported when a refresh
/// runs, not here.
#[derive(Debug, Default)]
pub struct WindowSelector {
    selection: RwLock<Selection>,
}

impl WindowSelector {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            selection: RwLock::new(Selection {
                window_id: initial.into(),
                generation: 0,
            }),
        }
    }

    pub fn current(&self) -> String {
        self.read().window_id.clone()
    }

    /// Switch to `window_id` (if given) and take the next token.
    pub(super) fn issue(&self, window_id: Option<&str>) -> RefreshTicket {
        let mut selection = self.write();
        if let Some(window_id) = window_id {
            if selection.window_id != window_id {
                tracing::debug!("Window changed to '{}'", window_id);
                selection.window_id = window_id.to_string();
            }
        }
        selection.generation += 1;
        RefreshTicket {
            window_id: selection.window_id.clone(),
            token: selection.generation,
        }
    }

    pub(super) fn is_latest(&self, token: u64) -> bool {
        self.read().generation == token
    }

    fn read(&self) -> RwLockReadGuard<'_, Selection> {
        match self.selection.read() {
            Ok(selection) => selection,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Selection> {
        match self.selection.write() {
            Ok(selection) => selection,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
