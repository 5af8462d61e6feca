//! Ordered, rollback-capable sequences of commands.

use crate::command::Command;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Commands may still be pushed; nothing has run yet.
    Pending,
    /// Every command succeeded.
    Committed,
    /// A command failed and the completed ones were undone.
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Pending => "pending",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

/// Runs commands in order and unwinds the completed ones on failure.
///
/// Completed commands are tracked explicitly, so only commands whose
/// `execute` returned `Ok` are undone, newest first. A command that fails
/// is responsible for its own partial state.
pub struct Transaction<'a> {
    pending: VecDeque<Box<dyn Command + 'a>>,
    completed: Vec<Box<dyn Command + 'a>>,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    /// Create an empty transaction.
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            completed: Vec::new(),
            state: TransactionState::Pending,
        }
    }

    /// Builder-style [`push`](Self::push) for assembling a transaction inline.
    pub fn with(mut self, command: impl Command + 'a) -> Self {
        self.pending.push_back(Box::new(command));
        self
    }

    /// Append a command. Only allowed before the transaction has run.
    pub fn push(&mut self, command: impl Command + 'a) -> Result<()> {
        if self.state != TransactionState::Pending {
            return Err(Error::TransactionClosed {
                state: self.state.to_string(),
            });
        }
        self.pending.push_back(Box::new(command));
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Run every command in order.
    ///
    /// On the first failure the remaining commands are skipped and the
    /// completed ones are undone in reverse order. The original error is
    /// returned; undo failures are attached to it as
    /// [`Error::RollbackFailed`] rather than dropped.
    pub fn execute(&mut self) -> Result<()> {
        if self.state != TransactionState::Pending {
            return Err(Error::TransactionClosed {
                state: self.state.to_string(),
            });
        }

        while let Some(mut command) = self.pending.pop_front() {
            debug!(command = %command.describe(), "execute");
            match command.execute() {
                Ok(()) => self.completed.push(command),
                Err(err) => {
                    warn!(command = %command.describe(), error = %err, "command failed, rolling back");
                    self.pending.clear();
                    let failures = self.rollback();
                    self.state = TransactionState::RolledBack;
                    return Err(Error::with_rollback(err, failures));
                }
            }
        }

        self.completed.clear();
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Undo completed commands newest first, collecting every undo failure.
    fn rollback(&mut self) -> Vec<Error> {
        let mut failures = Vec::new();
        while let Some(mut command) = self.completed.pop() {
            if !command.is_undoable() {
                continue;
            }
            debug!(command = %command.describe(), "undo");
            if let Err(err) = command.undo() {
                warn!(command = %command.describe(), error = %err, "undo failed");
                failures.push(err);
            }
        }
        failures
    }
}

impl Default for Transaction<'_> {
    fn default() -> Self {
        Self::new()
    }
}
