//! [`CommandQueue`] – pending outbound commands.
//!
//! Unbounded FIFO shared between the producers (the vehicle-state subscriber
//! and the connection manager) and the single consumer (the dispatcher
//! tick).  Every operation takes the same lock.

use std::collections::VecDeque;
use std::sync::Mutex;

use rcdrive_types::{Command, ConnectionError};

use crate::worker::lock;

#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: Command) {
        lock(&self.commands).push_back(command);
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.commands).is_empty()
    }

    pub fn len(&self) -> usize {
        lock(&self.commands).len()
    }

    /// Remove and return the oldest command.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::EmptyQueue`] when nothing is queued; check
    /// [`is_empty`][Self::is_empty] first.
    pub fn pop_front(&self) -> Result<Command, ConnectionError> {
        lock(&self.commands)
            .pop_front()
            .ok_or(ConnectionError::EmptyQueue)
    }

    /// Copy of the queued commands, oldest first.
    pub fn pending(&self) -> Vec<Command> {
        lock(&self.commands).iter().copied().collect()
    }
}
