//! Operator commands.
//!
//! Everything the operator can do, from the keyboard or the control panel,
//! is a [`Command`] pushed onto a [`CommandQueue`]. The frame driver drains
//! the queue once per frame, before ticking, so every command takes effect
//! on the next tick and draw.

use std::collections::VecDeque;

use crate::input::{Input, KeyCode};
pub use crate::params::ParamUpdate;

/// One operator action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Stop,
    ToggleRunning,
    /// Negate the simulation speed.
    ReverseTime,
    /// Reseed every particle without touching the run state.
    Restart,
    /// Reallocate for a new particle count, reseed and rebind.
    SetParticleCount(u32),
    /// Write one simulation parameter.
    Set(ParamUpdate),
    SetCameraInput(bool),
    ToggleCameraInput,
    Exit,
}

impl From<ParamUpdate> for Command {
    fn from(update: ParamUpdate) -> Self {
        Command::Set(update)
    }
}

/// FIFO of pending commands.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: impl Into<Command>) {
        self.pending.push_back(command.into());
    }

    /// Take every pending command, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Command> + '_ {
        self.pending.drain(..)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Keys that map to commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    pub toggle_running: KeyCode,
    pub reverse_time: KeyCode,
    pub restart: KeyCode,
    pub toggle_camera_input: KeyCode,
    pub exit: KeyCode,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            toggle_running: KeyCode::P,
            reverse_time: KeyCode::T,
            restart: KeyCode::R,
            toggle_camera_input: KeyCode::C,
            exit: KeyCode::Escape,
        }
    }
}

impl KeyBindings {
    /// Queue a command for every bound key pressed this frame.
    pub fn collect(&self, input: &Input, queue: &mut CommandQueue) {
        let bindings = [
            (self.toggle_running, Command::ToggleRunning),
            (self.reverse_time, Command::ReverseTime),
            (self.restart, Command::Restart),
            (self.toggle_camera_input, Command::ToggleCameraInput),
            (self.exit, Command::Exit),
        ];
        for (key, command) in bindings {
            if input.key_pressed(key) {
                queue.push(command);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = CommandQueue::new();
        queue.push(Command::Start);
        queue.push(ParamUpdate::SimSpeed(2.0));
        queue.push(Command::Stop);

        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(
            drained,
            vec![
                Command::Start,
                Command::Set(ParamUpdate::SimSpeed(2.0)),
                Command::Stop
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bindings_fire_on_press_only() {
        let bindings = KeyBindings::default();
        let mut input = Input::new();
        let mut queue = CommandQueue::new();

        input.press_key(KeyCode::P);
        input.press_key(KeyCode::T);
        bindings.collect(&input, &mut queue);
        assert_eq!(queue.len(), 2);

        // Held, not newly pressed.
        queue.drain().for_each(drop);
        input.begin_frame();
        bindings.collect(&input, &mut queue);
        assert!(queue.is_empty());
    }
}
