use crate::ecs::{Handle, Vec2};

/// One-shot instruction from simulation to presentation. Entity-targeted
/// variants carry a [`Handle`] so consumers can detect recycled targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SpawnView {
        handle: Handle,
        asset_key: String,
        position: Vec2,
    },
    SetPosition {
        handle: Handle,
        position: Vec2,
    },
    PlayAnimation {
        handle: Handle,
        animation: String,
        looping: bool,
    },
    PlayEffectAt {
        effect: String,
        position: Vec2,
    },
    PlayEffectOn {
        handle: Handle,
        effect: String,
    },
    PlaySfx {
        sound: String,
    },
    PlayBgm {
        track: String,
    },
    DestroyView {
        handle: Handle,
    },
}

impl Command {
    pub fn target(&self) -> Option<Handle> {
        match self {
            Self::SpawnView { handle, .. }
            | Self::SetPosition { handle, .. }
            | Self::PlayAnimation { handle, .. }
            | Self::PlayEffectOn { handle, .. }
            | Self::DestroyView { handle } => Some(*handle),
            Self::PlayEffectAt { .. } | Self::PlaySfx { .. } | Self::PlayBgm { .. } => None,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::SpawnView { .. } => CommandKind::SpawnView,
            Self::SetPosition { .. } => CommandKind::SetPosition,
            Self::PlayAnimation { .. } => CommandKind::PlayAnimation,
            Self::PlayEffectAt { .. } => CommandKind::PlayEffectAt,
            Self::PlayEffectOn { .. } => CommandKind::PlayEffectOn,
            Self::PlaySfx { .. } => CommandKind::PlaySfx,
            Self::PlayBgm { .. } => CommandKind::PlayBgm,
            Self::DestroyView { .. } => CommandKind::DestroyView,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SpawnView,
    SetPosition,
    PlayAnimation,
    PlayEffectAt,
    PlayEffectOn,
    PlaySfx,
    PlayBgm,
    DestroyView,
}

#[derive(Debug, Default)]
pub struct CommandBuffer {
    pending: Vec<Command>,
    flushed_total: u64,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.pending.push(command);
    }

    /// Hands back everything pushed so far, in push order, and empties the
    /// buffer.
    pub fn flush(&mut self) -> Vec<Command> {
        let drained = std::mem::take(&mut self.pending);
        self.flushed_total = self.flushed_total.saturating_add(drained.len() as u64);
        drained
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> &[Command] {
        &self.pending
    }

    pub fn flushed_total(&self) -> u64 {
        self.flushed_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::HandleRegistry;

    #[test]
    fn flush_preserves_order_and_clears() {
        let mut registry = HandleRegistry::new();
        let handle = registry.create();
        let mut buffer = CommandBuffer::new();
        buffer.push(Command::PlaySfx {
            sound: "hit".to_string(),
        });
        buffer.push(Command::DestroyView { handle });

        let flushed = buffer.flush();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].kind(), CommandKind::PlaySfx);
        assert_eq!(flushed[1].target(), Some(handle));
        assert!(buffer.is_empty());
        assert_eq!(buffer.flushed_total(), 2);
        assert!(buffer.flush().is_empty());
    }
}
