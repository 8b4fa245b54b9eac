use std::sync::Arc;

use ringbuf::traits::Split;
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::output::OutputMode;
use crate::params::ManualOverrides;
use crate::timeline::CompiledTimeline;

/// Control messages pushed from the transport into the render callback.
///
/// The render side drains the queue at the start of each cycle, so a command
/// is either fully applied to a block or not at all.
#[derive(Debug, Clone)]
pub enum Command {
    Load(Arc<CompiledTimeline>),
    Play,
    Resume,
    Pause,
    Stop { fade: bool },
    SetVolume(f32),
    SetOutputMode(OutputMode),
    SetOverrides(ManualOverrides),
}

pub type CommandSender = HeapProd<Command>;
pub type CommandReceiver = HeapCons<Command>;

/// Lock-free single-producer single-consumer command queue.
pub fn channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    HeapRb::<Command>::new(capacity).split()
}
