/// Command sink interface consumed from the command encoder

use crate::fence::SemaphoreSlot;

/// Sink for device commands the core needs to emit.
///
/// The core knows nothing about the encoding; it only needs to append a
/// semaphore-write (the device stores `value` into `slot` when execution
/// reaches that point in the stream) and to make appended commands
/// visible to the device with `flush`.
///
/// Appended commands are NOT visible to the device until flushed; every
/// blocking wait in the core flushes first for exactly this reason.
pub trait CommandSink: Send {
    /// Append a command that writes `value` into `slot` when the device
    /// reaches it
    fn write_semaphore(&mut self, slot: &SemaphoreSlot, value: u32);

    /// Make all previously appended commands visible to the device
    fn flush(&mut self);
}
