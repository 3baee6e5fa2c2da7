//! hand-off of the transport shared by audio output and storage

/// Exclusive hardware channel shared by the audio codec and the storage medium.
///
/// Owned by the engine; the board crate wires the four primitives to its interrupt controller
/// and bus drivers.
pub trait Bus {
    /// mask the real-time audio interrupt
    fn suspend(&mut self);

    /// unmask the real-time audio interrupt
    fn resume(&mut self);

    /// hand the channel from audio output to storage
    fn release_for_storage(&mut self);

    /// hand the channel from storage back to audio output
    fn acquire_for_audio(&mut self);
}

/// Scoped storage access from a context that may hold the channel for audio.
///
/// Entering suspends preemption and then releases the channel; dropping re-acquires the channel
/// and then resumes preemption. When the channel is not held for audio the guard touches nothing.
pub struct StorageAccess<'a, B: Bus> {
    bus: &'a mut B,
    held: bool,
}

impl<'a, B: Bus> StorageAccess<'a, B> {
    pub fn new(bus: &'a mut B, held: bool) -> Self {
        if held {
            bus.suspend();
            bus.release_for_storage();
        }
        Self { bus, held }
    }
}

impl<B: Bus> Drop for StorageAccess<'_, B> {
    fn drop(&mut self) {
        if self.held {
            self.bus.acquire_for_audio();
            self.bus.resume();
        }
    }
}
