//! The channel-message surface shared by the synthesizer and its handle.

/// MIDI channel-voice and system control. Implemented directly by
/// [`Synthesizer`](crate::Synthesizer) (render side, applied at once) and by
/// [`SynthHandle`](crate::SynthHandle) (control side, queued).
pub trait SynthControl {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, note: u8);

    /// With `lock` set the write always lands and pins the controller;
    /// later unlocked writes to it are ignored.
    fn controller_change(&mut self, channel: u8, controller: u8, value: u8, lock: bool);

    fn program_change(&mut self, channel: u8, program: u8);

    /// 14-bit value, 8192 is center.
    fn pitch_bend(&mut self, channel: u8, value: u16);

    fn channel_pressure(&mut self, channel: u8, pressure: u8);

    fn poly_pressure(&mut self, channel: u8, note: u8, pressure: u8);

    /// Payload with or without the leading `F0`.
    fn system_exclusive(&mut self, data: &[u8]);

    /// Release held notes; `None` targets every channel.
    fn all_notes_off(&mut self, channel: Option<u8>);

    /// Silence every voice quickly; `None` targets every channel.
    fn all_sound_off(&mut self, channel: Option<u8>);

    fn reset_all_controllers(&mut self, channel: Option<u8>);

    /// Full reset: silence, then programs, banks and controllers back to defaults.
    /// Locked controllers keep their values.
    fn reset_system(&mut self);
}
