//! Per-channel MIDI state: program, controllers, pitch wheel, RPN/NRPN.

use gending_soundfont::{GeneralController, ModulatorSource, SourceKind};

/// Controller numbers with side effects.
pub mod cc {
    pub const BANK_SELECT: u8 = 0;
    pub const MODULATION: u8 = 1;
    pub const DATA_ENTRY: u8 = 6;
    pub const VOLUME: u8 = 7;
    pub const PAN: u8 = 10;
    pub const EXPRESSION: u8 = 11;
    pub const BANK_SELECT_LSB: u8 = 32;
    pub const DATA_ENTRY_LSB: u8 = 38;
    pub const SUSTAIN: u8 = 64;
    pub const SOSTENUTO: u8 = 66;
    pub const DATA_INCREMENT: u8 = 96;
    pub const DATA_DECREMENT: u8 = 97;
    pub const NRPN_LSB: u8 = 98;
    pub const NRPN_MSB: u8 = 99;
    pub const RPN_LSB: u8 = 100;
    pub const RPN_MSB: u8 = 101;
    pub const ALL_SOUND_OFF: u8 = 120;
    pub const RESET_ALL_CONTROLLERS: u8 = 121;
    pub const ALL_NOTES_OFF: u8 = 123;
}

pub const PITCH_BEND_CENTER: u16 = 8192;

/// Which parameter number data-entry currently addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataTarget {
    None,
    Rpn,
    Nrpn,
}

#[derive(Debug, Clone)]
pub struct Channel {
    index: u8,
    controllers: [u8; 128],
    locked: u128,
    program: u8,
    bank_msb: u8,
    bank_lsb: u8,
    drum: bool,
    pitch_bend: u16,
    channel_pressure: u8,
    poly_pressure: [u8; 128],
    data_target: DataTarget,
    /// Semitones + cents, in cents.
    pitch_bend_range: i32,
    fine_tuning_cents: f32,
    coarse_tuning_semitones: i32,
}

/// Default controller values after reset-all-controllers.
fn default_controllers() -> [u8; 128] {
    let mut c = [0u8; 128];
    c[cc::VOLUME as usize] = 100;
    c[cc::PAN as usize] = 64;
    c[cc::EXPRESSION as usize] = 127;
    c[cc::NRPN_LSB as usize] = 127;
    c[cc::NRPN_MSB as usize] = 127;
    c[cc::RPN_LSB as usize] = 127;
    c[cc::RPN_MSB as usize] = 127;
    c
}

impl Channel {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            controllers: default_controllers(),
            locked: 0,
            program: 0,
            bank_msb: 0,
            bank_lsb: 0,
            drum: index % 16 == 9,
            pitch_bend: PITCH_BEND_CENTER,
            channel_pressure: 0,
            poly_pressure: [0; 128],
            data_target: DataTarget::None,
            pitch_bend_range: 200,
            fine_tuning_cents: 0.0,
            coarse_tuning_semitones: 0,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn program(&self) -> u8 {
        self.program
    }

    pub fn set_program(&mut self, program: u8) {
        self.program = program & 0x7F;
    }

    /// SoundFont bank: 128 on drum channels, bank-select MSB otherwise.
    pub fn bank(&self) -> u16 {
        if self.drum {
            128
        } else {
            u16::from(self.bank_msb)
        }
    }

    pub fn is_drum(&self) -> bool {
        self.drum
    }

    pub fn set_drum(&mut self, drum: bool) {
        self.drum = drum;
    }

    #[inline]
    pub fn controller(&self, controller: u8) -> u8 {
        self.controllers[usize::from(controller & 0x7F)]
    }

    pub fn is_locked(&self, controller: u8) -> bool {
        self.locked & (1u128 << (controller & 0x7F)) != 0
    }

    pub fn unlock(&mut self, controller: u8) {
        self.locked &= !(1u128 << (controller & 0x7F));
    }

    /// Write a controller value. Returns false when the write was ignored
    /// because the controller is locked and `lock` is not set.
    pub fn set_controller(&mut self, controller: u8, value: u8, lock: bool) -> bool {
        let controller = controller & 0x7F;
        let value = value & 0x7F;
        if self.is_locked(controller) && !lock {
            return false;
        }
        if lock {
            self.locked |= 1u128 << controller;
        }
        self.controllers[usize::from(controller)] = value;

        match controller {
            cc::BANK_SELECT => self.bank_msb = value,
            cc::BANK_SELECT_LSB => self.bank_lsb = value,
            cc::RPN_LSB | cc::RPN_MSB => self.data_target = DataTarget::Rpn,
            cc::NRPN_LSB | cc::NRPN_MSB => self.data_target = DataTarget::Nrpn,
            cc::DATA_ENTRY => {
                // a new MSB starts a new value: the fine part is cleared
                if !self.is_locked(cc::DATA_ENTRY_LSB) {
                    self.controllers[usize::from(cc::DATA_ENTRY_LSB)] = 0;
                }
                self.apply_data_entry();
            }
            cc::DATA_ENTRY_LSB => self.apply_data_entry(),
            cc::DATA_INCREMENT | cc::DATA_DECREMENT => self.step_data_entry(controller == cc::DATA_INCREMENT),
            _ => {}
        }
        true
    }

    fn rpn(&self) -> (u8, u8) {
        (self.controller(cc::RPN_MSB), self.controller(cc::RPN_LSB))
    }

    fn apply_data_entry(&mut self) {
        if self.data_target != DataTarget::Rpn {
            // NRPN parameters are accepted but have no effect here
            return;
        }
        let msb = self.controller(cc::DATA_ENTRY);
        let lsb = self.controller(cc::DATA_ENTRY_LSB);
        match self.rpn() {
            (0, 0) => self.pitch_bend_range = i32::from(msb) * 100 + i32::from(lsb.min(99)),
            (0, 1) => {
                let raw = ((i32::from(msb) << 7) | i32::from(lsb)) - 8192;
                self.fine_tuning_cents = raw as f32 / 8192.0 * 100.0;
            }
            (0, 2) => self.coarse_tuning_semitones = i32::from(msb) - 64,
            _ => {}
        }
    }

    fn step_data_entry(&mut self, up: bool) {
        if self.data_target == DataTarget::Rpn && self.rpn() == (0, 0) {
            let semis = self.pitch_bend_range / 100 + if up { 1 } else { -1 };
            self.pitch_bend_range = semis.clamp(0, 127) * 100 + self.pitch_bend_range % 100;
        }
    }

    pub fn pitch_bend(&self) -> u16 {
        self.pitch_bend
    }

    pub fn set_pitch_bend(&mut self, value: u16) {
        self.pitch_bend = value.min(16383);
    }

    /// Current bend in cents, scaled by the pitch-bend range.
    pub fn pitch_bend_cents(&self) -> f32 {
        let normalized = (f32::from(self.pitch_bend) - 8192.0) / 8192.0;
        normalized * self.pitch_bend_range as f32
    }

    pub fn pitch_bend_range_cents(&self) -> i32 {
        self.pitch_bend_range
    }

    /// RPN fine + coarse tuning, in cents.
    pub fn tuning_cents(&self) -> f32 {
        self.fine_tuning_cents + self.coarse_tuning_semitones as f32 * 100.0
    }

    pub fn set_channel_pressure(&mut self, pressure: u8) {
        self.channel_pressure = pressure & 0x7F;
    }

    pub fn set_poly_pressure(&mut self, note: u8, pressure: u8) {
        self.poly_pressure[usize::from(note & 0x7F)] = pressure & 0x7F;
    }

    pub fn sustain(&self) -> bool {
        self.controller(cc::SUSTAIN) >= 64
    }

    pub fn sostenuto(&self) -> bool {
        self.controller(cc::SOSTENUTO) >= 64
    }

    /// Controller reset: every unlocked controller back to its default,
    /// pitch wheel centered, pressure cleared, RPN deselected.
    /// Bank and program are kept.
    pub fn reset_controllers(&mut self) {
        let defaults = default_controllers();
        for (i, value) in defaults.iter().enumerate() {
            // bank select survives a controller reset
            if i == cc::BANK_SELECT as usize || i == cc::BANK_SELECT_LSB as usize {
                continue;
            }
            if self.locked & (1u128 << i) == 0 {
                self.controllers[i] = *value;
            }
        }
        self.pitch_bend = PITCH_BEND_CENTER;
        self.channel_pressure = 0;
        self.poly_pressure = [0; 128];
        self.data_target = DataTarget::None;
    }

    /// System reset: controllers, bank, program and RPN settings. Locks stay.
    pub fn reset_all(&mut self) {
        self.reset_controllers();
        self.program = 0;
        self.bank_msb = 0;
        self.bank_lsb = 0;
        if !self.is_locked(cc::BANK_SELECT) {
            self.controllers[cc::BANK_SELECT as usize] = 0;
        }
        if !self.is_locked(cc::BANK_SELECT_LSB) {
            self.controllers[cc::BANK_SELECT_LSB as usize] = 0;
        }
        self.drum = self.index % 16 == 9;
        self.pitch_bend_range = 200;
        self.fine_tuning_cents = 0.0;
        self.coarse_tuning_semitones = 0;
    }

    /// Normalized (`0.0..=1.0`) input for a modulator source, before its curve.
    /// `None` for sources that never contribute.
    pub fn source_input(&self, source: ModulatorSource, key: u8, velocity: u8) -> Option<f32> {
        let v7 = |v: u8| f32::from(v) / 127.0;
        match source.kind() {
            SourceKind::Controller(n) => Some(v7(self.controller(n))),
            SourceKind::General(g) => match g {
                GeneralController::NoController => None,
                GeneralController::NoteOnVelocity => Some(v7(velocity)),
                GeneralController::NoteOnKey => Some(v7(key)),
                GeneralController::PolyPressure => Some(v7(self.poly_pressure[usize::from(key & 0x7F)])),
                GeneralController::ChannelPressure => Some(v7(self.channel_pressure)),
                GeneralController::PitchWheel => Some(f32::from(self.pitch_bend) / 16383.0),
                GeneralController::PitchWheelSensitivity => {
                    Some((self.pitch_bend_range as f32 / 100.0 / 127.0).min(1.0))
                }
                GeneralController::Link | GeneralController::Unknown(_) => None,
            },
        }
    }
}
