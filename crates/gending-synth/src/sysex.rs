//! Recognized system-exclusive messages.

/// What a system-exclusive payload asks the synthesizer to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SysExCommand {
    /// GM System On, GM2 System On, GS Reset or XG System On.
    SystemReset,
    /// Universal Realtime Master Volume, normalized to `0.0..=1.0`.
    MasterVolume(f32),
}

const UNIVERSAL_NON_REALTIME: u8 = 0x7E;
const UNIVERSAL_REALTIME: u8 = 0x7F;
const ROLAND: u8 = 0x41;
const YAMAHA: u8 = 0x43;

/// Outcome of inspecting a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SysExParse {
    Command(SysExCommand),
    /// Well-formed but not something this synthesizer acts on.
    Unsupported { manufacturer: u8 },
    Empty,
}

/// Classify a payload. The leading `F0` and trailing `F7` are optional.
pub fn parse(bytes: &[u8]) -> SysExParse {
    let body = bytes.strip_prefix(&[0xF0]).unwrap_or(bytes);
    let body = body.strip_suffix(&[0xF7]).unwrap_or(body);
    let Some(&manufacturer) = body.first() else {
        return SysExParse::Empty;
    };

    let command = match body {
        // GM System On (09 01), GM2 System On (09 03)
        [UNIVERSAL_NON_REALTIME, _, 0x09, 0x01 | 0x03, ..] => Some(SysExCommand::SystemReset),
        [UNIVERSAL_REALTIME, _, 0x04, 0x01, lsb, msb, ..] => {
            let raw = (u16::from(*msb & 0x7F) << 7) | u16::from(*lsb & 0x7F);
            Some(SysExCommand::MasterVolume(f32::from(raw) / 16383.0))
        }
        [ROLAND, _, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, ..] => Some(SysExCommand::SystemReset),
        [YAMAHA, device, 0x4C, 0x00, 0x00, 0x7E, 0x00, ..] if device & 0xF0 == 0x10 => {
            Some(SysExCommand::SystemReset)
        }
        _ => None,
    };

    match command {
        Some(c) => SysExParse::Command(c),
        None => SysExParse::Unsupported { manufacturer },
    }
}
