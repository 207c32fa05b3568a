//! In-memory SF2 writer for tests.
//!
//! Produces small but structurally complete banks (INFO, sdta, pdta with
//! terminal records) so parser and synthesizer tests need no files on disk.

use crate::generator::GeneratorType;
use crate::modulator::Modulator;

/// One sample to embed. Loop points are relative to the sample's first frame.
#[derive(Debug, Clone)]
pub struct SampleSpec {
    pub name: String,
    pub frames: Vec<i16>,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sample_rate: u32,
    pub root_key: u8,
    pub pitch_correction: i8,
    pub sample_type: u16,
}

impl SampleSpec {
    /// Mono sine at `freq` Hz, with the loop spanning the whole sample.
    pub fn sine(name: &str, len: usize, sample_rate: u32, root_key: u8, freq: f32) -> Self {
        let frames = (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((t * freq * std::f32::consts::TAU).sin() * 16000.0) as i16
            })
            .collect();
        Self {
            name: name.to_string(),
            frames,
            loop_start: 0,
            loop_end: len as u32,
            sample_rate,
            root_key,
            pitch_correction: 0,
            sample_type: 1,
        }
    }

    /// Constant-value sample; handy for checking gain and pan exactly.
    pub fn dc(name: &str, len: usize, sample_rate: u32, root_key: u8, value: i16) -> Self {
        Self {
            name: name.to_string(),
            frames: vec![value; len],
            loop_start: 0,
            loop_end: len as u32,
            sample_rate,
            root_key,
            pitch_correction: 0,
            sample_type: 1,
        }
    }

    pub fn with_loop(mut self, start: u32, end: u32) -> Self {
        self.loop_start = start;
        self.loop_end = end;
        self
    }
}

/// A preset or instrument zone.
#[derive(Debug, Clone, Default)]
pub struct ZoneSpec {
    pub key_range: Option<(u8, u8)>,
    pub vel_range: Option<(u8, u8)>,
    pub generators: Vec<(GeneratorType, i16)>,
    pub modulators: Vec<Modulator>,
    /// Instrument index (preset zone) or sample index (instrument zone).
    /// `None` writes a global zone.
    pub link: Option<u16>,
}

impl ZoneSpec {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn linked(index: u16) -> Self {
        Self {
            link: Some(index),
            ..Self::default()
        }
    }

    pub fn keys(mut self, lo: u8, hi: u8) -> Self {
        self.key_range = Some((lo, hi));
        self
    }

    pub fn velocities(mut self, lo: u8, hi: u8) -> Self {
        self.vel_range = Some((lo, hi));
        self
    }

    pub fn gen(mut self, generator: GeneratorType, value: i16) -> Self {
        self.generators.push((generator, value));
        self
    }

    pub fn modulator(mut self, m: Modulator) -> Self {
        self.modulators.push(m);
        self
    }
}

#[derive(Debug, Clone)]
struct PresetSpec {
    name: String,
    bank: u16,
    program: u16,
    zones: Vec<ZoneSpec>,
}

/// Assembles an SF2 byte image.
#[derive(Debug, Clone, Default)]
pub struct Sf2Builder {
    name: String,
    samples: Vec<SampleSpec>,
    instruments: Vec<(String, Vec<ZoneSpec>)>,
    presets: Vec<PresetSpec>,
    preset_bag_overrides: Vec<(usize, u16)>,
    omit_chunk: Option<[u8; 4]>,
    default_modulators: Option<Vec<Modulator>>,
}

impl Sf2Builder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Returns the sample index.
    pub fn sample(&mut self, sample: SampleSpec) -> u16 {
        self.samples.push(sample);
        (self.samples.len() - 1) as u16
    }

    /// Returns the instrument index.
    pub fn instrument(&mut self, name: &str, zones: Vec<ZoneSpec>) -> u16 {
        self.instruments.push((name.to_string(), zones));
        (self.instruments.len() - 1) as u16
    }

    pub fn preset(&mut self, name: &str, bank: u16, program: u16, zones: Vec<ZoneSpec>) -> &mut Self {
        self.presets.push(PresetSpec {
            name: name.to_string(),
            bank,
            program,
            zones,
        });
        self
    }

    /// Force the bag index written for `preset`, to produce malformed ranges.
    pub fn corrupt_preset_bag(&mut self, preset: usize, bag: u16) -> &mut Self {
        self.preset_bag_overrides.push((preset, bag));
        self
    }

    /// Leave out one pdta/sdta sub-chunk.
    pub fn omit_chunk(&mut self, id: &[u8; 4]) -> &mut Self {
        self.omit_chunk = Some(*id);
        self
    }

    /// Write a `DMOD` chunk replacing the default modulators.
    pub fn default_modulators(&mut self, mods: Vec<Modulator>) -> &mut Self {
        self.default_modulators = Some(mods);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut info = Vec::new();
        info.extend(chunk(b"ifil", &[2, 0, 4, 0]));
        info.extend(chunk(b"isng", b"EMU8000\0"));
        info.extend(chunk(b"INAM", &nul_terminated(&self.name)));
        if let Some(mods) = &self.default_modulators {
            info.extend(chunk(b"DMOD", &modulator_records(mods)));
        }

        let mut smpl = Vec::new();
        let mut shdr = Vec::new();
        let mut offset = 0u32;
        for s in &self.samples {
            for f in &s.frames {
                smpl.extend_from_slice(&f.to_le_bytes());
            }
            // 46 zero frames of guard after each sample
            smpl.extend(std::iter::repeat(0u8).take(46 * 2));
            let len = s.frames.len() as u32;
            shdr.extend(fixed_name(&s.name));
            for v in [
                offset,
                offset + len,
                offset + s.loop_start,
                offset + s.loop_end,
                s.sample_rate,
            ] {
                shdr.extend_from_slice(&v.to_le_bytes());
            }
            shdr.push(s.root_key);
            shdr.push(s.pitch_correction as u8);
            shdr.extend_from_slice(&0u16.to_le_bytes());
            shdr.extend_from_slice(&s.sample_type.to_le_bytes());
            offset += len + 46;
        }
        shdr.extend(fixed_name("EOS"));
        shdr.extend(std::iter::repeat(0u8).take(26));

        let instrument_zones: Vec<_> = self.instruments.iter().map(|(_, z)| z.as_slice()).collect();
        let (ibag, imod, igen, inst_bags) = zone_tables(&instrument_zones, GeneratorType::SampleId);
        let mut inst = Vec::new();
        for ((name, _), bag) in self.instruments.iter().zip(&inst_bags) {
            inst.extend(fixed_name(name));
            inst.extend_from_slice(&bag.to_le_bytes());
        }
        inst.extend(fixed_name("EOI"));
        inst.extend_from_slice(&inst_bags.last().copied().unwrap_or(0).to_le_bytes());

        let preset_zones: Vec<_> = self.presets.iter().map(|p| p.zones.as_slice()).collect();
        let (pbag, pmod, pgen, preset_bags) = zone_tables(&preset_zones, GeneratorType::Instrument);
        let mut phdr = Vec::new();
        for (i, (p, bag)) in self.presets.iter().zip(&preset_bags).enumerate() {
            let bag = self
                .preset_bag_overrides
                .iter()
                .find(|(idx, _)| *idx == i)
                .map(|(_, b)| *b)
                .unwrap_or(*bag);
            phdr.extend(fixed_name(&p.name));
            phdr.extend_from_slice(&p.program.to_le_bytes());
            phdr.extend_from_slice(&p.bank.to_le_bytes());
            phdr.extend_from_slice(&bag.to_le_bytes());
            phdr.extend_from_slice(&[0; 12]);
        }
        phdr.extend(fixed_name("EOP"));
        phdr.extend_from_slice(&[0; 4]);
        phdr.extend_from_slice(&preset_bags.last().copied().unwrap_or(0).to_le_bytes());
        phdr.extend_from_slice(&[0; 12]);

        let mut pdta = Vec::new();
        for (id, data) in [
            (b"phdr", &phdr),
            (b"pbag", &pbag),
            (b"pmod", &pmod),
            (b"pgen", &pgen),
            (b"inst", &inst),
            (b"ibag", &ibag),
            (b"imod", &imod),
            (b"igen", &igen),
            (b"shdr", &shdr),
        ] {
            if self.omit_chunk.as_ref() != Some(id) {
                pdta.extend(chunk(id, data));
            }
        }

        let mut sdta = Vec::new();
        if self.omit_chunk.as_ref() != Some(b"smpl") {
            sdta.extend(chunk(b"smpl", &smpl));
        }

        let mut body = b"sfbk".to_vec();
        body.extend(list(b"INFO", &info));
        body.extend(list(b"sdta", &sdta));
        body.extend(list(b"pdta", &pdta));
        chunk(b"RIFF", &body)
    }
}

/// Bag, modulator and generator tables for one level, plus the first bag
/// index of each header followed by the terminal bag index.
fn zone_tables(headers: &[&[ZoneSpec]], link: GeneratorType) -> (Vec<u8>, Vec<u8>, Vec<u8>, Vec<u16>) {
    let (mut bag, mut mods, mut gens) = (Vec::new(), Vec::new(), Vec::new());
    let (mut gen_count, mut mod_count, mut bag_count) = (0u16, 0u16, 0u16);
    let mut header_bags = Vec::new();
    for zones in headers {
        header_bags.push(bag_count);
        for z in zones.iter() {
            bag.extend_from_slice(&gen_count.to_le_bytes());
            bag.extend_from_slice(&mod_count.to_le_bytes());
            bag_count += 1;

            let mut records: Vec<(u16, u16)> = Vec::new();
            if let Some((lo, hi)) = z.key_range {
                records.push((GeneratorType::KeyRange.id(), u16::from_le_bytes([lo, hi])));
            }
            if let Some((lo, hi)) = z.vel_range {
                records.push((GeneratorType::VelRange.id(), u16::from_le_bytes([lo, hi])));
            }
            records.extend(z.generators.iter().map(|(g, v)| (g.id(), *v as u16)));
            if let Some(target) = z.link {
                records.push((link.id(), target));
            }
            for (oper, amount) in records {
                gens.extend_from_slice(&oper.to_le_bytes());
                gens.extend_from_slice(&amount.to_le_bytes());
                gen_count += 1;
            }
            mods.extend(modulator_records(&z.modulators));
            mod_count += z.modulators.len() as u16;
        }
    }
    header_bags.push(bag_count);
    bag.extend_from_slice(&gen_count.to_le_bytes());
    bag.extend_from_slice(&mod_count.to_le_bytes());
    mods.extend_from_slice(&[0; 10]);
    gens.extend_from_slice(&[0; 4]);
    (bag, mods, gens, header_bags)
}

fn modulator_records(mods: &[Modulator]) -> Vec<u8> {
    let mut out = Vec::new();
    for m in mods {
        out.extend_from_slice(&m.source.0.to_le_bytes());
        out.extend_from_slice(&m.destination.to_le_bytes());
        out.extend_from_slice(&m.amount.to_le_bytes());
        out.extend_from_slice(&m.amount_source.0.to_le_bytes());
        let transform: u16 = match m.transform {
            crate::modulator::Transform::Linear => 0,
            crate::modulator::Transform::Absolute => 2,
        };
        out.extend_from_slice(&transform.to_le_bytes());
    }
    out
}

fn fixed_name(name: &str) -> [u8; 20] {
    let mut out = [0u8; 20];
    for (dst, src) in out.iter_mut().zip(name.bytes().take(19)) {
        *dst = src;
    }
    out
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    if v.len() % 2 == 1 {
        v.push(0);
    }
    v
}

fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 9);
    out.extend_from_slice(id);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn list(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = kind.to_vec();
    data.extend_from_slice(body);
    chunk(b"LIST", &data)
}

/// One preset (bank 0, program 0) covering `keys` with a single instrument
/// zone over `sample`. `instrument_generators` go on that zone.
pub fn single_zone_bank(
    sample: SampleSpec,
    keys: (u8, u8),
    instrument_generators: &[(GeneratorType, i16)],
) -> Vec<u8> {
    let mut b = Sf2Builder::new("Test Bank");
    let s = b.sample(sample);
    let mut zone = ZoneSpec::linked(s).keys(keys.0, keys.1);
    for (g, v) in instrument_generators {
        zone = zone.gen(*g, *v);
    }
    let inst = b.instrument("Test Instrument", vec![zone]);
    b.preset("Test Preset", 0, 0, vec![ZoneSpec::linked(inst).keys(keys.0, keys.1)]);
    b.build()
}
