//! Sound-bank parsing: RIFF `sfbk` container into presets, instruments and samples.

use crate::chunk::{tag_name, Chunk, Chunks, LIST, RIFF};
use crate::error::{FormatError, Result};
use crate::generator::GeneratorType;
use crate::modulator::{Modulator, DEFAULT_MODULATORS};
use crate::sample::{SampleHeader, SampleType};
use crate::zone::{Instrument, Preset, Zone, ZoneModulators};
use gending_core::BinaryReader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Contents of the optional `INFO` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundBankInfo {
    pub version: Option<(u16, u16)>,
    pub name: Option<String>,
    pub sound_engine: Option<String>,
    pub creation_date: Option<String>,
    pub engineers: Option<String>,
    pub product: Option<String>,
    pub copyright: Option<String>,
    pub comment: Option<String>,
    pub software: Option<String>,
}

/// Immutable, parsed SoundFont bank.
#[derive(Debug, Clone)]
pub struct SoundBank {
    pub info: SoundBankInfo,
    pub presets: Vec<Preset>,
    pub instruments: Vec<Instrument>,
    pub samples: Vec<SampleHeader>,
    /// 16-bit mono sample frames shared by every sample header.
    pub sample_data: Arc<[i16]>,
    /// `DMOD` chunk contents when present, otherwise the standard defaults.
    pub default_modulators: Vec<Modulator>,
    preset_index: HashMap<(u16, u16), usize>,
}

/// Raw `?bag` record: first generator and modulator index of a zone.
#[derive(Debug, Clone, Copy)]
struct Bag {
    generator: usize,
    modulator: usize,
}

/// Raw generator record.
#[derive(Debug, Clone, Copy)]
struct GenRecord {
    oper: u16,
    amount: u16,
}

/// The record tables of one hierarchy level (preset or instrument).
struct Level {
    bags: Vec<Bag>,
    mods: Vec<Modulator>,
    gens: Vec<GenRecord>,
    /// Links generator: `Instrument` for presets, `SampleId` for instruments.
    link: GeneratorType,
}

#[derive(Default)]
struct PdtaChunks<'a> {
    phdr: Option<Chunk<'a>>,
    pbag: Option<Chunk<'a>>,
    pmod: Option<Chunk<'a>>,
    pgen: Option<Chunk<'a>>,
    inst: Option<Chunk<'a>>,
    ibag: Option<Chunk<'a>>,
    imod: Option<Chunk<'a>>,
    igen: Option<Chunk<'a>>,
    shdr: Option<Chunk<'a>>,
}

fn require<'a>(chunk: Option<Chunk<'a>>, name: &'static str) -> Result<Chunk<'a>> {
    chunk.ok_or(FormatError::MissingChunk(name))
}

impl SoundBank {
    /// Parse a complete `.sf2` file held in memory.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let top = crate::chunk::read_chunk(&mut reader).map_err(|e| match e {
            FormatError::Truncated(_) => FormatError::UnknownContainer(
                String::from_utf8_lossy(&data[..data.len().min(4)]).into_owned(),
            ),
            other => other,
        })?;
        if top.id != RIFF {
            return Err(FormatError::UnknownContainer(top.tag()));
        }
        let (form, body) = top.form()?;
        if &form != b"sfbk" {
            return Err(FormatError::UnknownContainer(format!("RIFF/{}", tag_name(&form))));
        }

        let mut info = SoundBankInfo::default();
        let mut default_modulators = None;
        let mut smpl = None;
        let mut pdta = PdtaChunks::default();

        for chunk in Chunks::new(body) {
            let chunk = chunk?;
            if chunk.id != LIST {
                debug!(tag = %chunk.tag(), "skipping top-level chunk");
                continue;
            }
            let (list_type, list_body) = chunk.form()?;
            match &list_type {
                b"INFO" => {
                    for sub in Chunks::new(list_body) {
                        let sub = sub?;
                        if &sub.id == b"DMOD" {
                            default_modulators = Some(parse_modulators(&sub)?);
                        } else {
                            read_info_field(&mut info, &sub);
                        }
                    }
                }
                b"sdta" => {
                    for sub in Chunks::new(list_body) {
                        let sub = sub?;
                        match &sub.id {
                            b"smpl" => smpl = Some(sub),
                            other => debug!(tag = %tag_name(other), "ignoring sample-data chunk"),
                        }
                    }
                }
                b"pdta" => {
                    for sub in Chunks::new(list_body) {
                        let sub = sub?;
                        let slot = match &sub.id {
                            b"phdr" => &mut pdta.phdr,
                            b"pbag" => &mut pdta.pbag,
                            b"pmod" => &mut pdta.pmod,
                            b"pgen" => &mut pdta.pgen,
                            b"inst" => &mut pdta.inst,
                            b"ibag" => &mut pdta.ibag,
                            b"imod" => &mut pdta.imod,
                            b"igen" => &mut pdta.igen,
                            b"shdr" => &mut pdta.shdr,
                            other => {
                                debug!(tag = %tag_name(other), "ignoring pdta chunk");
                                continue;
                            }
                        };
                        *slot = Some(sub);
                    }
                }
                other => debug!(list = %tag_name(other), "skipping LIST"),
            }
        }

        let smpl = require(smpl, "smpl")?;
        let phdr = require(pdta.phdr, "phdr")?;
        let pbag = require(pdta.pbag, "pbag")?;
        let pmod = require(pdta.pmod, "pmod")?;
        let pgen = require(pdta.pgen, "pgen")?;
        let inst = require(pdta.inst, "inst")?;
        let ibag = require(pdta.ibag, "ibag")?;
        let imod = require(pdta.imod, "imod")?;
        let igen = require(pdta.igen, "igen")?;
        let shdr = require(pdta.shdr, "shdr")?;

        let sample_data = parse_sample_data(&smpl)?;
        let samples = parse_sample_headers(&shdr)?;
        for (i, s) in samples.iter().enumerate() {
            if s.end as usize > sample_data.len() || s.start > s.end {
                warn!(sample = i, name = %s.name, "sample region outside sample data");
            }
        }

        let instrument_level = Level {
            bags: parse_bags(&ibag)?,
            mods: parse_modulators(&imod)?,
            gens: parse_generators(&igen)?,
            link: GeneratorType::SampleId,
        };
        let instrument_headers = parse_headers(&inst, 22)?;
        let mut instruments = Vec::with_capacity(instrument_headers.len());
        for (i, (name, bag_range)) in instrument_headers.iter().enumerate() {
            let (global, zones) = instrument_level
                .zones(bag_range.clone())
                .ok_or(FormatError::InvalidInstrumentZones { instrument: i })?;
            for zone in zones.iter() {
                if let Some(sample) = zone.link.filter(|s| *s >= samples.len()) {
                    return Err(FormatError::InvalidSampleReference {
                        instrument: i,
                        sample,
                    });
                }
            }
            instruments.push(Instrument {
                name: name.clone(),
                global,
                zones,
            });
        }

        let preset_level = Level {
            bags: parse_bags(&pbag)?,
            mods: parse_modulators(&pmod)?,
            gens: parse_generators(&pgen)?,
            link: GeneratorType::Instrument,
        };
        let preset_headers = parse_preset_headers(&phdr)?;
        let mut presets = Vec::with_capacity(preset_headers.len());
        for (i, header) in preset_headers.into_iter().enumerate() {
            let (global, zones) = preset_level
                .zones(header.bags.clone())
                .ok_or(FormatError::InvalidPresetZones { preset: i })?;
            for zone in zones.iter() {
                if let Some(instrument) = zone.link.filter(|n| *n >= instruments.len()) {
                    return Err(FormatError::InvalidInstrumentReference {
                        preset: i,
                        instrument,
                    });
                }
            }
            presets.push(Preset {
                name: header.name,
                program: header.program,
                bank: header.bank,
                global,
                zones,
            });
        }

        let mut preset_index = HashMap::with_capacity(presets.len());
        for (i, p) in presets.iter().enumerate() {
            // first definition wins on duplicates
            preset_index.entry((p.bank, p.program)).or_insert(i);
        }

        debug!(
            presets = presets.len(),
            instruments = instruments.len(),
            samples = samples.len(),
            frames = sample_data.len(),
            "parsed sound bank"
        );

        Ok(Self {
            info,
            presets,
            instruments,
            samples,
            sample_data,
            default_modulators: default_modulators
                .unwrap_or_else(|| DEFAULT_MODULATORS.to_vec()),
            preset_index,
        })
    }

    /// Exact (bank, program) lookup.
    pub fn preset(&self, bank: u16, program: u16) -> Option<&Preset> {
        self.preset_index
            .get(&(bank, program))
            .map(|&i| &self.presets[i])
    }

    pub fn preset_index_of(&self, bank: u16, program: u16) -> Option<usize> {
        self.preset_index.get(&(bank, program)).copied()
    }

    /// Lookup with fallbacks: same program in bank 0 (or the first
    /// percussion preset for bank 128), then the first preset of the
    /// requested bank.
    pub fn resolve_preset(&self, bank: u16, program: u16) -> Option<usize> {
        if let Some(i) = self.preset_index_of(bank, program) {
            return Some(i);
        }
        if bank == 128 {
            if let Some(i) = self.preset_index_of(128, 0) {
                return Some(i);
            }
        } else if let Some(i) = self.preset_index_of(0, program) {
            return Some(i);
        }
        self.presets
            .iter()
            .enumerate()
            .filter(|(_, p)| p.bank == bank)
            .min_by_key(|(_, p)| p.program)
            .map(|(i, _)| i)
    }

    pub fn name(&self) -> &str {
        self.info.name.as_deref().unwrap_or("")
    }
}

impl Level {
    /// Build zones for the bag range `[start, end)`. `None` when any index
    /// range is malformed. A leading zone without a link generator is global;
    /// later link-less zones are dropped.
    fn zones(&self, bags: std::ops::Range<usize>) -> Option<(Option<Zone>, Vec<Zone>)> {
        // the terminal bag only marks where the previous zone ends
        if bags.start > bags.end || bags.end + 1 > self.bags.len() {
            return None;
        }
        let mut global = None;
        let mut zones = Vec::with_capacity(bags.len());
        for b in bags.clone() {
            let (this, next) = (self.bags[b], self.bags[b + 1]);
            if this.generator > next.generator
                || next.generator > self.gens.len()
                || this.modulator > next.modulator
                || next.modulator > self.mods.len()
            {
                return None;
            }

            let mut zone = Zone::default();
            for record in &self.gens[this.generator..next.generator] {
                let Some(g) = GeneratorType::from_id(record.oper) else {
                    debug!(oper = record.oper, "ignoring unknown generator");
                    continue;
                };
                zone.generators.set(g, record.amount as i16);
                // the link generator terminates a zone
                if g == self.link {
                    break;
                }
            }
            zone.key_range = zone.generators.key_range();
            zone.vel_range = zone.generators.vel_range();
            zone.link = zone.generators.get_raw(self.link).map(usize::from);
            zone.modulators = self.mods[this.modulator..next.modulator]
                .iter()
                .copied()
                .collect::<ZoneModulators>();

            if zone.is_global() {
                if b == bags.start {
                    global = Some(zone);
                } else {
                    debug!(bag = b, "dropping non-leading zone without link");
                }
            } else {
                zones.push(zone);
            }
        }
        Some((global, zones))
    }
}

struct PresetHeader {
    name: String,
    program: u16,
    bank: u16,
    bags: std::ops::Range<usize>,
}

fn parse_preset_headers(chunk: &Chunk<'_>) -> Result<Vec<PresetHeader>> {
    let mut raw = Vec::new();
    for record in chunk.records(38)? {
        let mut r = BinaryReader::new(record);
        let name = r.read_fixed_string(20)?;
        let program = r.read_u16_le()?;
        let bank = r.read_u16_le()?;
        let bag = r.read_u16_le()? as usize;
        raw.push((name, program, bank, bag));
    }
    if raw.is_empty() {
        return Err(FormatError::InvalidChunkSize {
            tag: "phdr".into(),
            size: 0,
        });
    }
    // last record is the EOP terminal
    Ok(raw
        .windows(2)
        .map(|w| PresetHeader {
            name: w[0].0.clone(),
            program: w[0].1,
            bank: w[0].2,
            bags: w[0].3..w[1].3,
        })
        .collect())
}

fn parse_headers(chunk: &Chunk<'_>, size: usize) -> Result<Vec<(String, std::ops::Range<usize>)>> {
    let mut raw = Vec::new();
    for record in chunk.records(size)? {
        let mut r = BinaryReader::new(record);
        let name = r.read_fixed_string(20)?;
        let bag = r.read_u16_le()? as usize;
        raw.push((name, bag));
    }
    if raw.is_empty() {
        return Err(FormatError::InvalidChunkSize {
            tag: chunk.tag(),
            size: 0,
        });
    }
    Ok(raw
        .windows(2)
        .map(|w| (w[0].0.clone(), w[0].1..w[1].1))
        .collect())
}

fn parse_bags(chunk: &Chunk<'_>) -> Result<Vec<Bag>> {
    chunk
        .records(4)?
        .map(|record| {
            let mut r = BinaryReader::new(record);
            Ok(Bag {
                generator: r.read_u16_le()? as usize,
                modulator: r.read_u16_le()? as usize,
            })
        })
        .collect()
}

fn parse_generators(chunk: &Chunk<'_>) -> Result<Vec<GenRecord>> {
    chunk
        .records(4)?
        .map(|record| {
            let mut r = BinaryReader::new(record);
            Ok(GenRecord {
                oper: r.read_u16_le()?,
                amount: r.read_u16_le()?,
            })
        })
        .collect()
}

fn parse_modulators(chunk: &Chunk<'_>) -> Result<Vec<Modulator>> {
    chunk
        .records(10)?
        .map(|record| {
            let mut r = BinaryReader::new(record);
            Ok(Modulator::from_record(
                r.read_u16_le()?,
                r.read_u16_le()?,
                r.read_i16_le()?,
                r.read_u16_le()?,
                r.read_u16_le()?,
            ))
        })
        .collect()
}

fn parse_sample_headers(chunk: &Chunk<'_>) -> Result<Vec<SampleHeader>> {
    let mut headers = Vec::new();
    for record in chunk.records(SampleHeader::RECORD_SIZE)? {
        let mut r = BinaryReader::new(record);
        headers.push(SampleHeader {
            name: r.read_fixed_string(20)?,
            start: r.read_u32_le()?,
            end: r.read_u32_le()?,
            loop_start: r.read_u32_le()?,
            loop_end: r.read_u32_le()?,
            sample_rate: r.read_u32_le()?,
            original_pitch: r.read_u8()?,
            pitch_correction: r.read_i8()?,
            link: r.read_u16_le()?,
            sample_type: SampleType::from_raw(r.read_u16_le()?),
        });
    }
    // drop the EOS terminal
    headers.pop();
    Ok(headers)
}

fn parse_sample_data(chunk: &Chunk<'_>) -> Result<Arc<[i16]>> {
    Ok(chunk
        .records(2)?
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

fn read_info_field(info: &mut SoundBankInfo, chunk: &Chunk<'_>) {
    let text = || {
        let end = chunk.data.iter().position(|&b| b == 0).unwrap_or(chunk.data.len());
        Some(String::from_utf8_lossy(&chunk.data[..end]).into_owned())
    };
    match &chunk.id {
        b"ifil" => {
            let mut r = BinaryReader::new(chunk.data);
            if let (Ok(major), Ok(minor)) = (r.read_u16_le(), r.read_u16_le()) {
                info.version = Some((major, minor));
            }
        }
        b"INAM" => info.name = text(),
        b"isng" => info.sound_engine = text(),
        b"ICRD" => info.creation_date = text(),
        b"IENG" => info.engineers = text(),
        b"IPRD" => info.product = text(),
        b"ICOP" => info.copyright = text(),
        b"ICMT" => info.comment = text(),
        b"ISFT" => info.software = text(),
        other => debug!(tag = %tag_name(other), "ignoring INFO field"),
    }
}
