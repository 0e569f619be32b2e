/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
/*! Tape container analysis.

Walks the block structure of a **TZX** or **TAP** container held by a
[TapeStorage] backend and produces a [TapeInfo]: the list of [Block]s found
and the [Section]s they group into. A section is a contiguous run of blocks
treated as one logical program for metadata and UI purposes; a new section
opens at every group start or text description block and after any section
that recorded a stop-the-tape signal.

Analysis is independent of playback: it reads the same storage backend the
block decoder reads, and its result fully replaces any previous one.

```no_run
use zxtape_deck::storage::{TapeStorage, FileStorage};
use zxtape_deck::info::analyze;

let mut storage = FileStorage::new("some.tzx");
let info = analyze(&mut storage, "some.tzx")?;
for section in &info.sections {
    println!("{:2}: {} ({} blocks)", section.index, section.name, section.block_count);
}
# Ok::<(), std::io::Error>(())
```

Truncated containers are never an error: a read that comes up short aborts
the analysis and yields an empty [TapeInfo] with [TapeKind::Unknown], the
partial section list is discarded. Only genuine storage failures surface as
[io::Error].
*/
use core::convert::TryFrom;
use core::fmt;
use std::io;

use arrayvec::ArrayString;
use bitflags::bitflags;
use log::{debug, warn};

use crate::storage::TapeStorage;
use crate::tzx::{TzxId, TAP_EXTENSION, TZX_HEADER_SIZE, TZX_SIGNATURE};

/// Section names longer than this are truncated.
pub const SECTION_NAME_MAX: usize = 64;
/// The fixed width of the name field in a standard ROM program header.
const PROGRAM_NAME_LEN: usize = 10;
/// Declared length of a standard ROM header block (flag + 17 bytes + checksum).
const PROGRAM_HEADER_LEN: u16 = 19;

/// A bounded, printable-ASCII section name.
pub type SectionName = ArrayString<SECTION_NAME_MAX>;

/// The container variant a tape file was recognized as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TapeKind {
    Unknown,
    /// FormatA: the block-structured container with a 10-byte header.
    Tzx,
    /// FormatB: a headerless sequence of standard-speed blocks.
    Tap,
}

impl Default for TapeKind {
    fn default() -> Self {
        TapeKind::Unknown
    }
}

impl fmt::Display for TapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TapeKind::Unknown => "unknown",
            TapeKind::Tzx => "TZX",
            TapeKind::Tap => "TAP",
        })
    }
}

bitflags! {
    /// Per-section accumulated properties, OR-ed in as blocks are processed.
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct SectionFlags: u8 {
        /// The section contains a standard ROM program header.
        const PROGRAM_HEADER = 0b0000_0001;
        /// The section was opened by a group start block.
        const GROUP          = 0b0000_0010;
        /// The section was opened by a text description block.
        const DESCRIPTION    = 0b0000_0100;
        /// The section ends in an in-band stop-the-tape signal.
        const STOP_TAPE      = 0b0000_1000;
        /// The section ends in a stop-if-48k signal.
        const STOP_TAPE_48K  = 0b0001_0000;
    }
}

impl Default for SectionFlags {
    fn default() -> Self {
        SectionFlags::empty()
    }
}

/// One unit of the container format.
///
/// `length` counts every byte the block occupies in the stream, the id byte
/// included for TZX blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    pub id: u8,
    pub offset: u64,
    pub length: u32,
}

/// A contiguous run of blocks forming one logical program or load.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Section {
    /// The id of the block that opened this section.
    pub id: u8,
    /// Dense index after pruning, `0..n`.
    pub index: u32,
    /// Index of the first block of this section in [TapeInfo::blocks].
    pub start_block: u32,
    pub block_count: u32,
    /// Blocks that carry an audible pulse train.
    pub playable_block_count: u32,
    pub name: SectionName,
    pub flags: SectionFlags,
    /// Byte offset of the section start in the container.
    pub offset: u64,
    /// Sum of the lengths of all blocks belonging to the section.
    pub length: u32,
}

impl Section {
    fn open(id: u8, index: u32, start_block: u32, offset: u64) -> Self {
        Section {
            id,
            index,
            start_block,
            block_count: 0,
            playable_block_count: 0,
            name: SectionName::new(),
            flags: SectionFlags::empty(),
            offset,
            length: 0,
        }
    }
}

/// The result of a container analysis.
///
/// Invariant: sections are contiguous and cover the block stream without
/// gaps or overlap; after pruning every section has
/// `playable_block_count > 0` and indices run densely from 0.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TapeInfo {
    pub kind: TapeKind,
    /// Total container size in bytes.
    pub size: u64,
    pub blocks: Vec<Block>,
    pub sections: Vec<Section>,
}

impl TapeInfo {
    /// The empty result of an aborted analysis.
    fn unknown() -> Self {
        TapeInfo::default()
    }

    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn section_count(&self) -> u32 {
        self.sections.len() as u32
    }
}

/// Analyzes the tape container held by `storage`.
///
/// The backend is re-opened from the start. `filename` is consulted only
/// when the TZX signature is absent, to recognize headerless TAP files by
/// their extension (case-insensitively).
pub fn analyze(storage: &mut dyn TapeStorage, filename: &str) -> io::Result<TapeInfo> {
    storage.close();
    let size = storage.open()?;
    let mut analyzer = Analyzer {
        storage,
        size,
        pos: 0,
        blocks: Vec::new(),
        sections: Vec::new(),
    };
    match analyzer.run(filename) {
        Ok(TapeKind::Unknown) => Ok(TapeInfo::unknown()),
        Ok(kind) => {
            analyzer.prune_sections();
            Ok(TapeInfo {
                kind,
                size,
                blocks: analyzer.blocks,
                sections: analyzer.sections,
            })
        }
        Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            warn!("truncated tape container, discarding analysis: {}", e);
            Ok(TapeInfo::unknown())
        }
        Err(e) => Err(e),
    }
}

/// Per-block scratch collected by the id handlers and folded into the
/// current section afterwards.
#[derive(Default)]
struct BlockScratch {
    flags: SectionFlags,
    name: Option<SectionName>,
}

struct Analyzer<'a> {
    storage: &'a mut dyn TapeStorage,
    size: u64,
    pos: u64,
    blocks: Vec<Block>,
    sections: Vec<Section>,
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "truncated tape block")
}

fn block_name(id: u8) -> &'static str {
    TzxId::try_from(id).map(TzxId::name).unwrap_or("Unsupported")
}

impl<'a> Analyzer<'a> {
    fn run(&mut self, filename: &str) -> io::Result<TapeKind> {
        let kind = self.read_header(filename)?;
        match kind {
            TapeKind::Tzx => self.process_tzx()?,
            TapeKind::Tap => self.process_tap()?,
            TapeKind::Unknown => {}
        }
        Ok(kind)
    }

    /// Reads the first [TZX_HEADER_SIZE] bytes and decides the container
    /// variant. The cursor ends up past the header for TZX and at offset 0
    /// for TAP.
    fn read_header(&mut self, filename: &str) -> io::Result<TapeKind> {
        let mut header = [0u8; TZX_HEADER_SIZE];
        let mut read = 0;
        if self.size > 0 {
            self.storage.seek_set(0)?;
            read = self.storage.read(&mut header)?;
        }
        if read >= TZX_SIGNATURE.len() && header[..TZX_SIGNATURE.len()] == TZX_SIGNATURE[..] {
            self.pos = read as u64;
            return Ok(TapeKind::Tzx);
        }
        if filename.to_ascii_lowercase().ends_with(TAP_EXTENSION) {
            self.pos = 0;
            return Ok(TapeKind::Tap);
        }
        Ok(TapeKind::Unknown)
    }

    fn process_tzx(&mut self) -> io::Result<()> {
        let mut block_index = 0;
        while self.pos < self.size {
            let start = self.pos;
            let id = self.read_u8()?;
            let mut scratch = BlockScratch::default();
            match TzxId::try_from(id) {
                Ok(TzxId::StandardSpeed) => self.standard_speed_block(true, &mut scratch)?,
                Ok(TzxId::TurboSpeed) => self.turbo_speed_block()?,
                Ok(TzxId::PureTone) => {
                    let _pulse_len = self.read_u16()?;
                    let _pulse_count = self.read_u16()?;
                }
                Ok(TzxId::SeqOfPulses) => {
                    let count = self.read_u8()?;
                    self.skip(u64::from(count) * 2);
                }
                Ok(TzxId::PureData) => self.pure_data_block()?,
                Ok(TzxId::DirectRec) => self.direct_recording_block()?,
                Ok(TzxId::Generalized) => {
                    let length = self.read_u32()?;
                    self.skip_read(u64::from(length))?;
                }
                Ok(TzxId::Pause) => {
                    // a zero duration is the in-band "stop the tape" signal
                    let pause_ms = self.read_u16()?;
                    if pause_ms == 0 {
                        scratch.flags |= SectionFlags::STOP_TAPE;
                    }
                }
                Ok(TzxId::GroupStart) => {
                    let length = self.read_u8()?;
                    let name = self.read_string(length as usize)?;
                    debug!("group name: {}", name);
                    scratch.flags |= SectionFlags::GROUP;
                    scratch.name = Some(name);
                }
                Ok(TzxId::GroupEnd) | Ok(TzxId::LoopEnd) => {}
                Ok(TzxId::LoopStart) => {
                    let _repetitions = self.read_u16()?;
                }
                Ok(TzxId::StopIn48k) => {
                    let _length = self.read_u32()?;
                    scratch.flags |= SectionFlags::STOP_TAPE_48K;
                }
                Ok(TzxId::SetLevel) => {
                    let _length = self.read_u32()?;
                    let _level = self.read_u8()?;
                }
                Ok(TzxId::Text) => {
                    let length = self.read_u8()?;
                    let name = self.read_string(length as usize)?;
                    debug!("description: {}", name);
                    scratch.flags |= SectionFlags::DESCRIPTION;
                    scratch.name = Some(name);
                }
                Ok(TzxId::Message) => {
                    let _display_secs = self.read_u8()?;
                    let length = self.read_u8()?;
                    let message = self.read_string(length as usize)?;
                    debug!("message: {}", message);
                }
                Ok(TzxId::Archive) => {
                    let length = self.read_u16()?;
                    self.skip_read(u64::from(length))?;
                }
                Ok(TzxId::Hardware) => {
                    let entries = self.read_u8()?;
                    self.skip(u64::from(entries) * 3);
                }
                Ok(TzxId::Custom) => {
                    // 10-byte identification string, then a length-prefixed body
                    self.skip(10);
                    let length = self.read_u32()?;
                    self.skip_read(u64::from(length))?;
                }
                Ok(TzxId::KansasCity) => {}
                Ok(TzxId::Glue) => self.skip(9),
                // CSW recordings, jumps, call sequences, returns and block
                // selects are deliberately unsupported: only the id byte is
                // consumed. Any payload that follows will be picked up as
                // the next block id, which is the source format's contract
                // for these ids, not something to correct here.
                Ok(TzxId::CswRecording) | Ok(TzxId::Jump) | Ok(TzxId::CallSeq)
                | Ok(TzxId::Return) | Ok(TzxId::Select) | Err(_) => {
                    warn!("unsupported tape block 0x{:02x} at offset {}", id, start);
                }
            }
            let length = (self.pos - start) as u32;
            debug!("{:03} [0x{:02x}]: {} [{},{}]", block_index, id, block_name(id), start, length);
            self.push_block(block_index, id, start, length, scratch);
            block_index += 1;
        }
        Ok(())
    }

    /// A TAP container is a flat sequence of standard-speed blocks with no
    /// id byte and no pause field.
    fn process_tap(&mut self) -> io::Result<()> {
        let mut block_index = 0;
        while self.pos < self.size {
            let start = self.pos;
            let mut scratch = BlockScratch::default();
            self.standard_speed_block(false, &mut scratch)?;
            let length = (self.pos - start) as u32;
            debug!("{:03} [0x10]: {} [{},{}]",
                   block_index, TzxId::StandardSpeed.name(), start, length);
            self.push_block(block_index, TzxId::StandardSpeed.into(), start, length, scratch);
            block_index += 1;
        }
        Ok(())
    }

    fn standard_speed_block(&mut self, is_tzx: bool, scratch: &mut BlockScratch) -> io::Result<()> {
        if is_tzx {
            let _pause_ms = self.read_u16()?;
        }
        let length = self.read_u16()?;
        let end = self.pos + u64::from(length);
        if length == PROGRAM_HEADER_LEN && self.read_u16()? == 0 {
            // a standard ROM program header: flag and type bytes both zero,
            // then the fixed-width program name
            let mut name = [0u8; PROGRAM_NAME_LEN];
            self.read_exact(&mut name)?;
            let name = trim_printable(&name);
            debug!("program name: {}", name);
            scratch.flags |= SectionFlags::PROGRAM_HEADER;
            scratch.name = Some(name);
        }
        // remaining payload bytes are skipped, not interpreted
        self.pos = end;
        Ok(())
    }

    fn turbo_speed_block(&mut self) -> io::Result<()> {
        let _pilot_pulse = self.read_u16()?;
        let _sync1_pulse = self.read_u16()?;
        let _sync2_pulse = self.read_u16()?;
        let _zero_pulse = self.read_u16()?;
        let _one_pulse = self.read_u16()?;
        let _pilot_tone = self.read_u16()?;
        let _used_bits = self.read_u8()?;
        let _pause_ms = self.read_u16()?;
        let length = self.read_u24()?;
        self.skip_read(u64::from(length))
    }

    fn pure_data_block(&mut self) -> io::Result<()> {
        let _zero_pulse = self.read_u16()?;
        let _one_pulse = self.read_u16()?;
        let _used_bits = self.read_u8()?;
        let _pause_ms = self.read_u16()?;
        let length = self.read_u24()?;
        self.skip_read(u64::from(length))
    }

    fn direct_recording_block(&mut self) -> io::Result<()> {
        let _tstates_per_sample = self.read_u16()?;
        let _pause_ms = self.read_u16()?;
        let _used_bits = self.read_u8()?;
        let length = self.read_u24()?;
        self.skip_read(u64::from(length))
    }

    /// Records the finished block and folds it into the section sequence.
    fn push_block(&mut self, block_index: u32, id: u8, offset: u64, length: u32,
                  scratch: BlockScratch) {
        self.blocks.push(Block { id, offset, length });
        let tzx_id = TzxId::try_from(id).ok();
        let playable = tzx_id.map_or(false, TzxId::is_playable);
        let opens_section = matches!(tzx_id, Some(TzxId::GroupStart) | Some(TzxId::Text));
        let need_new = match self.sections.last() {
            None => true,
            Some(section) => opens_section
                || section.flags.intersects(SectionFlags::STOP_TAPE | SectionFlags::STOP_TAPE_48K),
        };
        if need_new {
            let index = self.sections.len() as u32;
            self.sections.push(Section::open(id, index, block_index, offset));
        }
        if let Some(section) = self.sections.last_mut() {
            section.block_count += 1;
            section.length += length;
            if playable {
                section.playable_block_count += 1;
            }
            section.flags |= scratch.flags;
            if let Some(name) = scratch.name {
                if section.name.is_empty() {
                    section.name = name;
                }
            }
        }
    }

    /// Deletes sections without any audible block and re-indexes the
    /// survivors densely from 0. A stable filter, positions are preserved.
    fn prune_sections(&mut self) {
        self.sections.retain(|section| section.playable_block_count > 0);
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.index = index as u32;
        }
    }

    // Each primitive read seeks first, so the analyzer's cursor is the only
    // position that matters; a short read or a failing seek means the
    // container ends mid-block and aborts the analysis.

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if self.pos >= self.size {
            return Err(truncated());
        }
        self.storage.seek_set(self.pos).map_err(|_| truncated())?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.storage.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(truncated());
            }
            filled += n;
        }
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// The 3-byte little-endian length field of turbo, pure-data and
    /// direct-recording blocks.
    fn read_u24(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 3];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], 0]))
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_string(&mut self, length: usize) -> io::Result<SectionName> {
        let mut buf = vec![0u8; length];
        self.read_exact(&mut buf)?;
        Ok(trim_printable(&buf))
    }

    /// Advances the cursor without touching the bytes. Used where the
    /// reference decoder skips wholesale, so a truncated payload here does
    /// not abort (the block loop terminates at the next iteration instead).
    fn skip(&mut self, count: u64) {
        self.pos += count;
    }

    /// Advances the cursor over a payload the reference decoder reads
    /// byte-by-byte: a payload extending past the container end aborts.
    fn skip_read(&mut self, count: u64) -> io::Result<()> {
        if self.pos + count > self.size {
            return Err(truncated());
        }
        self.pos += count;
        Ok(())
    }
}

/// Trims a raw name to its printable ASCII range `[0x21, 0x7E]` at both
/// ends; interior bytes outside the printable range become `?`.
pub(crate) fn trim_printable(bytes: &[u8]) -> SectionName {
    let mut out = SectionName::new();
    let is_valid = |b: &u8| (0x21..=0x7E).contains(b);
    if let (Some(first), Some(last)) =
        (bytes.iter().position(is_valid), bytes.iter().rposition(is_valid))
    {
        for &b in &bytes[first..=last] {
            let ch = if (0x20..0x7F).contains(&b) { b as char } else { '?' };
            if out.try_push(ch).is_err() {
                break;
            }
        }
    }
    out
}
