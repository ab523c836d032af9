//! Register-log export.
//!
//! Replays a song tick by tick without rendering audio and records every
//! register write the backends make, separated by waits measured in output
//! samples. The file is a little-endian header followed by a command
//! stream:
//!
//! | byte   | command                                   |
//! |--------|-------------------------------------------|
//! | `0x50` | write: system `u8`, addr `u32`, value `u16` |
//! | `0x61` | wait: samples `u32`                       |
//! | `0x66` | end of stream                             |

use std::io::{Cursor, Seek, Write};

use binrw::helpers::until;
use binrw::{binrw, BinRead, BinWrite};
use pc_engine::{walk, BackendRegistry, Engine, RegisterWrite, MASTER_CLOCK_PREC};
use pc_ir::{ChipFamily, Song};

use crate::error::{FormatError, Result};

/// Oldest log version this exporter can write.
pub const MIN_VERSION: u32 = 0x150;
pub const CURRENT_VERSION: u32 = 0x171;
/// `loop_offset` of a song that stops instead of looping.
pub const NO_LOOP: u32 = u32::MAX;

/// One chip in the log's system table.
#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogSystem {
    /// Index into [`ChipFamily::ALL`]
    pub family: u8,
    pub clock: u32,
    pub volume: i8,
    pub panning: i8,
}

impl LogSystem {
    pub fn family(&self) -> Option<ChipFamily> {
        ChipFamily::ALL.get(self.family as usize).copied()
    }
}

#[binrw]
#[brw(little, magic = b"PCRL")]
#[derive(Clone, Debug, PartialEq)]
pub struct LogHeader {
    pub version: u32,
    /// Tick rate at the start of the song
    pub tick_rate: f64,
    pub sample_rate: u32,
    /// Byte offset of the loop start within the command stream
    pub loop_offset: u32,
    pub total_samples: u32,
    pub loop_samples: u32,
    #[br(temp)]
    #[bw(calc = systems.len() as u8)]
    system_count: u8,
    #[br(count = system_count)]
    pub systems: Vec<LogSystem>,
}

#[binrw]
#[brw(little)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogCommand {
    #[brw(magic = 0x50u8)]
    Write { system: u8, addr: u32, value: u16 },
    #[brw(magic = 0x61u8)]
    Wait { samples: u32 },
    #[brw(magic = 0x66u8)]
    End,
}

impl LogCommand {
    /// Size of the command in the stream.
    pub fn encoded_len(&self) -> u32 {
        match self {
            LogCommand::Write { .. } => 8,
            LogCommand::Wait { .. } => 5,
            LogCommand::End => 1,
        }
    }
}

#[binrw]
#[brw(little)]
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterLog {
    pub header: LogHeader,
    #[br(parse_with = until(|cmd: &LogCommand| *cmd == LogCommand::End))]
    pub commands: Vec<LogCommand>,
}

fn map_binrw(err: binrw::Error) -> FormatError {
    if err.is_eof() {
        return FormatError::UnexpectedEof;
    }
    match err {
        binrw::Error::Backtrace(bt) => map_binrw(*bt.error),
        binrw::Error::BadMagic { .. } => FormatError::InvalidHeader,
        other => FormatError::Binrw(other),
    }
}

/// Move every backend's pending register writes into `commands`.
fn drain_writes(engine: &mut Engine, scratch: &mut Vec<RegisterWrite>, commands: &mut Vec<LogCommand>) {
    let dispatcher = engine.dispatcher_mut();
    for system in 0..dispatcher.backend_count() {
        dispatcher.drain_register_writes(system, scratch);
        commands.extend(scratch.drain(..).map(|w| LogCommand::Write {
            system: system as u8,
            addr: w.addr,
            value: w.value,
        }));
    }
}

impl RegisterLog {
    pub fn write_to<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        BinWrite::write(self, writer)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let log = RegisterLog::read(&mut Cursor::new(bytes)).map_err(map_binrw)?;
        if log.header.version < MIN_VERSION {
            return Err(FormatError::UnsupportedVersion(log.header.version));
        }
        Ok(log)
    }

    /// Register writes in stream order as `(system, write)`.
    pub fn writes(&self) -> impl Iterator<Item = (u8, RegisterWrite)> + '_ {
        self.commands.iter().filter_map(|cmd| match *cmd {
            LogCommand::Write { system, addr, value } => Some((system, RegisterWrite { addr, value })),
            _ => None,
        })
    }

    /// Index of the first command of the loop section.
    pub fn loop_index(&self) -> Option<usize> {
        if self.header.loop_offset == NO_LOOP {
            return None;
        }
        let mut offset = 0;
        for (i, cmd) in self.commands.iter().enumerate() {
            if offset == self.header.loop_offset {
                return Some(i);
            }
            offset += cmd.encoded_len();
        }
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub version: u32,
    pub sample_rate: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { version: CURRENT_VERSION, sample_rate: 44100 }
    }
}

/// Play `subsong` of `song` once through and log its register writes.
///
/// Fails with [`FormatError::UnsupportedVersion`] before any engine is built
/// when `options.version` is older than [`MIN_VERSION`].
pub fn export_register_log(
    song: &Song,
    subsong: usize,
    registry: &BackendRegistry,
    options: &ExportOptions,
) -> Result<RegisterLog> {
    if options.version < MIN_VERSION {
        return Err(FormatError::UnsupportedVersion(options.version));
    }
    let walk = walk(song, subsong)?;
    let loop_tick = walk.loop_point.map(|lp| lp.tick);
    log::info!(
        "exporting {} ticks, loop at {:?}",
        walk.ticks,
        walk.loop_point.map(|lp| (lp.order, lp.row))
    );

    let mut engine = Engine::new(song.clone(), subsong, options.sample_rate, registry)?;
    engine.dispatcher_mut().set_register_logging(true);
    engine.set_loops(None);
    engine.play();

    let mut commands = Vec::new();
    let mut writes = Vec::new();
    // chip initialization
    drain_writes(&mut engine, &mut writes, &mut commands);
    let mut cycles_left = 0i64;
    let mut total_samples = 0u64;
    let mut loop_start: Option<(usize, u64)> = None;

    for tick in 0..walk.ticks {
        if loop_tick == Some(tick) {
            loop_start = Some((commands.len(), total_samples));
        }
        let (_, cycles) = engine.step_tick();
        drain_writes(&mut engine, &mut writes, &mut commands);
        cycles_left += cycles;
        let samples = cycles_left >> MASTER_CLOCK_PREC;
        cycles_left -= samples << MASTER_CLOCK_PREC;
        if samples > 0 {
            commands.push(LogCommand::Wait { samples: samples as u32 });
            total_samples += samples as u64;
        }
        if !engine.is_playing() {
            break;
        }
    }
    commands.push(LogCommand::End);

    let (loop_offset, loop_samples) = match loop_start {
        Some((index, start)) => (
            commands[..index].iter().map(LogCommand::encoded_len).sum(),
            total_samples - start,
        ),
        None => (NO_LOOP, 0),
    };
    let header = LogHeader {
        version: options.version,
        tick_rate: song.subsongs[subsong].hz,
        sample_rate: options.sample_rate,
        loop_offset,
        total_samples: total_samples.min(u32::MAX as u64) as u32,
        loop_samples: loop_samples.min(u32::MAX as u64) as u32,
        systems: song
            .systems
            .iter()
            .map(|s| LogSystem {
                family: ChipFamily::ALL.iter().position(|&f| f == s.family).unwrap_or(0) as u8,
                clock: s.clock(),
                volume: s.volume,
                panning: s.panning,
            })
            .collect(),
    };
    log::debug!("register log: {} commands, {total_samples} samples", commands.len());
    Ok(RegisterLog { header, commands })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_ir::{Cell, Note};
    use test_log::test;

    fn song() -> Song {
        let mut song = Song::with_systems("export", &[ChipFamily::Sms]);
        let sub = &mut song.subsongs[0];
        sub.pattern_length = 4;
        let pattern = sub.pattern_at_mut(0, 0).unwrap();
        let mut cell = Cell::with_note(Note::new(9, 4));
        cell.instrument = Some(0);
        pattern.set_row(0, cell);
        pattern.set_row(2, Cell::with_note(Note::Off));
        song
    }

    #[test]
    fn old_versions_are_rejected() {
        let registry = BackendRegistry::with_builtin();
        let options = ExportOptions { version: 0x14f, ..ExportOptions::default() };
        let err = export_register_log(&song(), 0, &registry, &options);
        assert!(matches!(err, Err(FormatError::UnsupportedVersion(0x14f))));
    }

    #[test]
    fn log_has_writes_and_waits() {
        let registry = BackendRegistry::with_builtin();
        let log = export_register_log(&song(), 0, &registry, &ExportOptions::default()).unwrap();
        assert!(log.writes().count() > 0);
        assert_eq!(log.commands.last(), Some(&LogCommand::End));
        // 24 ticks at 60 Hz
        assert_eq!(log.header.total_samples, 17640);
        assert_eq!(log.header.loop_samples, 17640);
        assert_eq!(log.header.systems[0].family(), Some(ChipFamily::Sms));
    }

    #[test]
    fn bytes_round_trip() {
        let registry = BackendRegistry::with_builtin();
        let log = export_register_log(&song(), 0, &registry, &ExportOptions::default()).unwrap();
        let bytes = log.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"PCRL");
        let back = RegisterLog::from_bytes(&bytes).unwrap();
        assert_eq!(back, log);
        assert!(back.loop_index().is_some());
    }

    #[test]
    fn stopping_song_has_no_loop() {
        let mut song = song();
        let mut stop = Cell::EMPTY;
        stop.set_effect(0, 0xff, 0);
        song.subsongs[0].pattern_at_mut(0, 0).unwrap().set_row(3, stop);
        let registry = BackendRegistry::with_builtin();
        let log = export_register_log(&song, 0, &registry, &ExportOptions::default()).unwrap();
        assert_eq!(log.header.loop_offset, NO_LOOP);
        assert_eq!(log.loop_index(), None);
    }

    #[test]
    fn reading_rejects_bad_data() {
        assert!(matches!(RegisterLog::from_bytes(b"NOPE\0\0\0\0"), Err(FormatError::InvalidHeader)));
        assert!(matches!(RegisterLog::from_bytes(b"PCRL"), Err(FormatError::UnexpectedEof)));

        let registry = BackendRegistry::with_builtin();
        let mut log = export_register_log(&song(), 0, &registry, &ExportOptions::default()).unwrap();
        log.header.version = 0x100;
        let bytes = log.to_bytes().unwrap();
        assert!(matches!(RegisterLog::from_bytes(&bytes), Err(FormatError::UnsupportedVersion(0x100))));
    }
}
