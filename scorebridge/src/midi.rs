//! Standard MIDI File program-change injection
//!
//! The synthesis stage rewrites transcribed/converted MIDI so that every
//! melodic channel plays the selected General MIDI program. Existing
//! program-change events are dropped (their delta time is carried onto the
//! following event so timing is preserved) and fresh program changes are
//! emitted immediately before the first note-on of each track, on all 16
//! channels except channel 10 (percussion).
//!
//! The rewritten file uses explicit status bytes throughout; track lengths
//! are recomputed on serialization.

use thiserror::Error;

/// Channel 10 (zero-based 9) is reserved for percussion in General MIDI
const PERCUSSION_CHANNEL: u8 = 9;

/// Largest value a four-byte variable-length quantity can encode
const VLQ_MAX: u32 = 0x0FFF_FFFF;

/// Errors from parsing a Standard MIDI File
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MidiError {
    #[error("not a Standard MIDI File (missing MThd/MTrk header)")]
    NotSmf,

    #[error("truncated MIDI data")]
    Truncated,

    #[error("data byte 0x{0:02x} with no preceding status byte")]
    OrphanRunningStatus(u8),

    #[error("unsupported event status byte 0x{0:02x}")]
    UnsupportedEvent(u8),
}

enum EventBody {
    /// Channel voice message; `len` is 1 or 2 data bytes
    Channel { status: u8, data: [u8; 2], len: usize },
    Meta { kind: u8, data: Vec<u8> },
    SysEx { status: u8, data: Vec<u8> },
}

struct TrackEvent {
    delta: u32,
    body: EventBody,
}

/// Rewrite an SMF so every melodic channel plays `program`.
pub fn set_program(smf: &[u8], program: u8) -> Result<Vec<u8>, MidiError> {
    let mut reader = Reader::new(smf);

    if reader.take(4)? != b"MThd" {
        return Err(MidiError::NotSmf);
    }
    let header_len = reader.u32be()?;
    if header_len < 6 {
        return Err(MidiError::NotSmf);
    }
    let format = reader.u16be()?;
    let num_tracks = reader.u16be()?;
    let division = reader.u16be()?;
    // Tolerate (and drop) oversized headers
    if header_len > 6 {
        reader.take(header_len as usize - 6)?;
    }

    let mut out = Vec::with_capacity(smf.len() + 64);
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&num_tracks.to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());

    for _ in 0..num_tracks {
        if reader.take(4)? != b"MTrk" {
            return Err(MidiError::NotSmf);
        }
        let track_len = reader.u32be()? as usize;
        let track_data = reader.take(track_len)?;
        let events = parse_track(track_data)?;
        let rewritten = inject_program(events, program);
        let bytes = serialize_track(&rewritten);
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&bytes);
    }

    Ok(out)
}

fn channel_data_len(status: u8) -> usize {
    // Program change and channel pressure carry one data byte
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

fn parse_track(data: &[u8]) -> Result<Vec<TrackEvent>, MidiError> {
    let mut reader = Reader::new(data);
    let mut events = Vec::new();
    let mut running_status: Option<u8> = None;

    while !reader.at_end() {
        let delta = reader.vlq()?;
        let first = reader.u8()?;
        let body = match first {
            0xFF => {
                running_status = None;
                let kind = reader.u8()?;
                let len = reader.vlq()? as usize;
                EventBody::Meta {
                    kind,
                    data: reader.take(len)?.to_vec(),
                }
            }
            0xF0 | 0xF7 => {
                running_status = None;
                let len = reader.vlq()? as usize;
                EventBody::SysEx {
                    status: first,
                    data: reader.take(len)?.to_vec(),
                }
            }
            status if status >= 0xF0 => return Err(MidiError::UnsupportedEvent(status)),
            status if status >= 0x80 => {
                running_status = Some(status);
                let len = channel_data_len(status);
                let mut data = [0u8; 2];
                for byte in data.iter_mut().take(len) {
                    *byte = reader.u8()?;
                }
                EventBody::Channel { status, data, len }
            }
            data_byte => {
                let status =
                    running_status.ok_or(MidiError::OrphanRunningStatus(data_byte))?;
                let len = channel_data_len(status);
                let mut data = [0u8; 2];
                data[0] = data_byte;
                for byte in data.iter_mut().take(len).skip(1) {
                    *byte = reader.u8()?;
                }
                EventBody::Channel { status, data, len }
            }
        };
        events.push(TrackEvent { delta, body });
    }

    Ok(events)
}

fn inject_program(events: Vec<TrackEvent>, program: u8) -> Vec<TrackEvent> {
    let mut out = Vec::with_capacity(events.len() + 16);
    let mut carried_delta: u32 = 0;
    let mut injected = false;

    for event in events {
        if let EventBody::Channel { status, .. } = &event.body {
            if status & 0xF0 == 0xC0 {
                // Drop pre-existing program changes, carrying the delta
                // forward so absolute event times are unchanged
                carried_delta = carried_delta.saturating_add(event.delta);
                continue;
            }
            if !injected && status & 0xF0 == 0x90 {
                for channel in 0..16u8 {
                    if channel != PERCUSSION_CHANNEL {
                        out.push(TrackEvent {
                            delta: 0,
                            body: EventBody::Channel {
                                status: 0xC0 | channel,
                                data: [program, 0],
                                len: 1,
                            },
                        });
                    }
                }
                injected = true;
            }
        }
        out.push(TrackEvent {
            delta: event.delta.saturating_add(carried_delta),
            body: event.body,
        });
        carried_delta = 0;
    }

    out
}

fn serialize_track(events: &[TrackEvent]) -> Vec<u8> {
    let mut out = Vec::new();
    for event in events {
        write_vlq(&mut out, event.delta);
        match &event.body {
            EventBody::Channel { status, data, len } => {
                out.push(*status);
                out.extend_from_slice(&data[..*len]);
            }
            EventBody::Meta { kind, data } => {
                out.push(0xFF);
                out.push(*kind);
                write_vlq(&mut out, data.len() as u32);
                out.extend_from_slice(data);
            }
            EventBody::SysEx { status, data } => {
                out.push(*status);
                write_vlq(&mut out, data.len() as u32);
                out.extend_from_slice(data);
            }
        }
    }
    out
}

fn write_vlq(out: &mut Vec<u8>, value: u32) {
    // Carried deltas can sum past the format ceiling; clamp rather than
    // emit an unparseable five-byte quantity
    let mut value = value.min(VLQ_MAX);
    let mut buf = [0u8; 4];
    let mut index = 3;
    buf[3] = (value & 0x7F) as u8;
    value >>= 7;
    while value > 0 {
        index -= 1;
        buf[index] = 0x80 | (value & 0x7F) as u8;
        value >>= 7;
    }
    out.extend_from_slice(&buf[index..]);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn u8(&mut self) -> Result<u8, MidiError> {
        let byte = *self.data.get(self.pos).ok_or(MidiError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16be(&mut self) -> Result<u16, MidiError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32be(&mut self) -> Result<u32, MidiError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], MidiError> {
        let end = self.pos.checked_add(len).ok_or(MidiError::Truncated)?;
        if end > self.data.len() {
            return Err(MidiError::Truncated);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Variable-length quantity, at most four bytes
    fn vlq(&mut self) -> Result<u32, MidiError> {
        let mut value: u32 = 0;
        for _ in 0..4 {
            let byte = self.u8()?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(MidiError::Truncated)
    }
}
