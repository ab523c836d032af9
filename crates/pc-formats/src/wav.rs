//! WAV encoding for 16-bit stereo PCM.

use std::io::{Seek, SeekFrom, Write};

use pc_engine::Frame;

const CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = CHANNELS * (BITS_PER_SAMPLE / 8);
const HEADER_LEN: u32 = 44;

fn write_header(w: &mut impl Write, sample_rate: u32, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(HEADER_LEN - 8 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")?;
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&CHANNELS.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * BLOCK_ALIGN as u32).to_le_bytes())?;
    w.write_all(&BLOCK_ALIGN.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())
}

fn write_frames(w: &mut impl Write, frames: &[Frame]) -> std::io::Result<()> {
    for frame in frames {
        w.write_all(&frame.left.to_le_bytes())?;
        w.write_all(&frame.right.to_le_bytes())?;
    }
    Ok(())
}

/// Write a complete WAV file.
pub fn write_wav(w: &mut impl Write, frames: &[Frame], sample_rate: u32) -> std::io::Result<()> {
    let data_size = frames.len() as u32 * BLOCK_ALIGN as u32;
    write_header(w, sample_rate, data_size)?;
    write_frames(w, frames)
}

/// Streams frames to a seekable sink and fixes the sizes up on `finish`.
pub struct WavWriter<W: Write + Seek> {
    inner: W,
    frames: u32,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut inner: W, sample_rate: u32) -> std::io::Result<Self> {
        write_header(&mut inner, sample_rate, 0)?;
        Ok(Self { inner, frames: 0 })
    }

    pub fn write(&mut self, frames: &[Frame]) -> std::io::Result<()> {
        write_frames(&mut self.inner, frames)?;
        self.frames = self.frames.saturating_add(frames.len() as u32);
        Ok(())
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Patch the RIFF and data sizes and hand back the sink.
    pub fn finish(mut self) -> std::io::Result<W> {
        let data_size = self.frames.saturating_mul(BLOCK_ALIGN as u32);
        self.inner.seek(SeekFrom::Start(4))?;
        self.inner.write_all(&(HEADER_LEN - 8 + data_size).to_le_bytes())?;
        self.inner.seek(SeekFrom::Start(40))?;
        self.inner.write_all(&data_size.to_le_bytes())?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frames() -> Vec<Frame> {
        vec![Frame { left: 1, right: -1 }, Frame { left: 32767, right: -32768 }]
    }

    #[test]
    fn header_fields() {
        let mut buf = Vec::new();
        write_wav(&mut buf, &frames(), 48000).unwrap();
        assert_eq!(buf.len(), 44 + 8);
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 36 + 8);
        assert_eq!(u32::from_le_bytes(buf[24..28].try_into().unwrap()), 48000);
        assert_eq!(u32::from_le_bytes(buf[40..44].try_into().unwrap()), 8);
        assert_eq!(i16::from_le_bytes([buf[46], buf[47]]), -1);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut whole = Vec::new();
        write_wav(&mut whole, &frames(), 44100).unwrap();

        let mut writer = WavWriter::new(Cursor::new(Vec::new()), 44100).unwrap();
        writer.write(&frames()[..1]).unwrap();
        writer.write(&frames()[1..]).unwrap();
        assert_eq!(writer.frames(), 2);
        let streamed = writer.finish().unwrap().into_inner();
        assert_eq!(streamed, whole);
    }
}
