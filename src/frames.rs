/* src/frames.rs */
//! Raw little-endian frame codec used by the command-line tool.
//!
//! A frame file is a plain concatenation of frames. Measurements are 16-bit samples;
//! unsigned files store them offset by 32768. Fraction planes are stored at the width
//! of their representation.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::io::{ErrorKind, Read, Write};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{DectError, Result};
use crate::quantize::OutputSample;

/// Offset between unsigned stored samples and the signed centred scale.
pub const UNSIGNED_OFFSET: i32 = 32768;

/// How measurement samples are stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit, already centred.
    #[default]
    Signed,
    /// Unsigned 16-bit, centred by subtracting 32768.
    Unsigned,
}

impl SampleFormat {
    /// Decode one stored sample.
    #[inline]
    pub fn decode(self, raw: [u8; 2]) -> i16 {
        match self {
            SampleFormat::Signed => i16::from_le_bytes(raw),
            SampleFormat::Unsigned => (i32::from(u16::from_le_bytes(raw)) - UNSIGNED_OFFSET) as i16,
        }
    }

    /// Encode one centred sample.
    #[inline]
    pub fn encode(self, value: i16) -> [u8; 2] {
        match self {
            SampleFormat::Signed => value.to_le_bytes(),
            SampleFormat::Unsigned => ((i32::from(value) + UNSIGNED_OFFSET) as u16).to_le_bytes(),
        }
    }
}

/// Decode a byte buffer of measurement samples.
pub fn decode_measurements(bytes: &[u8], format: SampleFormat) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(DectError::input(format!(
            "measurement buffer of {} bytes is not a whole number of samples",
            bytes.len()
        )));
    }
    Ok(bytes.chunks_exact(2).map(|c| format.decode([c[0], c[1]])).collect())
}

/// Encode measurement samples.
pub fn encode_measurements(values: &[i16], format: SampleFormat) -> Vec<u8> {
    values.iter().flat_map(|&v| format.encode(v)).collect()
}

/// Decode a byte buffer of fraction samples.
pub fn decode_plane<O: OutputSample>(bytes: &[u8]) -> Result<Vec<O>> {
    let width = O::REPR.descriptor().bytes;
    if bytes.len() % width != 0 {
        return Err(DectError::input(format!(
            "{} plane of {} bytes is not a whole number of samples",
            O::REPR,
            bytes.len()
        )));
    }
    Ok(bytes.chunks_exact(width).map(O::read_le).collect())
}

/// Read exactly `len` bytes.
///
/// `Ok(None)` at a clean end of input; a partial frame is an input error.
pub fn read_frame_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 if len > 0 => Ok(None),
        f if f == len => Ok(Some(buf)),
        f => Err(DectError::input(format!("truncated frame: expected {len} bytes, got {f}"))),
    }
}

/// Reads fixed-length measurement frames from a stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    frame_len: usize,
    format: SampleFormat,
    frames_read: usize,
}

impl<R: Read> FrameReader<R> {
    /// Frames of `frame_len` samples in `format`.
    pub fn new(reader: R, frame_len: usize, format: SampleFormat) -> Result<Self> {
        if frame_len == 0 {
            return Err(DectError::input("frame length must be positive"));
        }
        Ok(Self { reader, frame_len, format, frames_read: 0 })
    }

    /// Number of frames returned so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Next frame, or `None` at end of input.
    pub fn next_frame(&mut self) -> Result<Option<Vec<i16>>> {
        let Some(bytes) = read_frame_bytes(&mut self.reader, self.frame_len * 2)? else {
            return Ok(None);
        };
        self.frames_read += 1;
        decode_measurements(&bytes, self.format).map(Some)
    }
}

/// Write a buffer and report I/O failures as [`DectError::Io`].
pub fn write_all<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes)?;
    Ok(())
}
