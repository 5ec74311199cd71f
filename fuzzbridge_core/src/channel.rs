//! The two pipes between the engine and the harness.
//!
//! Every value on either pipe is a little-endian `i32`:
//!
//! * control (engine -> harness): the length of the next test case, whose
//!   bytes are already in the payload area of the shared segment;
//! * status (harness -> engine): one handshake value, then one [`FaultStatus`]
//!   per test case.

use crate::error::BridgeError;
use bincode::config::{Configuration, Fixint, LittleEndian, NoLimit};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

/// First value written on the status pipe once both pipes are connected.
/// The engine reads it as a 4-byte readiness signal; the value itself is fixed.
pub const HANDSHAKE: i32 = 0;

/// Outcome of one execution as the engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStatus {
    None,
    Crash,
}

impl FaultStatus {
    pub fn code(self) -> i32 {
        match self {
            FaultStatus::None => 0,
            FaultStatus::Crash => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FaultStatus::None),
            1 => Some(FaultStatus::Crash),
            _ => None,
        }
    }
}

fn wire_config() -> Configuration<LittleEndian, Fixint, NoLimit> {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

/// Reading end of the control pipe.
#[derive(Debug)]
pub struct ControlChannel<R: Read> {
    reader: R,
}

impl<R: Read> ControlChannel<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Blocks until the engine announces the next test-case length.
    pub fn read_len(&mut self) -> Result<i32, BridgeError> {
        let len: i32 = bincode::decode_from_std_read(&mut self.reader, wire_config())?;
        Ok(len)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writing end of the status pipe.
#[derive(Debug)]
pub struct StatusChannel<W: Write> {
    writer: W,
}

impl<W: Write> StatusChannel<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_handshake(&mut self) -> Result<(), BridgeError> {
        self.write_i32(HANDSHAKE)
    }

    pub fn write_status(&mut self, status: FaultStatus) -> Result<(), BridgeError> {
        self.write_i32(status.code())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), BridgeError> {
        bincode::encode_into_std_write(value, &mut self.writer, wire_config())?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Connects to the engine's FIFOs: the status pipe first, then the control pipe.
///
/// The engine waits for the status pipe before opening the control pipe, so the
/// reverse order would leave both sides blocked in `open`.
pub fn connect_pipes(
    status_path: &Path,
    control_path: &Path,
) -> Result<(StatusChannel<File>, ControlChannel<File>), BridgeError> {
    tracing::debug!(path = %status_path.display(), "connecting status pipe");
    let status = OpenOptions::new().write(true).open(status_path)?;
    tracing::debug!(path = %control_path.display(), "connecting control pipe");
    let control = OpenOptions::new().read(true).open(control_path)?;
    Ok((StatusChannel::new(status), ControlChannel::new(control)))
}
