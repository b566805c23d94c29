//! SDS011 sensor over a serial port.
//!
//! Commands are 19-byte frames (`AA B4 cmd data[12] FF FF chk AB`), replies
//! are 10-byte frames (`AA id payload[6] chk AB`). A reply id of `C5` answers
//! a command, `C0` carries a measurement.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, trace};

use super::{CancelFlag, Measurement, ReportingMode, Sensor, MAX_CYCLE_MINUTES};
use crate::error::ExporterError;
use crate::Result;

const BAUD_RATE: u32 = 9600;

/// Port read timeout. Blocked reads wake up this often to check for
/// cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a control command may stay silent before it fails.
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

const HEAD: u8 = 0xAA;
const TAIL: u8 = 0xAB;
const COMMAND_ID: u8 = 0xB4;
const REPLY_ID: u8 = 0xC5;
const DATA_ID: u8 = 0xC0;

const CMD_REPORTING_MODE: u8 = 0x02;
const CMD_WORKING_PERIOD: u8 = 0x08;

const QUERY: u8 = 0;
const SET: u8 = 1;

const COMMAND_LEN: usize = 19;
const REPLY_LEN: usize = 10;

/// Frames skipped while waiting for a command reply before giving up.
const MAX_SKIPPED_FRAMES: usize = 16;

/// Byte link a sensor is attached to.
pub trait SerialLink: Read + Write + Send + 'static {
    /// Open a second link onto the same device.
    fn try_clone_link(&self) -> Result<Self>
    where
        Self: Sized;
}

impl SerialLink for Box<dyn SerialPort> {
    fn try_clone_link(&self) -> Result<Self> {
        Ok(self.try_clone()?)
    }
}

/// SDS011 sensor attached to a serial port.
pub struct Sds011<P = Box<dyn SerialPort>> {
    port: P,
    path: String,
    cancel: CancelFlag,
}

impl Sds011 {
    /// Open the sensor at the given serial device path.
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| ExporterError::SensorOpen {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Opened serial port {} at {} baud", path, BAUD_RATE);
        Ok(Self::from_port(port, path))
    }
}

impl<P: Read + Write> Sds011<P> {
    fn from_port(port: P, path: &str) -> Self {
        Self {
            port,
            path: path.to_string(),
            cancel: CancelFlag::new(),
        }
    }

    fn request(&mut self, command: u8, data: &[u8]) -> Result<[u8; REPLY_LEN]> {
        if self.cancel.is_cancelled() {
            return Err(ExporterError::Cancelled);
        }
        let frame = command_frame(command, data);
        trace!("{} <- {:02X?}", self.path, frame);
        self.port.write_all(&frame)?;
        self.port.flush()?;
        expect_reply(&mut self.port, command, &self.cancel)
    }

    fn send_mode(&mut self, mode: ReportingMode) -> Result<()> {
        let value = match mode {
            ReportingMode::Active => 0,
            ReportingMode::Passive => 1,
        };
        let reply = self.request(CMD_REPORTING_MODE, &[SET, value])?;
        if reply[3] != SET || reply[4] != value {
            return Err(ExporterError::Device(format!(
                "sensor did not confirm {:?} mode",
                mode
            )));
        }
        Ok(())
    }

    fn query_cycle(&mut self) -> Result<u8> {
        let reply = self.request(CMD_WORKING_PERIOD, &[QUERY])?;
        Ok(reply[4])
    }

    fn send_cycle(&mut self, minutes: u8) -> Result<()> {
        if minutes > MAX_CYCLE_MINUTES {
            return Err(ExporterError::InvalidCycle(minutes));
        }
        let reply = self.request(CMD_WORKING_PERIOD, &[SET, minutes])?;
        if reply[3] != SET || reply[4] != minutes {
            return Err(ExporterError::Device(format!(
                "sensor did not confirm cycle of {} minutes",
                minutes
            )));
        }
        Ok(())
    }

    fn wait_measurement(&mut self) -> Result<Measurement> {
        loop {
            let frame = read_frame(&mut self.port, None, &self.cancel)?;
            if frame[1] == DATA_ID {
                return Ok(decode_measurement(&frame));
            }
            debug!("Skipping non-measurement frame {:02X?}", frame);
        }
    }
}

impl<P: SerialLink> Sensor for Sds011<P> {
    fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            port: self.port.try_clone_link()?,
            path: self.path.clone(),
            cancel: CancelFlag::new(),
        })
    }

    fn set_cancel_flag(&mut self, cancel: CancelFlag) {
        self.cancel = cancel;
    }

    fn set_mode(&mut self, mode: ReportingMode) -> Result<()> {
        self.send_mode(mode)
    }

    fn cycle(&mut self) -> Result<u8> {
        self.query_cycle()
    }

    fn set_cycle(&mut self, minutes: u8) -> Result<()> {
        self.send_cycle(minutes)
    }

    fn read_measurement(&mut self) -> Result<Measurement> {
        self.wait_measurement()
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Build a command frame addressed to every device on the line.
fn command_frame(command: u8, data: &[u8]) -> [u8; COMMAND_LEN] {
    let mut frame = [0u8; COMMAND_LEN];
    frame[0] = HEAD;
    frame[1] = COMMAND_ID;
    frame[2] = command;
    let len = data.len().min(12);
    frame[3..3 + len].copy_from_slice(&data[..len]);
    frame[15] = 0xFF;
    frame[16] = 0xFF;
    frame[17] = checksum(&frame[2..17]);
    frame[18] = TAIL;
    frame
}

fn decode_measurement(frame: &[u8; REPLY_LEN]) -> Measurement {
    let pm25 = u16::from_le_bytes([frame[2], frame[3]]);
    let pm10 = u16::from_le_bytes([frame[4], frame[5]]);
    Measurement::new(f64::from(pm25) / 10.0, f64::from(pm10) / 10.0)
}

/// Read the next well-formed reply frame.
///
/// Port timeouts while hunting for the frame head are retried until
/// `deadline` passes, or forever without one. `cancel` is checked before
/// every byte of the hunt.
fn read_frame<R: Read>(
    reader: &mut R,
    deadline: Option<Instant>,
    cancel: &CancelFlag,
) -> Result<[u8; REPLY_LEN]> {
    let mut frame = [0u8; REPLY_LEN];
    loop {
        if cancel.is_cancelled() {
            return Err(ExporterError::Cancelled);
        }
        match reader.read(&mut frame[..1]) {
            Ok(0) => {
                return Err(ExporterError::Device("serial port closed".to_string()));
            }
            Ok(_) if frame[0] != HEAD => continue,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::TimedOut => match deadline {
                Some(deadline) if Instant::now() >= deadline => return Err(e.into()),
                _ => continue,
            },
            Err(e) => return Err(e.into()),
        }

        reader.read_exact(&mut frame[1..])?;
        trace!("sds011 -> {:02X?}", frame);

        if frame[REPLY_LEN - 1] != TAIL || frame[8] != checksum(&frame[2..8]) {
            debug!("Dropping malformed frame {:02X?}", frame);
            continue;
        }
        return Ok(frame);
    }
}

/// Wait for the reply to `command`, skipping measurement frames on the way.
fn expect_reply<R: Read>(
    reader: &mut R,
    command: u8,
    cancel: &CancelFlag,
) -> Result<[u8; REPLY_LEN]> {
    let deadline = Instant::now() + REPLY_TIMEOUT;
    for _ in 0..MAX_SKIPPED_FRAMES {
        let frame = read_frame(reader, Some(deadline), cancel)?;
        if frame[1] == REPLY_ID && frame[2] == command {
            return Ok(frame);
        }
        debug!("Skipping frame {:02X?} while waiting for reply", frame);
    }
    Err(ExporterError::Device(format!(
        "no reply to command {:#04X}",
        command
    )))
}
