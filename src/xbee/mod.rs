//! # XBee Serial Link Module
//!
//! Communication with the XBee radio attached over a USB/UART serial link. The radio
//! speaks a line protocol: one ASCII `KIND:payload` line per message in each direction.
//!
//! - [`framer`] turns raw byte chunks into lines
//! - [`codec`] classifies lines and encodes outbound commands
//! - [`SerialPeer`] is the seam the bridge loop reads from and writes to; [`XBeeSerial`]
//!   implements it over the `serialport` crate
//!
//! ## Configuration
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! ```
//!
//! Reads never block: the bridge drains whatever is buffered by the driver each loop
//! iteration and returns to its other duties.

pub mod codec;
pub mod framer;

use log::{debug, info};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::BridgeResult;
use crate::logutil::escape_log;
use codec::OutboundCommand;

/// Byte-level access to the serial peer.
pub trait SerialPeer {
    /// Read whatever is currently buffered into `buf` without waiting.
    /// Returns 0 when nothing is available.
    fn read_available(&mut self, buf: &mut [u8]) -> BridgeResult<usize>;

    /// Write one encoded command line.
    fn write_command(&mut self, command: &OutboundCommand) -> BridgeResult<()>;
}

pub struct XBeeSerial {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl XBeeSerial {
    /// Open the serial port 8N1 at `baud_rate`.
    pub fn open(port_name: &str, baud_rate: u32) -> BridgeResult<Self> {
        info!(
            "Opening XBee serial link on {} at {} baud",
            port_name, baud_rate
        );
        let mut builder = serialport::new(port_name, baud_rate).timeout(Duration::from_millis(50));
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None)
                .flow_control(serialport::FlowControl::None);
        }
        let port = builder.open()?;
        debug!("Serial port {} initialized", port_name);
        Ok(Self {
            port_name: port_name.to_string(),
            port,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl SerialPeer for XBeeSerial {
    fn read_available(&mut self, buf: &mut [u8]) -> BridgeResult<usize> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(0);
        }
        let want = available.min(buf.len());
        match self.port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_command(&mut self, command: &OutboundCommand) -> BridgeResult<()> {
        self.port.write_all(&codec::encode(command))?;
        self.port.flush()?;
        info!("Sent to XBee: {}", escape_log(command.as_str()));
        Ok(())
    }
}
