//! Host backend on top of the OS serial driver (`serialport`).
//!
//! The kernel's USB-serial driver owns the bridge here, so line setup goes
//! through the tty layer and vendor requests are reported unsupported.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serialport::{DataBits, SerialPort, SerialPortType};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    ControlLines, LineCoding, Parity, RxHandler, StopBits, UsbHost, UsbId, UsbSerialDevice,
    VendorRequest,
};

/// Poll period of the reception thread; bounds how long shutdown waits.
const READ_POLL: Duration = Duration::from_millis(200);
const READ_CHUNK_SIZE: usize = 256;

/// Opens USB serial ports by vendor/product identifier.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortHost;

impl SerialPortHost {
    pub fn new() -> Self {
        Self
    }
}

impl UsbHost for SerialPortHost {
    type Device = SerialPortDevice;

    fn open(&mut self, id: UsbId, timeout: Duration) -> Result<SerialPortDevice> {
        let ports = serialport::available_ports().map_err(backend_error)?;
        let port_name = ports
            .into_iter()
            .find_map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) if usb.vid == id.vid && usb.pid == id.pid => {
                    Some(port.port_name)
                }
                _ => None,
            })
            .ok_or(TransportError::NotFound { id })?;

        let port = serialport::new(port_name.as_str(), LineCoding::default().baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|err| match err.kind {
                serialport::ErrorKind::NoDevice => TransportError::NotFound { id },
                _ => backend_error(err),
            })?;

        info!(port = %port_name, %id, "serial port opened");
        Ok(SerialPortDevice {
            port,
            port_name,
            attached: Arc::new(AtomicBool::new(true)),
            stop: Arc::new(AtomicBool::new(false)),
            reader: None,
        })
    }
}

/// An open serial port plus its reception thread.
pub struct SerialPortDevice {
    port: Box<dyn SerialPort>,
    port_name: String,
    attached: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialPortDevice {
    /// OS name of the port (e.g. `/dev/ttyUSB0`).
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl UsbSerialDevice for SerialPortDevice {
    fn set_line_coding(&mut self, coding: &LineCoding, timeout: Duration) -> Result<()> {
        let data_bits = match coding.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            _ => return Err(TransportError::Unsupported("data bits")),
        };
        let parity = match coding.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        };
        let stop_bits = match coding.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        };

        self.port.set_timeout(timeout).map_err(backend_error)?;
        self.port
            .set_baud_rate(coding.baud_rate)
            .map_err(backend_error)?;
        self.port.set_data_bits(data_bits).map_err(backend_error)?;
        self.port.set_parity(parity).map_err(backend_error)?;
        self.port.set_stop_bits(stop_bits).map_err(backend_error)?;
        Ok(())
    }

    fn set_control_lines(&mut self, lines: ControlLines, _timeout: Duration) -> Result<()> {
        self.port
            .write_data_terminal_ready(lines.dtr)
            .map_err(backend_error)?;
        self.port
            .write_request_to_send(lines.rts)
            .map_err(backend_error)?;
        Ok(())
    }

    fn vendor_control(
        &mut self,
        _request: VendorRequest,
        _data: &[u8],
        _timeout: Duration,
    ) -> Result<()> {
        Err(TransportError::Unsupported(
            "vendor control transfer through the tty driver",
        ))
    }

    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        if !self.attached.load(Ordering::Acquire) {
            return Err(TransportError::Detached);
        }
        self.port.set_timeout(timeout).map_err(backend_error)?;
        self.port
            .write_all(bytes)
            .and_then(|()| self.port.flush())
            .map_err(|err| match err.kind() {
                ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout(timeout),
                _ => TransportError::Io(err),
            })
    }

    fn start_receiving(&mut self, handler: Arc<dyn RxHandler>) -> Result<()> {
        if self.reader.is_some() {
            return Ok(());
        }
        let mut port = self.port.try_clone().map_err(backend_error)?;
        port.set_timeout(READ_POLL).map_err(backend_error)?;

        let attached = Arc::clone(&self.attached);
        let stop = Arc::clone(&self.stop);
        let port_name = self.port_name.clone();

        let reader = thread::Builder::new()
            .name("am7-rx".into())
            .spawn(move || {
                let mut chunk = [0u8; READ_CHUNK_SIZE];
                while !stop.load(Ordering::Acquire) {
                    match port.read(&mut chunk) {
                        Ok(0) => continue,
                        Ok(n) => handler.on_bytes(&chunk[..n]),
                        Err(err)
                            if matches!(
                                err.kind(),
                                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                            ) =>
                        {
                            continue
                        }
                        Err(err) => {
                            warn!(port = %port_name, error = %err, "serial read failed");
                            attached.store(false, Ordering::Release);
                            handler.on_detached();
                            break;
                        }
                    }
                }
                debug!(port = %port_name, "reception thread exiting");
            })?;

        self.reader = Some(reader);
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

impl Drop for SerialPortDevice {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn backend_error(err: serialport::Error) -> TransportError {
    match err.kind {
        serialport::ErrorKind::Io(kind) => {
            TransportError::Io(std::io::Error::new(kind, err.description))
        }
        serialport::ErrorKind::NoDevice => TransportError::Detached,
        _ => TransportError::Backend(err.description),
    }
}
