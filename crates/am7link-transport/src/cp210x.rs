//! Silicon Labs CP210x vendor requests.
//!
//! Used when the bridge stalls the standard CDC requests. The sequence
//! enables the UART, sets line control and baud rate, then pulses the modem
//! lines to reset the sensor's communication state.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::traits::{ControlLines, LineCoding, Parity, StopBits, UsbSerialDevice, VendorRequest};

pub const IFC_ENABLE: u8 = 0x00;
pub const SET_LINE_CTL: u8 = 0x03;
pub const SET_MHS: u8 = 0x07;
pub const SET_BAUDRATE: u8 = 0x1E;

const UART_ENABLE: u16 = 0x0001;
const MHS_DTR: u16 = 0x0001;
const MHS_RTS: u16 = 0x0002;
const MHS_DTR_MASK: u16 = 0x0100;
const MHS_RTS_MASK: u16 = 0x0200;

/// Delay between dropping and raising the modem lines.
pub const LINE_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// `SET_LINE_CTL` value: stop bits in 0-3, parity in 4-7, word length in 8-15.
pub fn line_control_value(coding: &LineCoding) -> u16 {
    let stop = match coding.stop_bits {
        StopBits::One => 0,
        StopBits::Two => 2,
    };
    let parity = match coding.parity {
        Parity::None => 0,
        Parity::Odd => 1,
        Parity::Even => 2,
    };
    (u16::from(coding.data_bits) << 8) | (parity << 4) | stop
}

/// `SET_MHS` value that writes both lines (masks set) to the given levels.
pub fn modem_handshake_value(lines: ControlLines) -> u16 {
    let mut value = MHS_DTR_MASK | MHS_RTS_MASK;
    if lines.dtr {
        value |= MHS_DTR;
    }
    if lines.rts {
        value |= MHS_RTS;
    }
    value
}

/// Run the vendor configuration sequence on `interface`.
pub fn configure<D: UsbSerialDevice + ?Sized>(
    device: &mut D,
    interface: u16,
    coding: &LineCoding,
    timeout: Duration,
    settle: Duration,
) -> Result<()> {
    let request = |request: u8, value: u16| VendorRequest {
        request,
        value,
        index: interface,
    };

    device.vendor_control(request(IFC_ENABLE, UART_ENABLE), &[], timeout)?;
    device.vendor_control(request(SET_LINE_CTL, line_control_value(coding)), &[], timeout)?;
    device.vendor_control(
        request(SET_BAUDRATE, 0),
        &coding.baud_rate.to_le_bytes(),
        timeout,
    )?;

    device.vendor_control(
        request(SET_MHS, modem_handshake_value(ControlLines::LOW)),
        &[],
        timeout,
    )?;
    thread::sleep(settle);
    device.vendor_control(
        request(SET_MHS, modem_handshake_value(ControlLines::HIGH)),
        &[],
        timeout,
    )?;

    debug!(baud = coding.baud_rate, "cp210x vendor configuration applied");
    Ok(())
}
