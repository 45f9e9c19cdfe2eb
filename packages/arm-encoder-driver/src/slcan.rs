//! The ASCII line protocol spoken by SLCAN (Lawicel) USB-to-CAN adapters.
//!
//! | Line              | Meaning                                           |
//! |-------------------|---------------------------------------------------|
//! | `S<n>\r`          | Select one of the standard bit rates              |
//! | `O\r` / `L\r`     | Open the channel normally / in listen-only mode   |
//! | `C\r`             | Close the channel                                 |
//! | `t<iii><l><dd..>` | Standard data frame, hex id, length and data      |
//! | `z\r`, `\r`       | Acknowledgements                                  |
//! | `\x07`            | The adapter rejected the last command             |

use std::fmt::Write;

use thiserror::Error;

use arm_encoder_protocol::{value::BaudRate, CanFrame, StandardId};

pub const OPEN: &str = "O\r";
pub const LISTEN_ONLY: &str = "L\r";
pub const CLOSE: &str = "C\r";

pub const BELL: u8 = 0x07;
pub const CR: u8 = b'\r';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlcanError {
    #[error("The adapter rejected a command")]
    AdapterError,

    #[error("Malformed adapter line: {0:?}")]
    Malformed(String),
}

/// The `S<n>` command for a bus bit rate.
///
/// Only the nine standard SLCAN rates have a command; the others return `None`.
pub fn bitrate_command(bitrate: BaudRate) -> Option<&'static str> {
    Some(match bitrate {
        BaudRate::Kbps10 => "S0\r",
        BaudRate::Kbps20 => "S1\r",
        BaudRate::Kbps50 => "S2\r",
        BaudRate::Kbps100 => "S3\r",
        BaudRate::Kbps125 => "S4\r",
        BaudRate::Kbps250 => "S5\r",
        BaudRate::Kbps500 => "S6\r",
        BaudRate::Kbps800 => "S7\r",
        BaudRate::Kbps1000 => "S8\r",
        _ => return None,
    })
}

/// Encodes a frame as a `t` line, including the trailing carriage return.
pub fn encode_frame(frame: &CanFrame) -> String {
    let mut line = format!("t{:03X}{:X}", frame.id().as_raw(), frame.len());
    for byte in frame.data() {
        // Writing to a String cannot fail.
        let _ = write!(line, "{byte:02X}");
    }
    line.push('\r');
    line
}

/// Takes the next complete line out of `buffer`, without its terminator.
///
/// A BEL byte ends a line on its own and is kept, so that [`parse_line`] can report it.
pub fn next_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.iter().position(|&b| b == CR || b == BELL)?;
    let mut line: Vec<u8> = buffer.drain(..=end).collect();
    if line.last() == Some(&CR) {
        line.pop();
    }
    Some(line)
}

/// Parses one line received from the adapter.
///
/// Returns `Ok(None)` for acknowledgements and for frames this crate never deals with
/// (extended and remote frames).
pub fn parse_line(line: &[u8]) -> Result<Option<CanFrame>, SlcanError> {
    if line.contains(&BELL) {
        return Err(SlcanError::AdapterError);
    }

    match line.first() {
        None | Some(b'z' | b'Z' | b'T' | b'r' | b'R') => Ok(None),
        Some(b't') => parse_standard_frame(line).map(Some),
        Some(_) => Err(malformed(line)),
    }
}

fn parse_standard_frame(line: &[u8]) -> Result<CanFrame, SlcanError> {
    if line.len() < 5 {
        return Err(malformed(line));
    }

    let id = hex(&line[1..4]).ok_or_else(|| malformed(line))?;
    let id = StandardId::new(id as u16).map_err(|_| malformed(line))?;

    let len = hex(&line[4..5]).ok_or_else(|| malformed(line))? as usize;
    if len > CanFrame::MAX_LEN {
        return Err(malformed(line));
    }

    // Adapters with timestamps enabled append four more hex digits.
    let data_end = 5 + 2 * len;
    if line.len() != data_end && line.len() != data_end + 4 {
        return Err(malformed(line));
    }

    let mut data = [0u8; CanFrame::MAX_LEN];
    for (i, byte) in data[..len].iter_mut().enumerate() {
        let at = 5 + 2 * i;
        *byte = hex(&line[at..at + 2]).ok_or_else(|| malformed(line))? as u8;
    }

    CanFrame::new(id, &data[..len]).map_err(|_| malformed(line))
}

fn hex(digits: &[u8]) -> Option<u32> {
    let digits = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(digits, 16).ok()
}

fn malformed(line: &[u8]) -> SlcanError {
    SlcanError::Malformed(String::from_utf8_lossy(line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_upper_case_hex() {
        let frame = CanFrame::new(
            StandardId::new(0x50).unwrap(),
            &[0xFF, 0xAA, 0x27, 0x15, 0x00],
        )
        .unwrap();
        assert_eq!(encode_frame(&frame), "t0505FFAA271500\r");

        let empty = CanFrame::new(StandardId::new(0x7FF).unwrap(), &[]).unwrap();
        assert_eq!(encode_frame(&empty), "t7FF0\r");
    }

    #[test]
    fn received_lines() {
        let frame = parse_line(b"t050855550020000000E0").unwrap().unwrap();
        assert_eq!(frame.id().as_raw(), 0x50);
        assert_eq!(frame.data(), &[0x55, 0x55, 0x00, 0x20, 0x00, 0x00, 0x00, 0xE0]);

        // Timestamped
        let frame = parse_line(b"t050255561A2B").unwrap().unwrap();
        assert_eq!(frame.data(), &[0x55, 0x56]);

        assert_eq!(parse_line(b"z"), Ok(None));
        assert_eq!(parse_line(b""), Ok(None));
        assert_eq!(parse_line(b"T0000005020"), Ok(None));
        assert_eq!(parse_line(b"\x07"), Err(SlcanError::AdapterError));
    }

    #[test]
    fn malformed_lines() {
        let lines: [&[u8]; 6] = [
            b"t05",
            b"t0502FF",
            b"t05090000000000000000",
            b"t80000",
            b"tXYZ0",
            b"?",
        ];
        for line in lines {
            assert!(
                matches!(parse_line(line), Err(SlcanError::Malformed(_))),
                "{:?}",
                String::from_utf8_lossy(line)
            );
        }
    }

    #[test]
    fn lines_are_split_on_cr_and_bell() {
        let mut buffer = b"z\rt0501AA\r\x07t05".to_vec();
        assert_eq!(next_line(&mut buffer), Some(b"z".to_vec()));
        assert_eq!(next_line(&mut buffer), Some(b"t0501AA".to_vec()));
        assert_eq!(next_line(&mut buffer), Some(vec![BELL]));
        assert_eq!(next_line(&mut buffer), None);
        assert_eq!(buffer, b"t05");
    }

    #[test]
    fn only_standard_rates_have_commands() {
        assert_eq!(bitrate_command(BaudRate::Kbps250), Some("S5\r"));
        assert_eq!(bitrate_command(BaudRate::Kbps1000), Some("S8\r"));
        assert_eq!(bitrate_command(BaudRate::Kbps400), None);
        assert_eq!(bitrate_command(BaudRate::Kbps3), None);
    }
}
