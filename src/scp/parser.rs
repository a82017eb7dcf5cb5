//! Control-line codec for the SCP wire protocol.
//!
//! Formats and parses the newline-terminated `C`, `D` and `E` messages and
//! the single-byte status replies that frame every transfer.

use crate::error::{Error, Result};

use super::types::{ScpMessage, StatusLevel, STATUS_FATAL, STATUS_OK, STATUS_WARNING};

/// Format a file header: `C<mode> <length> <name>\n`.
pub fn format_file(mode: u32, length: u64, name: &str) -> Result<String> {
    check_name(name)?;
    Ok(format!("C{:04o} {} {}\n", mode, length, name))
}

/// Format a directory-open header: `D<mode> 0 <name>\n`.
pub fn format_start_dir(mode: u32, name: &str) -> Result<String> {
    check_name(name)?;
    Ok(format!("D{:04o} 0 {}\n", mode, name))
}

/// Format a directory-close marker: `E\n`.
pub fn format_end_dir() -> String {
    "E\n".to_string()
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(' ') || name.contains('\n') {
        return Err(Error::MalformedFrame(format!("invalid entry name {name:?}")));
    }
    Ok(())
}

/// Parse one control line as returned by a buffered line read. The trailing
/// `\n` may or may not be present for `E`; `C` and `D` lines are expected to
/// carry it. Status lines keep their diagnostic text verbatim.
pub fn parse_message(line: &[u8]) -> Result<ScpMessage> {
    let Some(&tag) = line.first() else {
        return Err(Error::MalformedFrame("empty frame".into()));
    };

    match tag {
        b'C' => {
            let (mode, length, name) = parse_header(&line[1..])?;
            Ok(ScpMessage::File { mode, length, name })
        }
        b'D' => {
            let (mode, _, name) = parse_header(&line[1..])?;
            Ok(ScpMessage::StartDir { mode, name })
        }
        b'E' => match &line[1..] {
            b"" | b"\n" => Ok(ScpMessage::EndDir),
            _ => Err(Error::MalformedFrame("trailing bytes after E".into())),
        },
        STATUS_OK => Ok(ScpMessage::Status {
            level: StatusLevel::Ok,
            text: String::from_utf8_lossy(&line[1..]).into_owned(),
        }),
        STATUS_WARNING => Ok(ScpMessage::Status {
            level: StatusLevel::Warning,
            text: String::from_utf8_lossy(&line[1..]).into_owned(),
        }),
        STATUS_FATAL => Ok(ScpMessage::Status {
            level: StatusLevel::Fatal,
            text: String::from_utf8_lossy(&line[1..]).into_owned(),
        }),
        other => Err(Error::MalformedFrame(format!(
            "unknown message tag {other:#04x}"
        ))),
    }
}

/// Body of a `C`/`D` header: `<mode4o> <length> <name>`, exactly three
/// space-separated tokens.
fn parse_header(body: &[u8]) -> Result<(u32, u64, String)> {
    let body = std::str::from_utf8(body)
        .map_err(|_| Error::MalformedFrame("non-utf8 header".into()))?;
    let body = body.strip_suffix('\n').unwrap_or(body);

    let fields: Vec<&str> = body.split(' ').collect();
    if fields.len() != 3 {
        return Err(Error::MalformedFrame(format!(
            "expected 3 header fields, got {}",
            fields.len()
        )));
    }

    let mode = u32::from_str_radix(fields[0], 8)
        .map_err(|_| Error::MalformedFrame(format!("invalid mode {:?}", fields[0])))?;
    let length = fields[1]
        .parse::<u64>()
        .map_err(|_| Error::MalformedFrame(format!("invalid length {:?}", fields[1])))?;

    Ok((mode, length, fields[2].to_string()))
}
