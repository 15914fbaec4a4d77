//! Completion marker: a tiny INI-style file telling the calling skin/installer that the
//! fonts step has run.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;

pub const MARKER_SECTION: &str = "[Variables]";
pub const MARKER_KEY: &str = "Installed_Fonts";
pub const MARKER_ENTRY: &str = "Installed_Fonts=1";

/// Writes the two-line marker, truncating anything already at `path`.
pub fn write_marker(path: &Path) -> Result<()> {
    let mut f = File::create(path)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;
    writeln!(f, "{MARKER_SECTION}")?;
    writeln!(f, "{MARKER_ENTRY}")?;
    Ok(())
}

/// Text encodings Rainmeter accepts for `.inc` files, identified by their BOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8 { bom: bool },
    Utf16Le,
    Utf16Be,
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

fn decode(bytes: &[u8]) -> Option<(String, Encoding)> {
    let utf16 = |body: &[u8], unit: fn([u8; 2]) -> u16| {
        if body.len() % 2 != 0 {
            return None;
        }
        let units: Vec<u16> = body.chunks_exact(2).map(|c| unit([c[0], c[1]])).collect();
        String::from_utf16(&units).ok()
    };

    match bytes {
        [0xFF, 0xFE, body @ ..] => utf16(body, u16::from_le_bytes).map(|s| (s, Encoding::Utf16Le)),
        [0xFE, 0xFF, body @ ..] => utf16(body, u16::from_be_bytes).map(|s| (s, Encoding::Utf16Be)),
        _ => match bytes.strip_prefix(UTF8_BOM) {
            Some(body) => String::from_utf8(body.to_vec())
                .ok()
                .map(|s| (s, Encoding::Utf8 { bom: true })),
            None => String::from_utf8(bytes.to_vec())
                .ok()
                .map(|s| (s, Encoding::Utf8 { bom: false })),
        },
    }
}

fn encode(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Utf8 { bom } => {
            let mut out = if bom { UTF8_BOM.to_vec() } else { Vec::new() };
            out.extend_from_slice(text.as_bytes());
            out
        }
        Encoding::Utf16Le => std::iter::once(0xFEFF)
            .chain(text.encode_utf16())
            .flat_map(u16::to_le_bytes)
            .collect(),
        Encoding::Utf16Be => std::iter::once(0xFEFF)
            .chain(text.encode_utf16())
            .flat_map(u16::to_be_bytes)
            .collect(),
    }
}

/// Sets `Installed_Fonts=1` inside an existing variables file, keeping its other lines.
///
/// The first `Installed_Fonts=` line is replaced; if there is none the entry is appended.
/// The file keeps its encoding (UTF-8, or UTF-16 with a BOM) and its line endings. A
/// missing or undecodable file gets the plain [`write_marker`] layout.
pub fn merge_marker(path: &Path) -> Result<()> {
    if !path.exists() {
        return write_marker(path);
    }

    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let Some((content, encoding)) = decode(&bytes) else {
        warn!("{} is not UTF-8 or UTF-16 text, rewriting it", path.display());
        return write_marker(path);
    };

    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<&str> = content.lines().collect();

    let prefix = format!("{MARKER_KEY}=");
    match lines.iter_mut().find(|line| line.starts_with(&prefix)) {
        Some(line) => *line = MARKER_ENTRY,
        None => lines.push(MARKER_ENTRY),
    }

    let mut merged = lines.join(newline);
    merged.push_str(newline);
    fs::write(path, encode(&merged, encoding))
        .with_context(|| format!("Failed to write to file: {}", path.display()))
}
