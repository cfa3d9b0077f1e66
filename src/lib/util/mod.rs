//! Assorted helpers used throughout the crate.

pub mod errors;

use failure::ResultExt;
use std::{fs, io::Write, path::Path};

use self::errors::Res;

/// Creates (or truncates) a file and writes `contents` to it in one go.
pub fn write(path: &Path, contents: &[u8]) -> Res<()> {
    let mut file =
        fs::File::create(path).context(format_err!("could not create file {}", path.display()))?;
    file.write_all(contents)
        .context(format_err!("could not write to file {}", path.display()))?;
    Ok(())
}

/// Turns a raw hash into a lowercase hex string.
pub fn hexify_hash(hash: &[u8]) -> String {
    let mut out = String::with_capacity(hash.len() * 2);
    for byte in hash {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

pub fn is_snake_case(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub fn is_pascal_case(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric())
}

/// Quotes a string as a TOML basic string.
pub fn toml_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
