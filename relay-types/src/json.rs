//! ASCII-only JSON output.

use serde_json::ser::Formatter;
use std::io::{self, Write};

/// JSON formatter that escapes every non-ASCII character as `\uXXXX`.
///
/// serde_json already escapes control characters and quotes; this only
/// handles the fragments it would otherwise write as raw UTF-8.
pub(crate) struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}
