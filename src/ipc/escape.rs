//! Value escaping for the tab/newline framed protocol.
//!
//! Only the three bytes that collide with framing are escaped on the way out:
//! backslash, tab and newline. Everything else, including control and high
//! bytes, goes over the wire untouched. Unescaping understands the full C-style
//! escape set (`\b \f \n \r \t \v \\ \"` and octal `\NNN`) because the daemon is
//! free to use any of them.

/// Escape a value so it can be written between protocol delimiters.
pub fn sanitize(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for c in source.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`sanitize`] (and any other C-style escapes the daemon emits).
///
/// Octal escapes may produce byte sequences that are not valid UTF-8; those are
/// replaced with U+FFFD. A trailing lone backslash is kept as-is.
pub fn desanitize(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }

        let Some(&next) = bytes.get(i + 1) else {
            out.push(b'\\');
            break;
        };

        match next {
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                let mut len = 0;
                while len < 3 {
                    match bytes.get(i + 1 + len) {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            len += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xff) as u8);
                i += 1 + len;
                continue;
            }
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            other => out.push(other),
        }
        i += 2;
    }

    match String::from_utf8(out) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
