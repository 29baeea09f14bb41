use std::borrow::Cow;

/// Reduces feed-supplied text to a single clean line.
///
/// Feed titles and links end up as one line in an output buffer, so anything
/// that could break the line or manipulate a terminal reading it is removed:
///
/// - ANSI CSI sequences (`\x1b[` ... final byte 0x40-0x7E)
/// - ANSI OSC sequences (`\x1b]` ... BEL or `\x1b\\`)
/// - bare ESC, DEL and the remaining C0 control characters
/// - runs of whitespace (including `\n`, `\r`, `\t`) collapse to one space
///
/// Leading and trailing whitespace is trimmed. Returns `Cow::Borrowed` when
/// the input is already clean.
pub fn sanitize_line(s: &str) -> Cow<'_, str> {
    let trimmed = s.trim();
    if is_clean(trimmed) {
        return Cow::Borrowed(trimmed);
    }

    let bytes = trimmed.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut pending_space = false;
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        if b == 0x1b {
            i = skip_escape(bytes, i);
        } else if b.is_ascii_whitespace() {
            pending_space = true;
            i += 1;
        } else if b == 0x7f || b < 0x20 {
            i += 1;
        } else {
            // Copy the run up to the next byte needing attention. Those are all
            // ASCII, so the slice boundaries stay on char boundaries.
            let start = i;
            i += 1;
            while i < len && !needs_attention(bytes[i]) {
                i += 1;
            }
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push_str(&trimmed[start..i]);
        }
    }

    Cow::Owned(out)
}

fn needs_attention(b: u8) -> bool {
    b == 0x1b || b == 0x7f || b < 0x20 || b == b' '
}

fn is_clean(s: &str) -> bool {
    let mut prev_space = false;
    for &b in s.as_bytes() {
        if b == b' ' {
            if prev_space {
                return false;
            }
            prev_space = true;
            continue;
        }
        prev_space = false;
        if b == 0x1b || b == 0x7f || b < 0x20 {
            return false;
        }
    }
    true
}

/// Returns the index just past the escape sequence starting at `start`.
fn skip_escape(bytes: &[u8], start: usize) -> usize {
    let len = bytes.len();
    let mut i = start + 1;
    match bytes.get(i) {
        Some(b'[') => {
            i += 1;
            while i < len {
                let c = bytes[i];
                i += 1;
                if (0x40..=0x7e).contains(&c) {
                    break;
                }
            }
            i
        }
        Some(b']') => {
            i += 1;
            while i < len {
                if bytes[i] == 0x07 {
                    return i + 1;
                }
                if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                    return i + 2;
                }
                i += 1;
            }
            i
        }
        _ => i,
    }
}
