//! osc.rs
//! Minimal OSC 1.0 codec for the VMC stream.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! message: address\0 pad4 | ",tags"\0 pad4 | arg0 | arg1 | ...
//! bundle:  "#bundle\0" | timetag(8) | (size:i32 | element)*
//! ```
//!
//! Supported argument tags: `f` (f32), `i` (i32), `s` (padded string).
//! Every read is bounds-checked against the slice; a malformed message is
//! dropped on its own, siblings in the same bundle still decode.

/// Bundle magic including its terminator (already 4-byte aligned).
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Header length of a bundle: magic + 8-byte time tag.
const BUNDLE_HEADER_LEN: usize = 16;

/// Nested bundles deeper than this are ignored (keeps recursion bounded).
pub const MAX_BUNDLE_DEPTH: usize = 16;

/// OSC "immediately" time tag, written by the encoder.
const TIMETAG_IMMEDIATE: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Str(String),
    Int(i32),
    Float(f32),
}

impl OscArg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscArg::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view; ints are widened to float like most VMC senders expect.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OscArg::Float(f) => Some(*f),
            OscArg::Int(i) => Some(*i as f32),
            OscArg::Str(_) => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            OscArg::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            OscArg::Str(_) => b's',
            OscArg::Int(_) => b'i',
            OscArg::Float(_) => b'f',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self { address: address.into(), args }
    }

    /// Float argument at `idx`, if present and numeric.
    pub fn f32_at(&self, idx: usize) -> Option<f32> {
        self.args.get(idx).and_then(OscArg::as_f32)
    }

    pub fn str_at(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).and_then(OscArg::as_str)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a datagram (bundle or single message) into its messages,
/// depth-first in element order. Malformed input yields fewer (or zero)
/// messages, never a panic.
pub fn decode(buf: &[u8]) -> Vec<OscMessage> {
    decode_counted(buf).0
}

/// [`decode`] plus the number of elements that failed to decode: malformed
/// messages, bundles nested too deep, and bad or truncated element sizes.
pub fn decode_counted(buf: &[u8]) -> (Vec<OscMessage>, usize) {
    let mut out = Vec::new();
    let failures = decode_with(buf, &mut |msg| out.push(msg));
    (out, failures)
}

/// Visitor form of [`decode`]; avoids collecting when the caller dispatches
/// each message immediately. Returns the failed-element count.
pub fn decode_with<F: FnMut(OscMessage)>(buf: &[u8], on_message: &mut F) -> usize {
    decode_element(buf, 0, on_message)
}

pub fn is_bundle(buf: &[u8]) -> bool {
    buf.starts_with(BUNDLE_TAG)
}

fn decode_element<F: FnMut(OscMessage)>(buf: &[u8], depth: usize, on_message: &mut F) -> usize {
    if is_bundle(buf) {
        if depth >= MAX_BUNDLE_DEPTH {
            return 1;
        }
        decode_bundle(buf, depth, on_message)
    } else if let Some(msg) = decode_message(buf) {
        on_message(msg);
        0
    } else {
        1
    }
}

fn decode_bundle<F: FnMut(OscMessage)>(buf: &[u8], depth: usize, on_message: &mut F) -> usize {
    if buf.len() < BUNDLE_HEADER_LEN {
        return 1;
    }
    // time tag ignored
    let mut failures = 0;
    let mut pos = BUNDLE_HEADER_LEN;
    while pos < buf.len() {
        let Some(size) = read_i32(buf, pos) else {
            // fewer than four bytes left: a truncated size field
            return failures + 1;
        };
        pos += 4;
        let end = usize::try_from(size)
            .ok()
            .filter(|&n| n > 0)
            .and_then(|n| pos.checked_add(n))
            .filter(|&e| e <= buf.len());
        let Some(end) = end else {
            // the rest of the bundle cannot be framed
            return failures + 1;
        };
        failures += decode_element(&buf[pos..end], depth + 1, on_message);
        pos = end;
    }
    failures
}

/// Decode one message. `None` on truncation, bad type tags or unsupported
/// argument types.
pub fn decode_message(buf: &[u8]) -> Option<OscMessage> {
    let (address, mut pos) = read_str(buf, 0)?;
    let (tags, next) = read_str(buf, pos)?;
    pos = next;

    let tags = tags.as_bytes();
    if tags.first() != Some(&b',') {
        return None;
    }

    let mut args = Vec::with_capacity(tags.len() - 1);
    for &tag in &tags[1..] {
        match tag {
            b'f' => {
                let bits = read_u32(buf, pos)?;
                args.push(OscArg::Float(f32::from_bits(bits)));
                pos += 4;
            }
            b'i' => {
                let v = read_i32(buf, pos)?;
                args.push(OscArg::Int(v));
                pos += 4;
            }
            b's' => {
                let (s, next) = read_str(buf, pos)?;
                args.push(OscArg::Str(s.to_owned()));
                pos = next;
            }
            _ => return None,
        }
    }

    Some(OscMessage {
        address: address.to_owned(),
        args,
    })
}

/// Padded on-wire size of a string of `len` bytes, terminator included.
#[inline]
pub fn padded_len(len: usize) -> usize {
    (len + 1 + 3) & !3
}

/// Reads a NUL-terminated string starting at `pos`; returns it and the offset
/// of the next field (past terminator and padding).
fn read_str(buf: &[u8], pos: usize) -> Option<(&str, usize)> {
    let rest = buf.get(pos..)?;
    let nul = rest.iter().position(|&b| b == 0)?;
    let s = std::str::from_utf8(&rest[..nul]).ok()?;
    Some((s, pos + padded_len(nul)))
}

fn read_u32(buf: &[u8], pos: usize) -> Option<u32> {
    let end = pos.checked_add(4)?;
    let bytes: [u8; 4] = buf.get(pos..end)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

fn read_i32(buf: &[u8], pos: usize) -> Option<i32> {
    read_u32(buf, pos).map(|v| v as i32)
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a single message.
pub fn encode_message(address: &str, args: &[OscArg]) -> Vec<u8> {
    let mut out = Vec::with_capacity(padded_len(address.len()) + padded_len(args.len() + 1) + args.len() * 8);
    write_str(&mut out, address);

    let mut tags = String::with_capacity(args.len() + 1);
    tags.push(',');
    tags.extend(args.iter().map(|a| a.tag() as char));
    write_str(&mut out, &tags);

    for arg in args {
        match arg {
            OscArg::Float(f) => out.extend_from_slice(&f.to_bits().to_be_bytes()),
            OscArg::Int(i) => out.extend_from_slice(&i.to_be_bytes()),
            OscArg::Str(s) => write_str(&mut out, s),
        }
    }
    out
}

/// Wrap already-encoded elements (messages or bundles) into a bundle.
pub fn encode_bundle(elements: &[Vec<u8>]) -> Vec<u8> {
    let body: usize = elements.iter().map(|e| e.len() + 4).sum();
    let mut out = Vec::with_capacity(BUNDLE_HEADER_LEN + body);
    out.extend_from_slice(BUNDLE_TAG);
    out.extend_from_slice(&TIMETAG_IMMEDIATE.to_be_bytes());
    for element in elements {
        out.extend_from_slice(&(element.len() as i32).to_be_bytes());
        out.extend_from_slice(element);
    }
    out
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    let pad = padded_len(s.len()) - s.len();
    out.extend(std::iter::repeat_n(0u8, pad));
}
