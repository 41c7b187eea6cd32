//! Wire-format helpers: integrity suffix handling, typed argument
//! conversion, and the bounded dot-separated index-list grammar.
//!
//! Message shape: `key[=arg0,arg1,...][:checksum]` terminated by a
//! newline. The checksum is the 8-bit additive sum of the payload bytes
//! before the `:`, rendered in decimal.

use crate::board::MAX_PINS;
use crate::counters::MAX_SLOTS;

/// Scratch capacity for decoded index lists; sized to the larger of the
/// pin count and slot count. Longer inputs are silently truncated.
pub const LIST_CAPACITY: usize = if MAX_PINS > MAX_SLOTS { MAX_PINS } else { MAX_SLOTS };

pub fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0u8, |sum, b| sum.wrapping_add(b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    /// No suffix present; replies carry none either.
    Absent,
    /// Suffix present and correct; replies echo a matching suffix.
    Valid,
    /// Suffix present but wrong; the whole message is dropped.
    Invalid,
}

/// Split a frame into payload and integrity verdict. A trailing `:n`
/// counts as a suffix only when `n` parses as a decimal byte; any other
/// colon (e.g. inside a host:port parameter) stays part of the payload.
pub fn split_integrity(frame: &str) -> (&str, Integrity) {
    if let Some((payload, tail)) = frame.rsplit_once(':') {
        if let Ok(sum) = tail.trim().parse::<u8>() {
            let verdict = if sum == checksum(payload) {
                Integrity::Valid
            } else {
                Integrity::Invalid
            };
            return (payload, verdict);
        }
    }
    (frame, Integrity::Absent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Bool,
    U8,
    U16,
    U32,
    I32,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    I32(i32),
    Str(String),
}

impl ArgValue {
    // Shape is validated before a handler runs, so the mismatch arms are
    // unreachable; they default rather than panic.
    pub fn as_bool(&self) -> bool {
        match self {
            ArgValue::Bool(v) => *v,
            _ => false,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ArgValue::U8(v) => *v,
            _ => 0,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            ArgValue::U32(v) => *v,
            ArgValue::U16(v) => u32::from(*v),
            ArgValue::U8(v) => u32::from(*v),
            _ => 0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ArgValue::Str(v) => v,
            _ => "",
        }
    }
}

fn convert(token: &str, kind: ArgKind) -> Option<ArgValue> {
    let token = token.trim();
    match kind {
        ArgKind::Bool => token.parse::<u8>().ok().map(|v| ArgValue::Bool(v != 0)),
        ArgKind::U8 => token.parse().ok().map(ArgValue::U8),
        ArgKind::U16 => token.parse().ok().map(ArgValue::U16),
        ArgKind::U32 => token.parse().ok().map(ArgValue::U32),
        ArgKind::I32 => token.parse().ok().map(ArgValue::I32),
        ArgKind::Str => Some(ArgValue::Str(token.to_string())),
    }
}

/// Tokenize the argument tail of a message and convert each token to the
/// declared primitive. Fails (returns `None`, arity mismatch) unless the
/// converted count equals the declared arity. A trailing `Str` argument
/// absorbs the rest of the line verbatim, commas included.
pub fn parse_args(rest: &str, shape: &[ArgKind]) -> Option<Vec<ArgValue>> {
    if shape.is_empty() {
        return rest.is_empty().then(Vec::new);
    }
    if rest.is_empty() {
        return None;
    }
    let mut values = Vec::with_capacity(shape.len());
    let mut tokens = rest.splitn(shape.len(), ',');
    for &kind in shape {
        let token = tokens.next()?;
        values.push(convert(token, kind)?);
    }
    Some(values)
}

/// Decode a dot-separated index list (`"0-3.7.9"`) into a bounded,
/// ascending, deduplicated set. A token is a single index or an `a-b`
/// range; `a-` runs through `last_valid`. Malformed tokens and indices
/// past `last_valid` are skipped; overflow past [`LIST_CAPACITY`] is
/// silently truncated.
pub fn parse_index_list(text: &str, last_valid: u8) -> Vec<u8> {
    let mut indices: Vec<u8> = Vec::with_capacity(LIST_CAPACITY);
    let mut push = |idx: u8| {
        if idx <= last_valid && indices.len() < LIST_CAPACITY && !indices.contains(&idx) {
            indices.push(idx);
        }
    };
    for token in text.split('.') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = token.split_once('-') {
            let Ok(lo) = lo.trim().parse::<u8>() else {
                continue;
            };
            let hi = match hi.trim() {
                "" => last_valid,
                text => match text.parse::<u8>() {
                    Ok(hi) => hi.min(last_valid),
                    Err(_) => continue,
                },
            };
            for idx in lo..=hi {
                push(idx);
            }
        } else if let Ok(idx) = token.parse::<u8>() {
            push(idx);
        }
    }
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_additive_sum() {
        assert_eq!(checksum(""), 0);
        assert_eq!(checksum("ab"), b'a'.wrapping_add(b'b'));
    }

    #[test]
    fn integrity_split_verdicts() {
        let payload = "spm=3,1";
        let good = format!("{}:{}", payload, checksum(payload));
        assert_eq!(split_integrity(&good), (payload, Integrity::Valid));
        let bad = format!("{payload}:7");
        assert_eq!(split_integrity(&bad).1, Integrity::Invalid);
        assert_eq!(split_integrity(payload), (payload, Integrity::Absent));
    }

    #[test]
    fn non_numeric_colon_tail_is_payload() {
        let (payload, verdict) = split_integrity("scp=2,10.0.0.1:8266");
        assert_eq!(payload, "scp=2,10.0.0.1:8266");
        assert_eq!(verdict, Integrity::Absent);
    }

    #[test]
    fn parse_args_enforces_arity() {
        let shape = &[ArgKind::U8, ArgKind::U8];
        assert!(parse_args("3,1", shape).is_some());
        assert!(parse_args("3", shape).is_none());
        assert!(parse_args("3,1,2", shape).is_none());
        assert!(parse_args("3,x", shape).is_none());
        assert!(parse_args("", &[]).is_some());
        assert!(parse_args("1", &[]).is_none());
    }

    #[test]
    fn trailing_str_absorbs_commas() {
        let shape = &[ArgKind::U8, ArgKind::Str];
        let args = parse_args("1,9600,8N1", shape).unwrap();
        assert_eq!(args[1].as_str(), "9600,8N1");
    }

    #[test]
    fn index_list_ranges_and_singles() {
        assert_eq!(parse_index_list("0-2.5", 9), vec![0, 1, 2, 5]);
        assert_eq!(parse_index_list("7-", 9), vec![7, 8, 9]);
        assert_eq!(parse_index_list("5.1.5.3", 9), vec![1, 3, 5]);
        assert_eq!(parse_index_list("4-2.junk.30", 9), Vec::<u8>::new());
    }

    #[test]
    fn index_list_truncates_at_capacity() {
        let decoded = parse_index_list("0-", (LIST_CAPACITY as u8) + 10);
        assert_eq!(decoded.len(), LIST_CAPACITY);
    }
}
