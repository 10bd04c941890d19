//! Deterministic save-state serialization.
//!
//! Components implement [`SyncState`] once. The same `sync_state` walk is
//! used for saving and loading: a [`Serializer`] in a writer mode records
//! each field, a reader mode overwrites each field in place. Because the walk
//! order is fixed by code, the field order is part of the layout version.
//!
//! Two encodings carry the same named fields:
//!
//! - **Binary**: header (`magic`, system id, version) followed by a tag
//!   stream. Each field is `kind, name, payload`; sections are bracketed by
//!   begin/end markers. Names and kinds are checked on read, so a stream
//!   produced by a different layout is rejected instead of misread.
//! - **Text**: a pretty-printed JSON document. Sections become nested
//!   objects, byte arrays become lowercase hex strings.
//!
//! Derived data (lookup tables, decoded caches, rendered frames) must not be
//! synced. Owners rebuild it after a load.

use serde_json::{Map, Value};

const MAGIC: &[u8; 4] = b"EMST";
const TEXT_FORMAT: &str = "emu-state";

const TAG_BEGIN: u8 = 0xB0;
const TAG_END: u8 = 0xE0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("not a save state (bad magic)")]
    BadMagic,
    #[error("save state is for system '{found}', expected '{expected}'")]
    WrongSystem { expected: String, found: String },
    #[error("save state version {found} does not match supported version {expected}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("save state truncated while reading '{0}'")]
    Truncated(String),
    #[error("expected field '{expected}', found '{found}'")]
    FieldMismatch { expected: String, found: String },
    #[error("field '{0}' has the wrong type")]
    TypeMismatch(String),
    #[error("field '{field}' has length {found}, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },
    #[error("value of field '{0}' is out of range")]
    InvalidValue(String),
    #[error("{0} trailing bytes after the end of the state")]
    TrailingData(usize),
    #[error("malformed text state: {0}")]
    Text(String),
}

/// Encoding of a serialized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFormat {
    Binary,
    Text,
}

/// Implemented by every component that owns canonical emulation state.
pub trait SyncState {
    fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Kind {
    U8 = 1,
    U16 = 2,
    U32 = 3,
    U64 = 4,
    I32 = 5,
    Bool = 6,
    Bytes = 7,
    Words = 8,
}

enum Mode<'a> {
    BinaryWrite {
        out: Vec<u8>,
    },
    BinaryRead {
        data: &'a [u8],
        pos: usize,
    },
    TextWrite {
        header: Map<String, Value>,
        stack: Vec<(String, Map<String, Value>)>,
    },
    TextRead {
        stack: Vec<Map<String, Value>>,
    },
}

/// Bidirectional field walker. See the module docs.
pub struct Serializer<'a> {
    mode: Mode<'a>,
}

impl<'a> Serializer<'a> {
    /// Start writing a state for `system` with layout `version`.
    pub fn writer(format: StateFormat, system: &str, version: u32) -> Self {
        let mode = match format {
            StateFormat::Binary => {
                let mut out = Vec::with_capacity(64 * 1024);
                out.extend_from_slice(MAGIC);
                out.push(system.len() as u8);
                out.extend_from_slice(system.as_bytes());
                out.extend_from_slice(&version.to_le_bytes());
                Mode::BinaryWrite { out }
            }
            StateFormat::Text => {
                let mut header = Map::new();
                header.insert("format".into(), Value::from(TEXT_FORMAT));
                header.insert("system".into(), Value::from(system));
                header.insert("version".into(), Value::from(version));
                Mode::TextWrite {
                    header,
                    stack: vec![(String::new(), Map::new())],
                }
            }
        };
        Self { mode }
    }

    /// Open a binary state, validating the header before anything is read.
    pub fn binary_reader(data: &'a [u8], system: &str, version: u32) -> Result<Self, StateError> {
        if data.len() < 5 || &data[..4] != MAGIC {
            return Err(StateError::BadMagic);
        }
        let name_len = data[4] as usize;
        let header_len = 5 + name_len + 4;
        if data.len() < header_len {
            return Err(StateError::Truncated("header".into()));
        }
        let found_system = String::from_utf8_lossy(&data[5..5 + name_len]).into_owned();
        if found_system != system {
            return Err(StateError::WrongSystem {
                expected: system.into(),
                found: found_system,
            });
        }
        let mut v = [0u8; 4];
        v.copy_from_slice(&data[5 + name_len..header_len]);
        let found = u32::from_le_bytes(v);
        if found != version {
            return Err(StateError::VersionMismatch {
                expected: version,
                found,
            });
        }
        Ok(Self {
            mode: Mode::BinaryRead {
                data,
                pos: header_len,
            },
        })
    }

    /// Open a text state, validating the header before anything is read.
    pub fn text_reader(text: &str, system: &str, version: u32) -> Result<Self, StateError> {
        let root: Value =
            serde_json::from_str(text).map_err(|e| StateError::Text(e.to_string()))?;
        let Value::Object(mut root) = root else {
            return Err(StateError::Text("top level is not an object".into()));
        };
        if root.get("format").and_then(Value::as_str) != Some(TEXT_FORMAT) {
            return Err(StateError::BadMagic);
        }
        let found_system = root
            .get("system")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if found_system != system {
            return Err(StateError::WrongSystem {
                expected: system.into(),
                found: found_system,
            });
        }
        let found = root
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| StateError::Text("missing version".into()))?;
        if found != u64::from(version) {
            return Err(StateError::VersionMismatch {
                expected: version,
                found: u32::try_from(found).unwrap_or(u32::MAX),
            });
        }
        let Some(Value::Object(state)) = root.remove("state") else {
            return Err(StateError::Text("missing state object".into()));
        };
        Ok(Self {
            mode: Mode::TextRead { stack: vec![state] },
        })
    }

    pub fn is_reader(&self) -> bool {
        matches!(self.mode, Mode::BinaryRead { .. } | Mode::TextRead { .. })
    }

    pub fn is_writer(&self) -> bool {
        !self.is_reader()
    }

    pub fn begin_section(&mut self, name: &str) -> Result<(), StateError> {
        match &mut self.mode {
            Mode::BinaryWrite { out } => {
                out.push(TAG_BEGIN);
                put_name(out, name);
                Ok(())
            }
            Mode::BinaryRead { data, pos } => {
                expect_tag(data, pos, TAG_BEGIN, name)?;
                expect_name(data, pos, name)
            }
            Mode::TextWrite { stack, .. } => {
                stack.push((name.to_string(), Map::new()));
                Ok(())
            }
            Mode::TextRead { stack } => {
                let current = stack.last().ok_or_else(|| StateError::Text("unbalanced".into()))?;
                match current.get(name) {
                    Some(Value::Object(child)) => {
                        let child = child.clone();
                        stack.push(child);
                        Ok(())
                    }
                    Some(_) => Err(StateError::TypeMismatch(name.into())),
                    None => Err(StateError::FieldMismatch {
                        expected: name.into(),
                        found: String::new(),
                    }),
                }
            }
        }
    }

    pub fn end_section(&mut self, name: &str) -> Result<(), StateError> {
        match &mut self.mode {
            Mode::BinaryWrite { out } => {
                out.push(TAG_END);
                put_name(out, name);
                Ok(())
            }
            Mode::BinaryRead { data, pos } => {
                expect_tag(data, pos, TAG_END, name)?;
                expect_name(data, pos, name)
            }
            Mode::TextWrite { stack, .. } => {
                if stack.len() < 2 {
                    return Err(StateError::Text(format!("section '{name}' not open")));
                }
                let (child_name, child) = stack.pop().unwrap_or_default();
                if child_name != name {
                    return Err(StateError::FieldMismatch {
                        expected: name.into(),
                        found: child_name,
                    });
                }
                if let Some((_, parent)) = stack.last_mut() {
                    parent.insert(child_name, Value::Object(child));
                }
                Ok(())
            }
            Mode::TextRead { stack } => {
                if stack.len() < 2 {
                    return Err(StateError::Text(format!("section '{name}' not open")));
                }
                stack.pop();
                Ok(())
            }
        }
    }

    fn write_scalar(&mut self, kind: Kind, name: &str, value: u64) {
        match &mut self.mode {
            Mode::BinaryWrite { out } => {
                out.push(kind as u8);
                put_name(out, name);
                match kind {
                    Kind::U8 | Kind::Bool => out.push(value as u8),
                    Kind::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
                    Kind::U32 | Kind::I32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
                    _ => out.extend_from_slice(&value.to_le_bytes()),
                }
            }
            Mode::TextWrite { stack, .. } => {
                let json = match kind {
                    Kind::Bool => Value::Bool(value != 0),
                    Kind::I32 => Value::from(value as u32 as i32),
                    _ => Value::from(value),
                };
                if let Some((_, map)) = stack.last_mut() {
                    map.insert(name.to_string(), json);
                }
            }
            _ => {}
        }
    }

    fn read_scalar(&mut self, kind: Kind, name: &str) -> Result<u64, StateError> {
        match &mut self.mode {
            Mode::BinaryRead { data, pos } => {
                expect_tag(data, pos, kind as u8, name)?;
                expect_name(data, pos, name)?;
                let width = match kind {
                    Kind::U8 | Kind::Bool => 1,
                    Kind::U16 => 2,
                    Kind::U32 | Kind::I32 => 4,
                    _ => 8,
                };
                let bytes = take(data, pos, width, name)?;
                let mut buf = [0u8; 8];
                buf[..width].copy_from_slice(bytes);
                Ok(u64::from_le_bytes(buf))
            }
            Mode::TextRead { stack } => {
                let value = lookup(stack, name)?;
                match kind {
                    Kind::Bool => value
                        .as_bool()
                        .map(u64::from)
                        .ok_or_else(|| StateError::TypeMismatch(name.into())),
                    Kind::I32 => value
                        .as_i64()
                        .and_then(|v| i32::try_from(v).ok())
                        .map(|v| u64::from(v as u32))
                        .ok_or_else(|| StateError::TypeMismatch(name.into())),
                    _ => value
                        .as_u64()
                        .ok_or_else(|| StateError::TypeMismatch(name.into())),
                }
            }
            _ => Err(StateError::Text("serializer is not reading".into())),
        }
    }

    pub fn sync_u8(&mut self, name: &str, v: &mut u8) -> Result<(), StateError> {
        if self.is_reader() {
            let raw = self.read_scalar(Kind::U8, name)?;
            *v = u8::try_from(raw).map_err(|_| StateError::InvalidValue(name.into()))?;
        } else {
            self.write_scalar(Kind::U8, name, u64::from(*v));
        }
        Ok(())
    }

    pub fn sync_u16(&mut self, name: &str, v: &mut u16) -> Result<(), StateError> {
        if self.is_reader() {
            let raw = self.read_scalar(Kind::U16, name)?;
            *v = u16::try_from(raw).map_err(|_| StateError::InvalidValue(name.into()))?;
        } else {
            self.write_scalar(Kind::U16, name, u64::from(*v));
        }
        Ok(())
    }

    pub fn sync_u32(&mut self, name: &str, v: &mut u32) -> Result<(), StateError> {
        if self.is_reader() {
            let raw = self.read_scalar(Kind::U32, name)?;
            *v = u32::try_from(raw).map_err(|_| StateError::InvalidValue(name.into()))?;
        } else {
            self.write_scalar(Kind::U32, name, u64::from(*v));
        }
        Ok(())
    }

    pub fn sync_u64(&mut self, name: &str, v: &mut u64) -> Result<(), StateError> {
        if self.is_reader() {
            *v = self.read_scalar(Kind::U64, name)?;
        } else {
            self.write_scalar(Kind::U64, name, *v);
        }
        Ok(())
    }

    pub fn sync_i32(&mut self, name: &str, v: &mut i32) -> Result<(), StateError> {
        if self.is_reader() {
            *v = self.read_scalar(Kind::I32, name)? as u32 as i32;
        } else {
            self.write_scalar(Kind::I32, name, u64::from(*v as u32));
        }
        Ok(())
    }

    pub fn sync_bool(&mut self, name: &str, v: &mut bool) -> Result<(), StateError> {
        if self.is_reader() {
            *v = self.read_scalar(Kind::Bool, name)? != 0;
        } else {
            self.write_scalar(Kind::Bool, name, u64::from(*v));
        }
        Ok(())
    }

    /// Fixed-size byte array. On load the stored length must match.
    pub fn sync_bytes(&mut self, name: &str, v: &mut [u8]) -> Result<(), StateError> {
        if self.is_reader() {
            let data = self.read_blob(Kind::Bytes, name)?;
            if data.len() != v.len() {
                return Err(StateError::LengthMismatch {
                    field: name.into(),
                    expected: v.len(),
                    found: data.len(),
                });
            }
            v.copy_from_slice(&data);
        } else {
            self.write_blob(Kind::Bytes, name, v);
        }
        Ok(())
    }

    /// Variable-size byte buffer; replaced wholesale on load.
    pub fn sync_byte_vec(&mut self, name: &str, v: &mut Vec<u8>) -> Result<(), StateError> {
        if self.is_reader() {
            *v = self.read_blob(Kind::Bytes, name)?;
        } else {
            self.write_blob(Kind::Bytes, name, v);
        }
        Ok(())
    }

    /// Fixed-size `u16` array, stored little-endian.
    pub fn sync_words(&mut self, name: &str, v: &mut [u16]) -> Result<(), StateError> {
        if self.is_reader() {
            let data = self.read_blob(Kind::Words, name)?;
            if data.len() != v.len() * 2 {
                return Err(StateError::LengthMismatch {
                    field: name.into(),
                    expected: v.len(),
                    found: data.len() / 2,
                });
            }
            for (word, pair) in v.iter_mut().zip(data.chunks_exact(2)) {
                *word = u16::from_le_bytes([pair[0], pair[1]]);
            }
        } else {
            let bytes: Vec<u8> = v.iter().flat_map(|w| w.to_le_bytes()).collect();
            self.write_blob(Kind::Words, name, &bytes);
        }
        Ok(())
    }

    fn write_blob(&mut self, kind: Kind, name: &str, bytes: &[u8]) {
        match &mut self.mode {
            Mode::BinaryWrite { out } => {
                out.push(kind as u8);
                put_name(out, name);
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
            Mode::TextWrite { stack, .. } => {
                if let Some((_, map)) = stack.last_mut() {
                    map.insert(name.to_string(), Value::String(to_hex(bytes)));
                }
            }
            _ => {}
        }
    }

    fn read_blob(&mut self, kind: Kind, name: &str) -> Result<Vec<u8>, StateError> {
        match &mut self.mode {
            Mode::BinaryRead { data, pos } => {
                expect_tag(data, pos, kind as u8, name)?;
                expect_name(data, pos, name)?;
                let len_bytes = take(data, pos, 4, name)?;
                let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
                Ok(take(data, pos, len as usize, name)?.to_vec())
            }
            Mode::TextRead { stack } => {
                let value = lookup(stack, name)?;
                let text = value
                    .as_str()
                    .ok_or_else(|| StateError::TypeMismatch(name.into()))?;
                from_hex(text).ok_or_else(|| StateError::InvalidValue(name.into()))
            }
            _ => Err(StateError::Text("serializer is not reading".into())),
        }
    }

    /// Finish writing and return the encoded state. Text states are UTF-8 JSON.
    pub fn into_bytes(self) -> Result<Vec<u8>, StateError> {
        match self.mode {
            Mode::BinaryWrite { out } => Ok(out),
            Mode::TextWrite { mut header, mut stack } => {
                if stack.len() != 1 {
                    return Err(StateError::Text("unclosed section".into()));
                }
                let (_, root) = stack.pop().unwrap_or_default();
                header.insert("state".into(), Value::Object(root));
                serde_json::to_vec_pretty(&Value::Object(header))
                    .map_err(|e| StateError::Text(e.to_string()))
            }
            _ => Err(StateError::Text("serializer is not writing".into())),
        }
    }

    /// Finish reading. Binary states must be consumed exactly.
    pub fn finish(self) -> Result<(), StateError> {
        match self.mode {
            Mode::BinaryRead { data, pos } if pos != data.len() => {
                Err(StateError::TrailingData(data.len() - pos))
            }
            Mode::TextRead { stack } if stack.len() != 1 => {
                Err(StateError::Text("unclosed section".into()))
            }
            _ => Ok(()),
        }
    }
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
}

fn take<'d>(data: &'d [u8], pos: &mut usize, len: usize, name: &str) -> Result<&'d [u8], StateError> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| StateError::Truncated(name.into()))?;
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}

fn expect_tag(data: &[u8], pos: &mut usize, tag: u8, name: &str) -> Result<(), StateError> {
    let found = take(data, pos, 1, name)?[0];
    if found != tag {
        return Err(StateError::TypeMismatch(name.into()));
    }
    Ok(())
}

fn expect_name(data: &[u8], pos: &mut usize, name: &str) -> Result<(), StateError> {
    let len = take(data, pos, 1, name)?[0] as usize;
    let found = take(data, pos, len, name)?;
    if found != name.as_bytes() {
        return Err(StateError::FieldMismatch {
            expected: name.into(),
            found: String::from_utf8_lossy(found).into_owned(),
        });
    }
    Ok(())
}

fn lookup<'m>(stack: &'m [Map<String, Value>], name: &str) -> Result<&'m Value, StateError> {
    stack
        .last()
        .and_then(|map| map.get(name))
        .ok_or_else(|| StateError::FieldMismatch {
            expected: name.into(),
            found: String::new(),
        })
}

fn to_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push(DIGITS[(b >> 4) as usize] as char);
        s.push(DIGITS[(b & 0x0F) as usize] as char);
    }
    s
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    text.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Widget {
        level: u8,
        addr: u16,
        counter: u32,
        cycles: u64,
        delta: i32,
        enabled: bool,
        ram: [u8; 8],
        trace: Vec<u8>,
        pixels: [u16; 3],
    }

    impl SyncState for Widget {
        fn sync_state(&mut self, s: &mut Serializer<'_>) -> Result<(), StateError> {
            s.begin_section("Widget")?;
            s.sync_u8("level", &mut self.level)?;
            s.sync_u16("addr", &mut self.addr)?;
            s.sync_u32("counter", &mut self.counter)?;
            s.sync_u64("cycles", &mut self.cycles)?;
            s.sync_i32("delta", &mut self.delta)?;
            s.sync_bool("enabled", &mut self.enabled)?;
            s.sync_bytes("ram", &mut self.ram)?;
            s.sync_byte_vec("trace", &mut self.trace)?;
            s.sync_words("pixels", &mut self.pixels)?;
            s.end_section("Widget")
        }
    }

    fn sample() -> Widget {
        Widget {
            level: 0x7F,
            addr: 0xFFFC,
            counter: 514,
            cycles: 1 << 40,
            delta: -1234,
            enabled: true,
            ram: [1, 2, 3, 4, 5, 6, 7, 8],
            trace: vec![0xDE, 0xAD],
            pixels: [0x1FF, 0, 0x3F],
        }
    }

    fn save(w: &mut Widget, format: StateFormat) -> Vec<u8> {
        let mut s = Serializer::writer(format, "test", 3);
        w.sync_state(&mut s).unwrap();
        s.into_bytes().unwrap()
    }

    #[test]
    fn test_binary_and_text_carry_same_content() {
        let mut original = sample();
        let binary = save(&mut original, StateFormat::Binary);
        let text = save(&mut original, StateFormat::Text);

        let mut from_binary = Widget::default();
        let mut s = Serializer::binary_reader(&binary, "test", 3).unwrap();
        from_binary.sync_state(&mut s).unwrap();
        s.finish().unwrap();

        let mut from_text = Widget::default();
        let text = String::from_utf8(text).unwrap();
        let mut s = Serializer::text_reader(&text, "test", 3).unwrap();
        from_text.sync_state(&mut s).unwrap();
        s.finish().unwrap();

        assert_eq!(from_binary, original);
        assert_eq!(from_text, original);
    }

    #[test]
    fn test_version_mismatch_rejected_before_reading() {
        let blob = save(&mut sample(), StateFormat::Binary);
        let err = Serializer::binary_reader(&blob, "test", 4).err();
        assert_eq!(
            err,
            Some(StateError::VersionMismatch {
                expected: 4,
                found: 3
            })
        );

        let text = String::from_utf8(save(&mut sample(), StateFormat::Text)).unwrap();
        assert!(matches!(
            Serializer::text_reader(&text, "test", 2),
            Err(StateError::VersionMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_wrong_system_and_bad_magic() {
        let blob = save(&mut sample(), StateFormat::Binary);
        assert!(matches!(
            Serializer::binary_reader(&blob, "other", 3),
            Err(StateError::WrongSystem { .. })
        ));
        assert_eq!(
            Serializer::binary_reader(b"nope", "test", 3).err(),
            Some(StateError::BadMagic)
        );
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let blob = save(&mut sample(), StateFormat::Binary);
        let cut = &blob[..blob.len() - 3];
        let mut w = Widget::default();
        let mut s = Serializer::binary_reader(cut, "test", 3).unwrap();
        assert!(matches!(w.sync_state(&mut s), Err(StateError::Truncated(_))));
    }

    #[test]
    fn test_fixed_length_mismatch() {
        let mut blob = Serializer::writer(StateFormat::Binary, "test", 1);
        blob.sync_bytes("ram", &mut [0u8; 4]).unwrap();
        let blob = blob.into_bytes().unwrap();

        let mut s = Serializer::binary_reader(&blob, "test", 1).unwrap();
        let err = s.sync_bytes("ram", &mut [0u8; 8]).unwrap_err();
        assert_eq!(
            err,
            StateError::LengthMismatch {
                field: "ram".into(),
                expected: 8,
                found: 4
            }
        );
    }

    #[test]
    fn test_field_name_checked() {
        let mut w = Serializer::writer(StateFormat::Binary, "test", 1);
        w.sync_u8("a", &mut 5).unwrap();
        let blob = w.into_bytes().unwrap();
        let mut r = Serializer::binary_reader(&blob, "test", 1).unwrap();
        assert!(matches!(
            r.sync_u8("b", &mut 0),
            Err(StateError::FieldMismatch { .. })
        ));
    }

    #[test]
    fn test_trailing_data_detected() {
        let mut blob = save(&mut sample(), StateFormat::Binary);
        blob.push(0);
        let mut w = Widget::default();
        let mut s = Serializer::binary_reader(&blob, "test", 3).unwrap();
        w.sync_state(&mut s).unwrap();
        assert_eq!(s.finish(), Err(StateError::TrailingData(1)));
    }

    #[test]
    fn test_text_layout_is_nested() {
        let text = save(&mut sample(), StateFormat::Text);
        let v: Value = serde_json::from_slice(&text).unwrap();
        assert_eq!(v["version"], 3);
        assert_eq!(v["state"]["Widget"]["counter"], 514);
        assert_eq!(v["state"]["Widget"]["ram"], "0102030405060708");
        assert_eq!(v["state"]["Widget"]["delta"], -1234);
    }

    proptest! {
        #[test]
        fn prop_encodings_agree(level: u8, counter: u32, cycles: u64, delta: i32, trace in proptest::collection::vec(any::<u8>(), 0..32)) {
            let mut w = Widget { level, counter, cycles, delta, trace, ..Widget::default() };
            let text = String::from_utf8(save(&mut w, StateFormat::Text)).unwrap();
            let mut via_text = Widget::default();
            let mut s = Serializer::text_reader(&text, "test", 3).unwrap();
            via_text.sync_state(&mut s).unwrap();
            prop_assert_eq!(&via_text, &w);
            let binary = save(&mut via_text, StateFormat::Binary);
            prop_assert_eq!(binary, save(&mut w, StateFormat::Binary));
        }
    }
}
