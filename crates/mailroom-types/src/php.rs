//! PHP `serialize()` format.
//!
//! Used for the legacy `.php` responses and for the settings blobs the host
//! system stores per user. PHP arrays map to JSON objects in both
//! directions, keeping key order. Keys in canonical decimal form are written
//! as integer keys.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::charset;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnserializeError {
    #[error("unexpected end of input")]
    Truncated,

    #[error("expected '{expected}' at offset {at}")]
    Expected { expected: char, at: usize },

    #[error("invalid number at offset {0}")]
    Number(usize),

    #[error("unsupported value type '{tag}' at offset {at}")]
    Unsupported { tag: char, at: usize },

    #[error("trailing data at offset {0}")]
    Trailing(usize),
}

/// Serialize for output that is sent as Windows-1252, where every char is
/// one byte, so string lengths are char counts.
pub fn serialize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, Lengths::Chars);
    out
}

/// Serialize for output kept as UTF-8. String lengths are byte counts.
pub fn serialize_utf8(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, Lengths::Bytes);
    out
}

/// Parse serialized bytes. String lengths are byte counts, and every string
/// is decoded on its own with [`charset::decode`].
pub fn unserialize(input: &[u8]) -> Result<Value, UnserializeError> {
    let mut parser = Parser { input, pos: 0 };
    let value = parser.value()?;
    if parser.pos != input.len() {
        return Err(UnserializeError::Trailing(parser.pos));
    }
    Ok(value)
}

// -- Writing --

#[derive(Clone, Copy)]
enum Lengths {
    Chars,
    Bytes,
}

fn write_value(out: &mut String, value: &Value, lengths: Lengths) {
    match value {
        Value::Null => out.push_str("N;"),
        Value::Bool(b) => out.push_str(&format!("b:{};", u8::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => out.push_str(&format!("i:{};", i)),
            // u64 beyond i64::MAX overflows to float, as PHP does.
            None => out.push_str(&format!("d:{};", n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => write_string(out, s, lengths),
        Value::Array(items) => {
            out.push_str(&format!("a:{}:{{", items.len()));
            for (idx, item) in items.iter().enumerate() {
                out.push_str(&format!("i:{};", idx));
                write_value(out, item, lengths);
            }
            out.push('}');
        }
        Value::Object(map) => write_map(out, map, lengths),
    }
}

fn write_map(out: &mut String, map: &Map<String, Value>, lengths: Lengths) {
    out.push_str(&format!("a:{}:{{", map.len()));
    for (key, item) in map {
        match integer_key(key) {
            Some(i) => out.push_str(&format!("i:{};", i)),
            None => write_string(out, key, lengths),
        }
        write_value(out, item, lengths);
    }
    out.push('}');
}

fn write_string(out: &mut String, s: &str, lengths: Lengths) {
    let len = match lengths {
        Lengths::Chars => s.chars().count(),
        Lengths::Bytes => s.len(),
    };
    out.push_str(&format!("s:{}:\"{}\";", len, s));
}

/// "7" and "-3" are integer keys, "07" and "+3" are not.
fn integer_key(key: &str) -> Option<i64> {
    let n: i64 = key.parse().ok()?;
    (n.to_string() == key).then_some(n)
}

// -- Reading --

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> Result<u8, UnserializeError> {
        let b = *self.input.get(self.pos).ok_or(UnserializeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, expected: u8) -> Result<(), UnserializeError> {
        let at = self.pos;
        if self.next()? != expected {
            return Err(UnserializeError::Expected { expected: char::from(expected), at });
        }
        Ok(())
    }

    /// Bytes up to `end`, which is consumed.
    fn until(&mut self, end: u8) -> Result<&'a [u8], UnserializeError> {
        let rest = &self.input[self.pos..];
        let len = rest.iter().position(|&b| b == end).ok_or(UnserializeError::Truncated)?;
        self.pos += len + 1;
        Ok(&rest[..len])
    }

    fn number_until<T: std::str::FromStr>(&mut self, end: u8) -> Result<T, UnserializeError> {
        let at = self.pos;
        let raw = self.until(end)?;
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(UnserializeError::Number(at))
    }

    fn value(&mut self) -> Result<Value, UnserializeError> {
        let at = self.pos;
        let tag = self.next()?;
        if tag == b'N' {
            self.expect(b';')?;
            return Ok(Value::Null);
        }
        self.expect(b':')?;

        match tag {
            b'b' => match self.number_until::<u8>(b';')? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                _ => Err(UnserializeError::Number(at + 2)),
            },
            b'i' => Ok(Value::from(self.number_until::<i64>(b';')?)),
            b'd' => {
                let d: f64 = self.number_until(b';')?;
                Number::from_f64(d).map(Value::Number).ok_or(UnserializeError::Number(at + 2))
            }
            b's' => {
                let s = self.string()?;
                self.expect(b';')?;
                Ok(Value::String(s))
            }
            b'a' => {
                let len: usize = self.number_until(b':')?;
                self.expect(b'{')?;
                let mut map = Map::new();
                for _ in 0..len {
                    let key = self.key()?;
                    let item = self.value()?;
                    map.insert(key, item);
                }
                self.expect(b'}')?;
                Ok(Value::Object(map))
            }
            other => Err(UnserializeError::Unsupported { tag: char::from(other), at }),
        }
    }

    /// The `<len>:"<bytes>"` part of a string.
    fn string(&mut self) -> Result<String, UnserializeError> {
        let len: usize = self.number_until(b':')?;
        self.expect(b'"')?;
        let end = self.pos.checked_add(len).ok_or(UnserializeError::Truncated)?;
        let bytes = self.input.get(self.pos..end).ok_or(UnserializeError::Truncated)?;
        self.pos = end;
        self.expect(b'"')?;
        Ok(charset::decode(bytes).into_owned())
    }

    fn key(&mut self) -> Result<String, UnserializeError> {
        let at = self.pos;
        match self.next()? {
            b'i' => {
                self.expect(b':')?;
                Ok(self.number_until::<i64>(b';')?.to_string())
            }
            b's' => {
                self.expect(b':')?;
                let key = self.string()?;
                self.expect(b';')?;
                Ok(key)
            }
            other => Err(UnserializeError::Unsupported { tag: char::from(other), at }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(serialize(&Value::Null), "N;");
        assert_eq!(serialize(&json!(true)), "b:1;");
        assert_eq!(serialize(&json!(false)), "b:0;");
        assert_eq!(serialize(&json!(-42)), "i:-42;");
        assert_eq!(serialize(&json!(0.5)), "d:0.5;");
        assert_eq!(serialize(&json!("Grüße")), "s:5:\"Grüße\";");
        assert_eq!(serialize_utf8(&json!("Grüße")), "s:7:\"Grüße\";");
    }

    #[test]
    fn folder_map_uses_integer_keys() {
        let value = json!({ "folders": { "0": "Posteingang", "1": "projects" } });
        assert_eq!(
            serialize(&value),
            "a:1:{s:7:\"folders\";a:2:{i:0;s:11:\"Posteingang\";i:1;s:8:\"projects\";}}"
        );
    }

    #[test]
    fn lists_are_indexed() {
        assert_eq!(serialize(&json!(["a", null])), "a:2:{i:0;s:1:\"a\";i:1;N;}");
        assert_eq!(serialize(&json!({ "07": 1 })), "a:1:{s:2:\"07\";i:1;}");
    }

    #[test]
    fn reads_host_settings() {
        let raw = b"a:2:{s:5:\"theme\";s:4:\"dark\";s:21:\"my_messaging_settings\";\
                    a:2:{s:6:\"folder\";a:1:{s:2:\"in\";a:2:{i:0;s:0:\"\";i:3;s:3:\"old\";}}s:5:\"limit\";d:2.5;}}";
        let value = unserialize(raw).unwrap();
        assert_eq!(
            value,
            json!({
                "theme": "dark",
                "my_messaging_settings": { "folder": { "in": { "0": "", "3": "old" } }, "limit": 2.5 }
            })
        );
        assert_eq!(value.as_object().unwrap().keys().next().map(String::as_str), Some("theme"));
    }

    #[test]
    fn written_settings_read_back() {
        let value = json!({ "z": [true, null, -1], "a": { "10": "x", "name": "Grüße" } });
        assert_eq!(unserialize(serialize_utf8(&value).as_bytes()).unwrap()["a"], value["a"]);
        assert_eq!(
            unserialize(&charset::encode(&serialize(&value))).unwrap()["z"],
            json!({ "0": true, "1": null, "2": -1 })
        );
    }

    #[test]
    fn string_lengths_are_bytes() {
        assert_eq!(unserialize(b"s:5:\"Gr\xfc\xdfe\";").unwrap(), json!("Grüße"));
        assert_eq!(unserialize("s:7:\"Grüße\";".as_bytes()).unwrap(), json!("Grüße"));
        assert_eq!(unserialize("s:5:\"Grüße\";".as_bytes()), Err(UnserializeError::Expected { expected: '"', at: 10 }));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(unserialize(b""), Err(UnserializeError::Truncated));
        assert_eq!(unserialize(b"a:2:{i:0;N;}"), Err(UnserializeError::Unsupported { tag: '}', at: 11 }));
        assert_eq!(unserialize(b"i:12x;"), Err(UnserializeError::Number(2)));
        assert_eq!(unserialize(b"b:2;"), Err(UnserializeError::Number(2)));
        assert_eq!(unserialize(b"N;N;"), Err(UnserializeError::Trailing(2)));
        assert!(matches!(
            unserialize(b"O:8:\"stdClass\":0:{}"),
            Err(UnserializeError::Unsupported { tag: 'O', .. })
        ));
        assert!(unserialize(b"{\"theme\":\"dark\"}").is_err());
    }
}
