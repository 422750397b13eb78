//! JSON document decoding into an ordered field list.
//!
//! The document is streamed through a serde visitor instead of being
//! collected into a map, so repeated keys are all kept in document order.

use std::fmt;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserializer as _;
use serde_json::{Number, Value};

use crate::error::DocumentError;
use crate::field::Field;
use crate::pool::Reset;

/// Reusable decoder for one document line.
///
/// Nested objects are flattened into dot-separated names, so
/// `{"a":{"b":1}}` yields the single field `a.b=1`.
#[derive(Debug, Default)]
pub struct DocumentParser {
    fields: Vec<Field>,
    prefix: String,
}

impl DocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `line`, replacing any previously parsed fields.
    pub fn parse(&mut self, line: &[u8]) -> Result<&mut Vec<Field>, DocumentError> {
        self.fields.clear();
        self.prefix.clear();

        let mut de = serde_json::Deserializer::from_slice(line);
        let top = TopLevel(Flatten {
            fields: &mut self.fields,
            prefix: &mut self.prefix,
        });
        if let Some(kind) = (&mut de).deserialize_any(top)? {
            return Err(DocumentError::NotAnObject { kind });
        }
        de.end()?;
        Ok(&mut self.fields)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

impl Reset for DocumentParser {
    fn reset(&mut self) {
        self.fields.clear();
        self.prefix.clear();
    }
}

/// Appends every leaf below the current `prefix` to `fields`.
struct Flatten<'p> {
    fields: &'p mut Vec<Field>,
    prefix: &'p mut String,
}

impl Flatten<'_> {
    fn reborrow(&mut self) -> Flatten<'_> {
        Flatten {
            fields: &mut *self.fields,
            prefix: &mut *self.prefix,
        }
    }

    fn push(self, value: String) {
        self.fields.push(Field {
            name: self.prefix.clone(),
            value,
        });
    }

    fn append_entries<'de, A: MapAccess<'de>>(mut self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            let prefix_len = self.prefix.len();
            if !self.prefix.is_empty() {
                self.prefix.push('.');
            }
            self.prefix.push_str(&key);
            map.next_value_seed(self.reborrow())?;
            self.prefix.truncate(prefix_len);
        }
        Ok(())
    }
}

impl<'de> DeserializeSeed<'de> for Flatten<'_> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for Flatten<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        Ok(())
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<(), E> {
        self.push(v.to_string());
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<(), E> {
        self.push(v.to_string());
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<(), E> {
        self.push(v.to_string());
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<(), E> {
        // Same text serde_json uses when printing the number
        let text = Number::from_f64(v).map_or_else(|| v.to_string(), |n| n.to_string());
        self.push(text);
        Ok(())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.push(v.to_string());
        Ok(())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<(), E> {
        self.push(v);
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        self.push(Value::Array(items).to_string());
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<(), A::Error> {
        self.append_entries(map)
    }
}

/// Accepts only an object at the top level; yields the kind of anything else.
struct TopLevel<'p>(Flatten<'p>);

impl<'de> Visitor<'de> for TopLevel<'_> {
    type Value = Option<&'static str>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Some("null"))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Ok(Some("bool"))
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
        Ok(Some("number"))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
        Ok(Some("number"))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
        Ok(Some("number"))
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
        Ok(Some("string"))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Some("array"))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        self.0.append_entries(map)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_and_values(parser: &DocumentParser) -> Vec<(&str, &str)> {
        parser
            .fields()
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str()))
            .collect()
    }

    #[test]
    fn keeps_document_order() {
        let mut parser = DocumentParser::new();
        parser
            .parse(br#"{"zeta":"1","alpha":"2","mid":"3"}"#)
            .unwrap();
        assert_eq!(
            names_and_values(&parser),
            vec![("zeta", "1"), ("alpha", "2"), ("mid", "3")]
        );
    }

    #[test]
    fn flattens_and_stringifies() {
        let mut parser = DocumentParser::new();
        parser
            .parse(br#"{"host":{"name":"web-1","ip":null,"tags":{}},"ok":true,"n":-1.5,"list":[1,"a"]}"#)
            .unwrap();
        assert_eq!(
            names_and_values(&parser),
            vec![
                ("host.name", "web-1"),
                ("ok", "true"),
                ("n", "-1.5"),
                ("list", r#"[1,"a"]"#),
            ]
        );
    }

    #[test]
    fn rejects_non_objects_and_bad_json() {
        let mut parser = DocumentParser::new();
        assert!(matches!(
            parser.parse(b"[1,2]"),
            Err(DocumentError::NotAnObject { kind: "array" })
        ));
        assert!(matches!(
            parser.parse(b"{\"a\":"),
            Err(DocumentError::Json(_))
        ));
    }

    #[test]
    fn repeated_keys_are_all_kept_in_order() {
        let mut parser = DocumentParser::new();
        parser
            .parse(br#"{"_time":"1","m":"x","_time":"2","h":{"a":"1","a":"2"}}"#)
            .unwrap();
        assert_eq!(
            names_and_values(&parser),
            vec![("_time", "1"), ("m", "x"), ("_time", "2"), ("h.a", "1"), ("h.a", "2")]
        );
    }

    #[test]
    fn trailing_garbage_is_a_json_error() {
        let mut parser = DocumentParser::new();
        assert!(matches!(
            parser.parse(br#"{"a":"1"} x"#),
            Err(DocumentError::Json(_))
        ));
        assert!(matches!(
            parser.parse(b"\"str\""),
            Err(DocumentError::NotAnObject { kind: "string" })
        ));
    }

    #[test]
    fn reparse_discards_previous_fields() {
        let mut parser = DocumentParser::new();
        parser.parse(br#"{"a":"1","b":"2"}"#).unwrap();
        parser.parse(br#"{"c":"3"}"#).unwrap();
        assert_eq!(names_and_values(&parser), vec![("c", "3")]);
    }
}
