//! Structural comparison of dictionary-like files (JSON, YAML, XML).
//!
//! Both files are parsed into [`serde_yaml::Value`] and compared key by key.
//! Only keys present in the golden document are checked, so a candidate may
//! carry extra keys and still match. Mapping order never matters; sequence
//! order does.

use crate::error::{PipelineError, Result, ResultExt as _};
use crate::utils::{ensure_parent_dir, yaml_scalar_to_string};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Extensions compared structurally rather than byte for byte.
pub const DICT_FILE_TYPES: [&str; 4] = ["json", "xml", "yml", "yaml"];

/// Key reported when two non-mapping documents differ.
pub const DOCUMENT_KEY: &str = "<document>";

pub fn is_dictlike(file: &str) -> bool {
    file.rsplit_once('.')
        .is_some_and(|(_, ext)| DICT_FILE_TYPES.contains(&ext))
}

/// Parse a dictionary-like file into a YAML value, whatever its format.
pub fn load_dictlike(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("xml") => xml_to_value(&text),
        Some("json") => serde_json::from_str(&text).map_err(PipelineError::from),
        _ => serde_yaml::from_str(&text)
            .map_err(|e| PipelineError::Serialization(format!("YAML error: {e}"))),
    };
    parsed.with_context(|| format!("Failed to parse {}", path.display()))
}

/// Compare `candidate` against `golden`, returning the golden keys whose
/// values are missing or different in the candidate.
///
/// An empty result means the documents match.
pub fn compare_dict(golden: &Value, candidate: &Value) -> Vec<String> {
    let Value::Mapping(golden_map) = golden else {
        return if values_equal(golden, candidate) {
            Vec::new()
        } else {
            vec![DOCUMENT_KEY.to_owned()]
        };
    };

    golden_map
        .iter()
        .filter(|(key, value)| !entry_matches(value, candidate.get(*key)))
        .map(|(key, _)| key_label(key))
        .collect()
}

fn entry_matches(golden: &Value, candidate: Option<&Value>) -> bool {
    match (golden, candidate) {
        (Value::Mapping(_), Some(other @ Value::Mapping(_))) => compare_dict(golden, other).is_empty(),
        (Value::Mapping(_), Some(_)) | (_, None) => false,
        (_, Some(other)) => values_equal(golden, other),
    }
}

/// Equality with numbers compared by value, so `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
            _ => x == y,
        },
        (Value::Sequence(xs), Value::Sequence(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Mapping(xs), Value::Mapping(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        (Value::Tagged(x), Value::Tagged(y)) => x.tag == y.tag && values_equal(&x.value, &y.value),
        _ => a == b,
    }
}

fn key_label(key: &Value) -> String {
    yaml_scalar_to_string(key).unwrap_or_else(|| format!("{key:?}"))
}

/// Write a parsed document back out as YAML for inspection.
pub fn dump_yaml(value: &Value, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let text = serde_yaml::to_string(value)
        .map_err(|e| PipelineError::Serialization(format!("YAML error: {e}")))?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// `<dir>/<prefix>_<file>.yml`
pub fn debug_dump_path(dir: &Path, prefix: &str, file: &str) -> PathBuf {
    dir.join(format!("{prefix}_{file}.yml"))
}

/// Convert an XML document into nested mappings.
///
/// Attributes become `@name` keys and mixed text becomes `#text`. A child
/// element repeated under the same parent turns into a sequence. Elements
/// holding only text collapse to a string, empty ones to null.
pub fn xml_to_value(text: &str) -> Result<Value> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = vec![Element::default()];
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => {
                let element = Element::open(&start)?;
                attach(&mut stack, element)?;
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(PipelineError::Serialization(
                        "XML error: unbalanced closing tag".to_owned(),
                    ));
                }
                let element = stack
                    .pop()
                    .ok_or_else(|| PipelineError::Serialization("XML error: empty stack".to_owned()))?;
                attach(&mut stack, element)?;
            }
            Event::Text(content) => {
                let unescaped = content.unescape()?;
                push_text(&mut stack, &unescaped);
            }
            Event::CData(content) => {
                let raw = content.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            // declarations, comments and processing instructions
            _ => {}
        }
    }

    match stack.pop() {
        Some(document) if stack.is_empty() => Ok(Value::Mapping(document.children)),
        _ => Err(PipelineError::Serialization(
            "XML error: document ended inside an element".to_owned(),
        )),
    }
}

#[derive(Default)]
struct Element {
    name: String,
    attributes: Mapping,
    children: Mapping,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let mut attributes = Mapping::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
            let value = attr.unescape_value()?.into_owned();
            attributes.insert(Value::String(key), Value::String(value));
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    fn into_value(self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            };
        }

        let mut map = self.attributes;
        map.extend(self.children);
        if !self.text.is_empty() {
            map.insert(Value::String("#text".to_owned()), Value::String(self.text));
        }
        Value::Mapping(map)
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    if let Some(current) = stack.last_mut() {
        current.text.push_str(text);
    }
}

fn attach(stack: &mut [Element], element: Element) -> Result<()> {
    let parent = stack
        .last_mut()
        .ok_or_else(|| PipelineError::Serialization("XML error: element outside document".to_owned()))?;

    let key = Value::String(element.name.clone());
    let value = element.into_value();
    match parent.children.get_mut(&key) {
        Some(Value::Sequence(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::replace(existing, Value::Null);
            *existing = Value::Sequence(vec![first, value]);
        }
        None => {
            parent.children.insert(key, value);
        }
    }
    Ok(())
}
