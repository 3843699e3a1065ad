//! XML-sourced data dictionary.
//!
//! A [`Dictionary`] is loaded once from a FIX repository XML document and then shared by
//! reference across every session that speaks that version: the fields it knows about, which
//! message types exist, which fields are required where, and how repeating groups nest. Once
//! loaded it never mutates.
//!
//! Repeating-group schemas are kept in a flat arena (`Dictionary::groups`) addressed by index
//! rather than as owned trees of child dictionaries, so looking up a nested group's shape is a
//! slice index, not a deep copy.

use lazy_static::lazy_static;
use roxmltree::{Document, Node};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

pub const USER_MIN: u32 = 5000;

#[derive(Error, Debug)]
pub enum DictError {
    #[error("malformed dictionary XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("missing required attribute `{attr}` on <{elem}>")]
    MissingAttribute { elem: String, attr: String },
    #[error("unresolved component reference: {0}")]
    UnknownComponent(String),
    #[error("unresolved field reference: {0}")]
    UnknownField(String),
    #[error("duplicate field number {0}")]
    DuplicateField(u32),
    #[error("root element must be <fix>, found <{0}>")]
    NotFixRoot(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Char,
    Boolean,
    UtcTimestamp,
    UtcDateOnly,
    UtcTimeOnly,
    Data,
    MultipleValueString,
    Str,
}

impl FieldType {
    fn from_xml(type_attr: &str) -> FieldType {
        match type_attr {
            "INT" | "SEQNUM" | "LENGTH" | "NUMINGROUP" | "DAYOFMONTH" => FieldType::Int,
            "FLOAT" | "AMT" | "QTY" | "PRICE" | "PRICEOFFSET" | "PERCENTAGE" => FieldType::Float,
            "CHAR" => FieldType::Char,
            "BOOLEAN" => FieldType::Boolean,
            "UTCTIMESTAMP" => FieldType::UtcTimestamp,
            "UTCDATEONLY" | "LOCALMKTDATE" | "DATE" => FieldType::UtcDateOnly,
            "UTCTIMEONLY" => FieldType::UtcTimeOnly,
            "DATA" => FieldType::Data,
            "MULTIPLEVALUESTRING" | "MULTIPLESTRINGVALUE" | "MULTIPLECHARVALUE" => {
                FieldType::MultipleValueString
            }
            _ => FieldType::Str,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub tag: u32,
    pub name: String,
    pub field_type: FieldType,
    pub enum_values: Option<HashSet<String>>,
}

/// The set of tags legal (and, among those, required) within one container: a message type, the
/// header, the trailer, or a repeating-group occurrence. `order` preserves the dictionary's
/// declared field order, used for group and body serialization order.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    pub allowed: HashSet<u32>,
    pub required: HashSet<u32>,
    pub order: Vec<u32>,
    pub group_refs: HashMap<u32, usize>,
}

impl FieldSet {
    fn push_field(&mut self, tag: u32, required: bool) {
        if self.allowed.insert(tag) {
            self.order.push(tag);
        }
        if required {
            self.required.insert(tag);
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupSchema {
    pub delimiter_tag: u32,
    pub fields: FieldSet,
}

/// Which field-set a lookup is relative to. Groups reference each other by arena index, forming
/// a DAG rather than an ownership tree.
#[derive(Debug, Clone)]
pub enum Container {
    MsgType(String),
    Header,
    Trailer,
    Group(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct Checks {
    pub fields_out_of_order: bool,
    pub fields_have_values: bool,
    pub user_defined_fields: bool,
    pub required_fields: bool,
    pub unknown_fields: bool,
    pub unknown_msg_type: bool,
}

impl Default for Checks {
    fn default() -> Self {
        Checks {
            fields_out_of_order: true,
            fields_have_values: true,
            user_defined_fields: true,
            required_fields: true,
            unknown_fields: true,
            unknown_msg_type: true,
        }
    }
}

lazy_static! {
    /// Header tags assumed even when no dictionary governs a session, matching the crate's
    /// existing hardcoded classification in `decode.rs`.
    pub static ref HARDCODED_HEADER_FIELDS: BTreeSet<u32> = [
        8, 9, 35, 49, 56, 115, 128, 90, 91, 34, 50, 142, 57, 143, 116, 129, 145, 43, 97, 52, 122,
        212, 213, 347, 369, 370,
    ]
    .iter()
    .cloned()
    .collect();
    pub static ref HARDCODED_TRAILER_FIELDS: BTreeSet<u32> = [93, 89, 10].iter().cloned().collect();
}

#[derive(Debug, Clone)]
pub struct Dictionary {
    pub version: String,
    fields: HashMap<u32, FieldDef>,
    name_to_tag: HashMap<String, u32>,
    msg_types: HashSet<String>,
    msg_field_sets: HashMap<String, FieldSet>,
    header: FieldSet,
    trailer: FieldSet,
    groups: Vec<GroupSchema>,
    pub checks: Checks,
}

/// Unresolved members of a `<component>`, kept around only during load so that components which
/// reference other components can be inlined regardless of declaration order.
enum Member<'a, 'b> {
    Field { name: String, required: bool },
    Group(Node<'a, 'b>),
    Component { name: String, required: bool },
}

impl Dictionary {
    pub fn load_str(xml: &str) -> Result<Dictionary, DictError> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "fix" {
            return Err(DictError::NotFixRoot(root.tag_name().name().to_string()));
        }
        let major = root.attribute("major").unwrap_or("4");
        let minor = root.attribute("minor").unwrap_or("2");
        let kind = root.attribute("type").unwrap_or("FIX");
        let version = format!("{kind}.{major}.{minor}");

        let mut fields = HashMap::new();
        let mut name_to_tag = HashMap::new();
        if let Some(fields_node) = child(root, "fields") {
            for f in fields_node.children().filter(|n| n.is_element() && n.tag_name().name() == "field") {
                let tag: u32 = attr(f, "field", "number")?
                    .parse()
                    .map_err(|_| DictError::MissingAttribute {
                        elem: "field".into(),
                        attr: "number".into(),
                    })?;
                let name = attr(f, "field", "name")?.to_string();
                let field_type = FieldType::from_xml(f.attribute("type").unwrap_or("STRING"));
                let enum_values: HashSet<String> = f
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "value")
                    .filter_map(|v| v.attribute("enum").map(|s| s.to_string()))
                    .collect();
                let enum_values = if enum_values.is_empty() { None } else { Some(enum_values) };
                if fields.insert(tag, FieldDef { tag, name: name.clone(), field_type, enum_values }).is_some() {
                    return Err(DictError::DuplicateField(tag));
                }
                name_to_tag.insert(name, tag);
            }
        }

        let mut components: HashMap<String, Node> = HashMap::new();
        if let Some(components_node) = child(root, "components") {
            for c in components_node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "component")
            {
                let name = attr(c, "component", "name")?.to_string();
                components.insert(name, c);
            }
        }

        let mut groups = Vec::new();
        let resolve = |node: Node| -> Result<FieldSet, DictError> {
            resolve_container(node, &name_to_tag, &components, &mut groups, &mut HashSet::new())
        };

        let header = match child(root, "header") {
            Some(n) => resolve(n)?,
            None => FieldSet::default(),
        };
        let trailer = match child(root, "trailer") {
            Some(n) => resolve(n)?,
            None => FieldSet::default(),
        };

        let mut msg_types = HashSet::new();
        let mut msg_field_sets = HashMap::new();
        if let Some(messages_node) = child(root, "messages") {
            for m in messages_node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "message")
            {
                let msgtype = attr(m, "message", "msgtype")?.to_string();
                let set = resolve(m)?;
                msg_types.insert(msgtype.clone());
                msg_field_sets.insert(msgtype, set);
            }
        }

        Ok(Dictionary {
            version,
            fields,
            name_to_tag,
            msg_types,
            msg_field_sets,
            header,
            trailer,
            groups,
            checks: Checks::default(),
        })
    }

    pub fn load_file(path: &std::path::Path) -> Result<Dictionary, DictError> {
        let xml = std::fs::read_to_string(path)?;
        Dictionary::load_str(&xml)
    }

    pub fn is_field(&self, tag: u32) -> bool {
        self.fields.contains_key(&tag)
    }

    pub fn field_type(&self, tag: u32) -> Option<FieldType> {
        self.fields.get(&tag).map(|f| f.field_type)
    }

    pub fn field_name(&self, tag: u32) -> Option<&str> {
        self.fields.get(&tag).map(|f| f.name.as_str())
    }

    pub fn tag_by_name(&self, name: &str) -> Option<u32> {
        self.name_to_tag.get(name).copied()
    }

    pub fn is_msg_type(&self, msgtype: &str) -> bool {
        self.msg_types.contains(msgtype)
    }

    fn field_set(&self, c: &Container) -> Option<&FieldSet> {
        match c {
            Container::MsgType(m) => self.msg_field_sets.get(m),
            Container::Header => Some(&self.header),
            Container::Trailer => Some(&self.trailer),
            Container::Group(i) => self.groups.get(*i).map(|g| &g.fields),
        }
    }

    pub fn is_msg_field(&self, msgtype: &str, tag: u32) -> bool {
        self.msg_field_sets
            .get(msgtype)
            .map(|s| s.allowed.contains(&tag))
            .unwrap_or(false)
    }

    /// True if `tag` is legal anywhere in a message of type `msgtype`: header, trailer, or body.
    pub fn is_in_message(&self, msgtype: &str, tag: u32) -> bool {
        self.is_header_field(tag) || self.is_trailer_field(tag) || self.is_msg_field(msgtype, tag)
    }

    pub fn is_required(&self, c: &Container, tag: u32) -> bool {
        self.field_set(c).map(|s| s.required.contains(&tag)).unwrap_or(false)
    }

    pub fn is_header_field(&self, tag: u32) -> bool {
        self.header.allowed.contains(&tag)
    }

    pub fn is_trailer_field(&self, tag: u32) -> bool {
        self.trailer.allowed.contains(&tag)
    }

    pub fn is_data_field(&self, tag: u32) -> bool {
        matches!(self.field_type(tag), Some(FieldType::Data))
    }

    pub fn is_multi_value_field(&self, tag: u32) -> bool {
        matches!(self.field_type(tag), Some(FieldType::MultipleValueString))
    }

    pub fn field_has_enum(&self, tag: u32) -> bool {
        self.fields.get(&tag).map(|f| f.enum_values.is_some()).unwrap_or(false)
    }

    /// For multi-value fields, every space-separated token must be an allowed enum value.
    pub fn enum_allowed(&self, tag: u32, value: &[u8]) -> bool {
        let Some(def) = self.fields.get(&tag) else { return true };
        let Some(allowed) = &def.enum_values else { return true };
        let Ok(s) = std::str::from_utf8(value) else { return false };
        if matches!(def.field_type, FieldType::MultipleValueString) {
            s.split(' ').all(|tok| allowed.contains(tok))
        } else {
            allowed.contains(s)
        }
    }

    pub fn group_info(&self, c: &Container, tag: u32) -> Option<(u32, usize)> {
        let set = self.field_set(c)?;
        let idx = *set.group_refs.get(&tag)?;
        Some((self.groups[idx].delimiter_tag, idx))
    }

    pub fn group_schema(&self, idx: usize) -> &GroupSchema {
        &self.groups[idx]
    }

    pub fn field_order(&self, c: &Container) -> &[u32] {
        self.field_set(c).map(|s| s.order.as_slice()).unwrap_or(&[])
    }

    pub fn is_user_defined(&self, tag: u32) -> bool {
        tag >= USER_MIN
    }
}

fn child<'a, 'b>(node: Node<'a, 'b>, name: &str) -> Option<Node<'a, 'b>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() == name)
}

fn attr<'a, 'b>(node: Node<'a, 'b>, elem: &str, attr_name: &str) -> Result<&'a str, DictError> {
    node.attribute(attr_name).ok_or_else(|| DictError::MissingAttribute {
        elem: elem.to_string(),
        attr: attr_name.to_string(),
    })
}

/// Walks the children of a `<header>`, `<trailer>`, `<message>`, or `<group>` node, inlining
/// `<component>` references textually and recursing into nested `<group>`s. `seen` guards
/// against component self-reference cycles.
fn resolve_container(
    node: Node,
    name_to_tag: &HashMap<String, u32>,
    components: &HashMap<String, Node>,
    groups: &mut Vec<GroupSchema>,
    seen: &mut HashSet<String>,
) -> Result<FieldSet, DictError> {
    let mut set = FieldSet::default();
    for child_node in node.children().filter(|n| n.is_element()) {
        match child_node.tag_name().name() {
            "field" => {
                let name = attr(child_node, "field", "name")?;
                let tag = *name_to_tag
                    .get(name)
                    .ok_or_else(|| DictError::UnknownField(name.to_string()))?;
                let required = child_node.attribute("required") == Some("Y");
                set.push_field(tag, required);
            }
            "group" => {
                let name = attr(child_node, "group", "name")?;
                let count_tag = *name_to_tag
                    .get(name)
                    .ok_or_else(|| DictError::UnknownField(name.to_string()))?;
                let required = child_node.attribute("required") == Some("Y");
                let inner = resolve_container(child_node, name_to_tag, components, groups, seen)?;
                let delimiter_tag = *inner
                    .order
                    .first()
                    .ok_or_else(|| DictError::MissingAttribute {
                        elem: "group".into(),
                        attr: "field".into(),
                    })?;
                let idx = groups.len();
                groups.push(GroupSchema { delimiter_tag, fields: inner });
                set.push_field(count_tag, required);
                set.group_refs.insert(count_tag, idx);
            }
            "component" => {
                let name = attr(child_node, "component", "name")?.to_string();
                if !seen.insert(name.clone()) {
                    return Err(DictError::UnknownComponent(name));
                }
                let comp_node = *components
                    .get(&name)
                    .ok_or_else(|| DictError::UnknownComponent(name.clone()))?;
                let inlined = resolve_container(comp_node, name_to_tag, components, groups, seen)?;
                seen.remove(&name);
                for tag in &inlined.order {
                    set.push_field(*tag, inlined.required.contains(tag));
                }
                for (tag, idx) in inlined.group_refs {
                    set.group_refs.insert(tag, idx);
                }
            }
            _ => {}
        }
    }
    Ok(set)
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"
    <fix type="FIX" major="4" minor="2">
      <header>
        <field name="BeginString" required="Y"/>
        <field name="BodyLength" required="Y"/>
        <field name="MsgType" required="Y"/>
        <field name="SenderCompID" required="Y"/>
        <field name="TargetCompID" required="Y"/>
        <field name="MsgSeqNum" required="Y"/>
        <field name="SendingTime" required="Y"/>
      </header>
      <trailer>
        <field name="CheckSum" required="Y"/>
      </trailer>
      <messages>
        <message name="Heartbeat" msgtype="0">
          <field name="TestReqID" required="N"/>
        </message>
        <message name="QuoteRequest" msgtype="R">
          <field name="QuoteReqID" required="Y"/>
          <group name="NoRelatedSym" required="N">
            <field name="Symbol" required="Y"/>
            <field name="Currency" required="N"/>
          </group>
        </message>
      </messages>
      <components>
      </components>
      <fields>
        <field number="8" name="BeginString" type="STRING"/>
        <field number="9" name="BodyLength" type="LENGTH"/>
        <field number="35" name="MsgType" type="STRING"/>
        <field number="49" name="SenderCompID" type="STRING"/>
        <field number="56" name="TargetCompID" type="STRING"/>
        <field number="34" name="MsgSeqNum" type="SEQNUM"/>
        <field number="52" name="SendingTime" type="UTCTIMESTAMP"/>
        <field number="10" name="CheckSum" type="STRING"/>
        <field number="112" name="TestReqID" type="STRING"/>
        <field number="131" name="QuoteReqID" type="STRING"/>
        <field number="146" name="NoRelatedSym" type="NUMINGROUP"/>
        <field number="55" name="Symbol" type="STRING"/>
        <field number="15" name="Currency" type="STRING">
          <value enum="USD" description="US_DOLLAR"/>
          <value enum="EUR" description="EURO"/>
        </field>
      </fields>
    </fix>
    "#;

    #[test]
    fn test_load_and_header() {
        let dict = Dictionary::load_str(SAMPLE).unwrap();
        assert_eq!(dict.version, "FIX.4.2");
        assert!(dict.is_header_field(8));
        assert!(dict.is_trailer_field(10));
        assert!(dict.is_msg_type("0"));
        assert!(dict.is_msg_type("R"));
        assert!(!dict.is_msg_type("Z"));
    }

    #[test]
    fn test_required_fields() {
        let dict = Dictionary::load_str(SAMPLE).unwrap();
        assert!(dict.is_required(&Container::Header, 8));
        assert!(!dict.is_required(&Container::MsgType("0".into()), 112));
        assert!(dict.is_required(&Container::MsgType("R".into()), 131));
    }

    #[test]
    fn test_group_info() {
        let dict = Dictionary::load_str(SAMPLE).unwrap();
        let (delim, idx) = dict.group_info(&Container::MsgType("R".into()), 146).unwrap();
        assert_eq!(delim, 55);
        let schema = dict.group_schema(idx);
        assert!(schema.fields.allowed.contains(&55));
        assert!(schema.fields.allowed.contains(&15));
        assert!(schema.fields.required.contains(&55));
        assert!(!schema.fields.required.contains(&15));
    }

    #[test]
    fn test_enum_allowed() {
        let dict = Dictionary::load_str(SAMPLE).unwrap();
        assert!(dict.field_has_enum(15));
        assert!(dict.enum_allowed(15, b"USD"));
        assert!(!dict.enum_allowed(15, b"ZZZ"));
    }

    #[test]
    fn test_malformed_xml_rejected() {
        assert!(Dictionary::load_str("<not-fix/>").is_err());
        assert!(Dictionary::load_str("<fix><unclosed></fix>").is_err());
    }
}
