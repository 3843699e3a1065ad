//! Ordered tag/value storage shared by the header, body, and trailer of a [`Message`](crate::fix::message::Message).
//!
//! A [`FieldMap`] is a multimap from tag to [`Field`], plus a parallel map from a group-count tag
//! to its ordered list of occurrence `FieldMap`s. Iteration order is fixed at construction by a
//! [`Comparator`] and never depends on insertion order, matching spec.md's canonical
//! header/body/trailer layout requirement.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FieldMapError {
    #[error("tag {0} not present")]
    TagNotFound(u32),
    #[error("group {tag} has no occurrence #{ordinal}")]
    OrdinalOutOfRange { tag: u32, ordinal: usize },
}

#[derive(Debug, Clone, Copy, Default)]
struct Metrics {
    length: usize,
    byte_sum: u64,
}

/// One tag/value pair. Wire length and checksum contribution are computed lazily and cached;
/// any mutation through [`Field::set_value`] invalidates the cache.
#[derive(Debug, Clone)]
pub struct Field {
    tag: u32,
    value: Vec<u8>,
    metrics: Cell<Option<Metrics>>,
}

impl Field {
    pub fn new(tag: u32, value: impl Into<Vec<u8>>) -> Field {
        Field { tag, value: value.into(), metrics: Cell::new(None) }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<Vec<u8>>) {
        self.value = value.into();
        self.metrics.set(None);
    }

    fn metrics(&self) -> Metrics {
        if let Some(m) = self.metrics.get() {
            return m;
        }
        let tag_digits = self.tag.to_string();
        // tag digits + '=' + value + SOH
        let length = tag_digits.len() + 1 + self.value.len() + 1;
        let mut byte_sum: u64 = tag_digits.bytes().map(|b| b as u64).sum();
        byte_sum += b'=' as u64;
        byte_sum += self.value.iter().map(|&b| b as u64).sum::<u64>();
        byte_sum += 1u64; // SOH
        let m = Metrics { length, byte_sum };
        self.metrics.set(Some(m));
        m
    }

    /// Wire length of `tag=value<SOH>`.
    pub fn length(&self) -> usize {
        self.metrics().length
    }

    /// Arithmetic sum of every byte this field contributes to the wire, including `=` and SOH.
    pub fn byte_sum(&self) -> u64 {
        self.metrics().byte_sum
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.tag.to_string().as_bytes());
        buf.push(b'=');
        buf.extend_from_slice(&self.value);
        buf.push(1u8);
    }
}

/// Selects iteration order for a [`FieldMap`]. `Body(None)` sorts ascending by tag; `Body(Some(order))`
/// sorts by a dictionary-supplied tag order (used for repeating-group occurrences and, when a
/// dictionary defines one, message bodies), with any tag absent from `order` sorted after, ascending.
#[derive(Debug, Clone)]
pub enum Comparator {
    Header,
    Trailer,
    Body(Option<Vec<u32>>),
}

impl Comparator {
    fn key(&self, tag: u32) -> (u8, u32) {
        match self {
            Comparator::Header => match tag {
                8 => (0, 0),
                9 => (0, 1),
                35 => (0, 2),
                _ => (1, tag),
            },
            Comparator::Trailer => {
                if tag == 10 {
                    (1, 0)
                } else {
                    (0, tag)
                }
            }
            Comparator::Body(Some(order)) => match order.iter().position(|&t| t == tag) {
                Some(pos) => (0, pos as u32),
                None => (1, tag),
            },
            Comparator::Body(None) => (0, tag),
        }
    }

    fn cmp(&self, a: u32, b: u32) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
}

#[derive(Debug, Clone)]
pub struct FieldMap {
    comparator: Comparator,
    fields: Vec<Field>,
    groups: HashMap<u32, Vec<FieldMap>>,
}

impl FieldMap {
    pub fn new(comparator: Comparator) -> FieldMap {
        FieldMap { comparator, fields: Vec::new(), groups: HashMap::new() }
    }

    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    /// Replaces the first field with this tag, or appends if absent.
    pub fn set(&mut self, field: Field) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.tag == field.tag) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
    }

    /// Appends unconditionally; duplicate tags are representable even though standard
    /// validation rejects them.
    pub fn add(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn get(&self, tag: u32) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    pub fn get_or_error(&self, tag: u32) -> Result<&Field, FieldMapError> {
        self.get(tag).ok_or(FieldMapError::TagNotFound(tag))
    }

    pub fn remove(&mut self, tag: u32) -> Option<Field> {
        let pos = self.fields.iter().position(|f| f.tag == tag)?;
        Some(self.fields.remove(pos))
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.fields.iter().any(|f| f.tag == tag)
    }

    /// Appends one group occurrence and keeps the count field (`group_tag`) in sync with the
    /// number of occurrences now stored.
    pub fn add_group(&mut self, group_tag: u32, inner: FieldMap) -> &FieldMap {
        let occs = self.groups.entry(group_tag).or_default();
        occs.push(inner);
        let count = occs.len() as u64;
        self.set(Field::new(group_tag, count.to_string()));
        self.groups.get(&group_tag).unwrap().last().unwrap()
    }

    /// 1-based ordinal lookup, matching the wire convention.
    pub fn group(&self, ordinal: usize, tag: u32) -> Result<&FieldMap, FieldMapError> {
        let occs = self.groups.get(&tag).ok_or(FieldMapError::TagNotFound(tag))?;
        if ordinal == 0 || ordinal > occs.len() {
            return Err(FieldMapError::OrdinalOutOfRange { tag, ordinal });
        }
        Ok(&occs[ordinal - 1])
    }

    pub fn group_mut(&mut self, ordinal: usize, tag: u32) -> Result<&mut FieldMap, FieldMapError> {
        let occs = self.groups.get_mut(&tag).ok_or(FieldMapError::TagNotFound(tag))?;
        if ordinal == 0 || ordinal > occs.len() {
            return Err(FieldMapError::OrdinalOutOfRange { tag, ordinal });
        }
        Ok(&mut occs[ordinal - 1])
    }

    /// Number of occurrences actually stored, which `add_group` keeps equal to the count field's
    /// declared value.
    pub fn group_count(&self, tag: u32) -> u32 {
        self.groups.get(&tag).map(|v| v.len() as u32).unwrap_or(0)
    }

    pub fn group_occurrences(&self, tag: u32) -> &[FieldMap] {
        self.groups.get(&tag).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Fields in comparator order, not including group occurrences.
    pub fn ordered_tags(&self) -> Vec<u32> {
        let mut tags: Vec<u32> = self.fields.iter().map(|f| f.tag).collect();
        tags.sort_by(|a, b| self.comparator.cmp(*a, *b));
        tags.dedup();
        tags
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        let order = self.ordered_tags();
        order.into_iter().flat_map(move |tag| self.fields.iter().filter(move |f| f.tag == tag))
    }

    /// Serializes in comparator order; immediately after a group-count field, emits every
    /// occurrence of that group in order, each recursively by the same rule.
    pub fn to_wire(&self, buf: &mut Vec<u8>) {
        for tag in self.ordered_tags() {
            for f in self.fields.iter().filter(|f| f.tag == tag) {
                f.write(buf);
            }
            if let Some(occs) = self.groups.get(&tag) {
                for occ in occs {
                    occ.to_wire(buf);
                }
            }
        }
    }

    /// Sum of `Field::length()` across every field at this level and nested group occurrences,
    /// skipping any tag in `excluding` at this level.
    pub fn length(&self, excluding: &[u32]) -> usize {
        let mut total = 0usize;
        for f in &self.fields {
            if excluding.contains(&f.tag) {
                continue;
            }
            total += f.length();
            if let Some(occs) = self.groups.get(&f.tag) {
                for occ in occs {
                    total += occ.length(&[]);
                }
            }
        }
        total
    }

    /// True if any tag occurs more than once at this level (duplicates are representable in
    /// storage via [`FieldMap::add`] but are a validation error).
    pub fn has_duplicate_tags(&self) -> bool {
        self.fields.len() != self.ordered_tags().len()
    }

    /// Like [`FieldMap::to_wire`], but omits the listed tags (and any groups keyed by them) —
    /// used by [`Message`](crate::fix::message::Message) to serialize header/trailer minus
    /// `BeginString`/`BodyLength`/`CheckSum`.
    pub fn to_wire_excluding(&self, buf: &mut Vec<u8>, excluding: &[u32]) {
        for tag in self.ordered_tags() {
            if excluding.contains(&tag) {
                continue;
            }
            for f in self.fields.iter().filter(|f| f.tag == tag) {
                f.write(buf);
            }
            if let Some(occs) = self.groups.get(&tag) {
                for occ in occs {
                    occ.to_wire(buf);
                }
            }
        }
    }

    /// Sum of `Field::byte_sum()` across every field at this level and nested group occurrences,
    /// skipping any tag in `excluding` at this level.
    pub fn byte_sum(&self, excluding: &[u32]) -> u64 {
        let mut total = 0u64;
        for f in &self.fields {
            if excluding.contains(&f.tag) {
                continue;
            }
            total += f.byte_sum();
            if let Some(occs) = self.groups.get(&f.tag) {
                for occ in occs {
                    total += occ.byte_sum(&[]);
                }
            }
        }
        total
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_replaces() {
        let mut m = FieldMap::new(Comparator::Body(None));
        m.set(Field::new(1, "A"));
        m.set(Field::new(1, "B"));
        assert_eq!(m.get(1).unwrap().value(), b"B");
        assert_eq!(m.ordered_tags(), vec![1]);
    }

    #[test]
    fn test_add_allows_duplicates() {
        let mut m = FieldMap::new(Comparator::Body(None));
        m.add(Field::new(1, "A"));
        m.add(Field::new(1, "B"));
        assert_eq!(m.fields.len(), 2);
    }

    #[test]
    fn test_header_ordering() {
        let mut m = FieldMap::new(Comparator::Header);
        m.set(Field::new(56, "CLIENT"));
        m.set(Field::new(35, "0"));
        m.set(Field::new(9, "55"));
        m.set(Field::new(8, "FIX.4.2"));
        m.set(Field::new(49, "SERVER"));
        assert_eq!(m.ordered_tags(), vec![8, 9, 35, 49, 56]);
    }

    #[test]
    fn test_trailer_ordering_checksum_last() {
        let mut m = FieldMap::new(Comparator::Trailer);
        m.set(Field::new(10, "000"));
        m.set(Field::new(93, "5"));
        assert_eq!(m.ordered_tags(), vec![93, 10]);
    }

    #[test]
    fn test_group_roundtrip() {
        let mut body = FieldMap::new(Comparator::Body(None));
        let order = vec![55, 15];
        let mut occ1 = FieldMap::new(Comparator::Body(Some(order.clone())));
        occ1.set(Field::new(55, "IBM"));
        let mut occ2 = FieldMap::new(Comparator::Body(Some(order)));
        occ2.set(Field::new(55, "GOOG"));
        body.add_group(146, occ1);
        body.add_group(146, occ2);
        assert_eq!(body.group_count(146), 2);
        assert_eq!(body.get(146).unwrap().value(), b"2");
        assert_eq!(body.group(1, 146).unwrap().get(55).unwrap().value(), b"IBM");
        assert_eq!(body.group(2, 146).unwrap().get(55).unwrap().value(), b"GOOG");
        assert!(body.group(3, 146).is_err());
    }

    #[test]
    fn test_to_wire_emits_group_after_count() {
        let mut body = FieldMap::new(Comparator::Body(None));
        body.set(Field::new(131, "Q1"));
        let mut occ = FieldMap::new(Comparator::Body(Some(vec![55])));
        occ.set(Field::new(55, "IBM"));
        body.add_group(146, occ);
        let mut buf = Vec::new();
        body.to_wire(&mut buf);
        assert_eq!(buf, b"131=Q1\x01146=1\x0155=IBM\x01".to_vec());
    }

    #[test]
    fn test_zero_occurrence_group_emits_count_only() {
        let mut body = FieldMap::new(Comparator::Body(None));
        body.set(Field::new(146, "0"));
        let mut buf = Vec::new();
        body.to_wire(&mut buf);
        assert_eq!(buf, b"146=0\x01".to_vec());
    }

    #[test]
    fn test_length_and_byte_sum() {
        let mut m = FieldMap::new(Comparator::Body(None));
        m.set(Field::new(9, "0"));
        // "9=0\x01" -> length 4, sum '9'+'='+'0'+SOH = 57+61+48+1 = 167
        assert_eq!(m.length(&[]), 4);
        assert_eq!(m.byte_sum(&[]) % 256, 167);
    }

    #[test]
    fn test_field_cache_invalidated_on_mutation() {
        let mut f = Field::new(1, "A");
        assert_eq!(f.length(), 4);
        f.set_value("AB");
        assert_eq!(f.length(), 5);
    }
}
