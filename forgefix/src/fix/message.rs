//! A FIX message: exactly three [`FieldMap`]s (header, body, trailer) with fixed comparator
//! assignments, plus the framing composition/parsing rules that tie them to the wire format.

use crate::fix::dictionary::{Container, Dictionary, GroupSchema};
use crate::fix::fieldmap::{Comparator, Field, FieldMap};
use crate::fix::generated::get_data_ref;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MessageError {
    #[error("malformed tag syntax")]
    MalformedTag,
    #[error("message truncated")]
    Truncated,
    #[error("BeginString missing from header")]
    MissingBeginString,
    #[error("MsgType missing from header")]
    MissingMsgType,
    #[error("BodyLength does not match actual message length")]
    BodyLengthMismatch,
    #[error("CheckSum does not match computed value")]
    ChecksumMismatch,
}

/// Administrative `MsgType`s per spec.md §4.4: Heartbeat, TestRequest, ResendRequest, Reject,
/// SequenceReset, Logout, Logon. Everything else is an application message.
pub fn is_admin_msg_type(msg_type: &str) -> bool {
    matches!(msg_type, "0" | "1" | "2" | "3" | "4" | "5" | "A")
}

#[derive(Debug, Clone)]
pub struct Message {
    pub header: FieldMap,
    pub body: FieldMap,
    pub trailer: FieldMap,
    /// False if a field was found outside the section order (header fields after the body
    /// began, or body fields after the trailer began). The message is still fully built;
    /// [`crate::fix::dictvalidate`] turns this into a session reject rather than aborting parse.
    pub well_formed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Body,
    Trailer,
}

struct Token {
    tag: u32,
    value: Vec<u8>,
}

impl Message {
    pub fn new(body_order: Option<Vec<u32>>) -> Message {
        Message {
            header: FieldMap::new(Comparator::Header),
            body: FieldMap::new(Comparator::Body(body_order)),
            trailer: FieldMap::new(Comparator::Trailer),
            well_formed: true,
        }
    }

    pub fn msg_type(&self) -> Option<String> {
        self.header
            .get(35)
            .map(|f| String::from_utf8_lossy(f.value()).into_owned())
    }

    pub fn is_admin(&self) -> bool {
        self.msg_type().map(|t| is_admin_msg_type(&t)).unwrap_or(false)
    }

    /// Writes `BeginString`, a freshly computed `BodyLength`, the rest of the header, the body,
    /// the trailer minus `CheckSum`, then `CheckSum=NNN<SOH>` computed over everything written
    /// so far.
    pub fn to_wire(&self, buf: &mut Vec<u8>) -> Result<(), MessageError> {
        let begin_string = self.header.get(8).ok_or(MessageError::MissingBeginString)?;

        let header_len = self.header.length(&[8, 9]);
        let body_len = self.body.length(&[]);
        let trailer_len = self.trailer.length(&[10]);
        let body_length = header_len + body_len + trailer_len;

        begin_string.write(buf);
        Field::new(9, body_length.to_string()).write(buf);
        self.header.to_wire_excluding(buf, &[8, 9]);
        self.body.to_wire(buf);
        self.trailer.to_wire_excluding(buf, &[10]);

        let sum: u64 = buf.iter().map(|&b| b as u64).sum();
        let checksum = (sum % 256) as u8;
        Field::new(10, format!("{:03}", checksum)).write(buf);
        Ok(())
    }

    pub fn to_wire_vec(&self) -> Result<Vec<u8>, MessageError> {
        let mut buf = Vec::new();
        self.to_wire(&mut buf)?;
        Ok(buf)
    }

    /// Parses raw wire bytes (as returned by the frame parser) into header/body/trailer field
    /// maps, consulting `session_dict` for header/trailer membership and group shapes and
    /// `app_dict` for the body. Either dictionary may be omitted, in which case classification
    /// falls back to the hardcoded header/trailer tag sets.
    pub fn from_wire(
        bytes: &[u8],
        session_dict: Option<&Dictionary>,
        app_dict: Option<&Dictionary>,
        validate_length_checksum: bool,
    ) -> Result<Message, MessageError> {
        if validate_length_checksum {
            verify_length_and_checksum(bytes)?;
        }
        let tokens = tokenize(bytes)?;
        let msg_type = tokens
            .iter()
            .find(|t| t.tag == 35)
            .map(|t| String::from_utf8_lossy(&t.value).into_owned())
            .ok_or(MessageError::MissingMsgType)?;

        let header_dict = session_dict.or(app_dict);
        let body_order = app_dict
            .map(|d| d.field_order(&Container::MsgType(msg_type.clone())).to_vec())
            .filter(|v| !v.is_empty());

        let mut header = FieldMap::new(Comparator::Header);
        let mut body = FieldMap::new(Comparator::Body(body_order));
        let mut trailer = FieldMap::new(Comparator::Trailer);
        let mut well_formed = true;
        let mut stage = Section::Header;

        let mut i = 0;
        while i < tokens.len() {
            let tag = tokens[i].tag;
            match classify(tag, header_dict) {
                Section::Header => {
                    if stage != Section::Header {
                        well_formed = false;
                    }
                    header.add(Field::new(tag, tokens[i].value.clone()));
                    i += 1;
                }
                Section::Trailer => {
                    stage = Section::Trailer;
                    trailer.add(Field::new(tag, tokens[i].value.clone()));
                    i += 1;
                }
                Section::Body => {
                    if stage == Section::Trailer {
                        well_formed = false;
                    }
                    if stage == Section::Header {
                        stage = Section::Body;
                    }
                    if let Some(d) = app_dict {
                        if let Some((_, idx)) =
                            d.group_info(&Container::MsgType(msg_type.clone()), tag)
                        {
                            i = consume_top_level_group(&tokens, i, tag, idx, d, &mut body);
                            continue;
                        }
                    }
                    body.add(Field::new(tag, tokens[i].value.clone()));
                    i += 1;
                }
            }
        }

        Ok(Message { header, body, trailer, well_formed })
    }

    /// Swaps Sender/Target CompID, SubID, and (for BeginString ≥ FIX.4.1) Location, plus
    /// OnBehalfOf/DeliverTo pairs, producing a header suitable for replying. `BeginString` is
    /// left unchanged.
    pub fn reverse_route(&self) -> FieldMap {
        let mut out = FieldMap::new(Comparator::Header);
        let begin_string = self.header.get(8).map(|f| f.value().to_vec());
        let include_location = begin_string
            .as_deref()
            .map(|v| v != b"FIX.4.0")
            .unwrap_or(true);

        for tag in self.header.ordered_tags() {
            if let Some(f) = self.header.get(tag) {
                out.set(Field::new(tag, f.value().to_vec()));
            }
        }

        swap_pair(&mut out, 49, 56); // SenderCompID <-> TargetCompID
        swap_pair(&mut out, 50, 57); // SenderSubID <-> TargetSubID
        swap_pair(&mut out, 115, 128); // OnBehalfOfCompID <-> DeliverToCompID
        swap_pair(&mut out, 116, 129); // OnBehalfOfSubID <-> DeliverToSubID
        if include_location {
            swap_pair(&mut out, 142, 143); // SenderLocationID <-> TargetLocationID
            swap_pair(&mut out, 144, 145); // OnBehalfOfLocationID <-> DeliverToLocationID
        }
        out
    }
}

fn swap_pair(map: &mut FieldMap, a: u32, b: u32) {
    let fa = map.get(a).map(|f| f.value().to_vec());
    let fb = map.get(b).map(|f| f.value().to_vec());
    match (fa, fb) {
        (Some(va), Some(vb)) => {
            map.set(Field::new(a, vb));
            map.set(Field::new(b, va));
        }
        (Some(va), None) => {
            map.remove(a);
            map.set(Field::new(b, va));
        }
        (None, Some(vb)) => {
            map.remove(b);
            map.set(Field::new(a, vb));
        }
        (None, None) => {}
    }
}

fn classify(tag: u32, dict: Option<&Dictionary>) -> Section {
    if tag == 8 || tag == 9 || tag == 35 {
        return Section::Header;
    }
    if tag == 10 || tag == 93 || tag == 89 {
        return Section::Trailer;
    }
    if let Some(d) = dict {
        if d.is_header_field(tag) {
            return Section::Header;
        }
        if d.is_trailer_field(tag) {
            return Section::Trailer;
        }
        return Section::Body;
    }
    use crate::fix::dictionary::{HARDCODED_HEADER_FIELDS, HARDCODED_TRAILER_FIELDS};
    if HARDCODED_HEADER_FIELDS.contains(&tag) {
        return Section::Header;
    }
    if HARDCODED_TRAILER_FIELDS.contains(&tag) {
        return Section::Trailer;
    }
    Section::Body
}

fn consume_top_level_group(
    tokens: &[Token],
    mut i: usize,
    count_tag: u32,
    group_idx: usize,
    dict: &Dictionary,
    target: &mut FieldMap,
) -> usize {
    let count: u32 = std::str::from_utf8(&tokens[i].value)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    target.set(Field::new(count_tag, tokens[i].value.clone()));
    i += 1;
    for _ in 0..count {
        if i >= tokens.len() {
            break;
        }
        let schema = dict.group_schema(group_idx);
        if !schema.fields.allowed.contains(&tokens[i].tag) {
            break;
        }
        let (occ, new_i) = consume_group(tokens, i, schema, dict);
        i = new_i;
        target.add_group(count_tag, occ);
    }
    i
}

/// Consumes one repeating-group occurrence: fields belonging to `schema`'s allowed set, until
/// the delimiter tag recurs (signaling the next occurrence) or an out-of-set tag is seen.
fn consume_group(tokens: &[Token], mut i: usize, schema: &GroupSchema, dict: &Dictionary) -> (FieldMap, usize) {
    let mut occ = FieldMap::new(Comparator::Body(Some(schema.fields.order.clone())));
    let mut first = true;
    while i < tokens.len() {
        let tag = tokens[i].tag;
        if !schema.fields.allowed.contains(&tag) {
            break;
        }
        if !first && tag == schema.delimiter_tag {
            break;
        }
        first = false;
        if let Some(&gidx) = schema.fields.group_refs.get(&tag) {
            let count: u32 = std::str::from_utf8(&tokens[i].value)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            occ.set(Field::new(tag, tokens[i].value.clone()));
            i += 1;
            for _ in 0..count {
                if i >= tokens.len() {
                    break;
                }
                let inner_schema = dict.group_schema(gidx);
                if !inner_schema.fields.allowed.contains(&tokens[i].tag) {
                    break;
                }
                let (inner_occ, new_i) = consume_group(tokens, i, inner_schema, dict);
                i = new_i;
                occ.add_group(tag, inner_occ);
            }
            continue;
        }
        occ.add(Field::new(tag, tokens[i].value.clone()));
        i += 1;
    }
    (occ, i)
}

/// Splits a framed message into (tag, raw value) tokens. Data fields (announced by a preceding
/// length tag per [`get_data_ref`]) are read as exactly that many raw bytes rather than scanned
/// for SOH, since their value may contain one.
fn tokenize(bytes: &[u8]) -> Result<Vec<Token>, MessageError> {
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut pending_data: Option<(u32, usize)> = None;
    while i < bytes.len() {
        let tag_start = i;
        while i < bytes.len() && bytes[i] != b'=' {
            if !bytes[i].is_ascii_digit() {
                return Err(MessageError::MalformedTag);
            }
            i += 1;
        }
        if i >= bytes.len() || i == tag_start {
            return Err(MessageError::MalformedTag);
        }
        let tag: u32 = std::str::from_utf8(&bytes[tag_start..i])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(MessageError::MalformedTag)?;
        i += 1;
        let value_start = i;

        if let Some((data_tag, len)) = pending_data.take() {
            if tag == data_tag {
                if value_start + len > bytes.len() {
                    return Err(MessageError::Truncated);
                }
                let value = bytes[value_start..value_start + len].to_vec();
                i = value_start + len;
                if i >= bytes.len() || bytes[i] != 1 {
                    return Err(MessageError::MalformedTag);
                }
                i += 1;
                tokens.push(Token { tag, value });
                continue;
            }
        }

        while i < bytes.len() && bytes[i] != 1 {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(MessageError::Truncated);
        }
        let value = bytes[value_start..i].to_vec();
        i += 1;
        if let Some(data_tag) = get_data_ref(tag) {
            let len: usize = std::str::from_utf8(&value)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(MessageError::MalformedTag)?;
            pending_data = Some((data_tag, len));
        }
        tokens.push(Token { tag, value });
    }
    Ok(tokens)
}

fn verify_length_and_checksum(bytes: &[u8]) -> Result<(), MessageError> {
    let pos9 = find(bytes, b"\x019=").ok_or(MessageError::BodyLengthMismatch)?;
    let start = pos9 + 3;
    let end = bytes[start..]
        .iter()
        .position(|&b| b == 1)
        .map(|p| start + p)
        .ok_or(MessageError::BodyLengthMismatch)?;
    let body_len: usize = std::str::from_utf8(&bytes[start..end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(MessageError::BodyLengthMismatch)?;
    let body_start = end + 1;
    if body_start + body_len > bytes.len() {
        return Err(MessageError::BodyLengthMismatch);
    }
    let checksum_start = body_start + body_len;
    if !bytes[checksum_start..].starts_with(b"10=") {
        return Err(MessageError::BodyLengthMismatch);
    }
    let actual_sum: u64 = bytes[..checksum_start].iter().map(|&b| b as u64).sum();
    let expected = (actual_sum % 256) as u8;

    let cs_start = checksum_start + 3;
    let cs_end = bytes[cs_start..]
        .iter()
        .position(|&b| b == 1)
        .map(|p| cs_start + p)
        .ok_or(MessageError::ChecksumMismatch)?;
    let cs: u8 = std::str::from_utf8(&bytes[cs_start..cs_end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(MessageError::ChecksumMismatch)?;
    if cs != expected {
        return Err(MessageError::ChecksumMismatch);
    }
    Ok(())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod test {
    use super::*;

    fn heartbeat_bytes() -> Vec<u8> {
        b"8=FIX.4.2\x019=55\x0135=0\x0134=1\x0149=SERVER\x0152=20250101-00:00:00\x0156=CLIENT\x0110=122\x01"
            .to_vec()
    }

    #[test]
    fn test_s1_heartbeat_roundtrip() {
        let bytes = heartbeat_bytes();
        let expected_sum: u64 = bytes[..bytes.len() - 7].iter().map(|&b| b as u64).sum();
        let checksum = (expected_sum % 256) as u8;
        let mut fixed = bytes.clone();
        let csum_pos = fixed.len() - 4;
        let rendered = format!("{:03}", checksum);
        fixed[csum_pos - 3..csum_pos].copy_from_slice(rendered.as_bytes());

        let msg = Message::from_wire(&fixed, None, None, true).unwrap();
        assert_eq!(msg.msg_type().unwrap(), "0");
        assert_eq!(msg.header.get(34).unwrap().value(), b"1");
        assert!(msg.well_formed);

        let out = msg.to_wire_vec().unwrap();
        assert_eq!(out, fixed);
    }

    #[test]
    fn test_admin_detection() {
        assert!(is_admin_msg_type("0"));
        assert!(is_admin_msg_type("A"));
        assert!(!is_admin_msg_type("D"));
    }

    #[test]
    fn test_s6_group_parsing() {
        use crate::fix::dictionary::Dictionary;
        const DICT: &str = r#"
        <fix type="FIX" major="4" minor="2">
          <header><field name="BeginString" required="Y"/><field name="BodyLength" required="Y"/><field name="MsgType" required="Y"/></header>
          <trailer><field name="CheckSum" required="Y"/></trailer>
          <messages>
            <message name="QuoteRequest" msgtype="R">
              <group name="NoRelatedSym" required="N">
                <field name="Symbol" required="Y"/>
              </group>
            </message>
          </messages>
          <fields>
            <field number="8" name="BeginString" type="STRING"/>
            <field number="9" name="BodyLength" type="LENGTH"/>
            <field number="35" name="MsgType" type="STRING"/>
            <field number="10" name="CheckSum" type="STRING"/>
            <field number="146" name="NoRelatedSym" type="NUMINGROUP"/>
            <field number="55" name="Symbol" type="STRING"/>
          </fields>
        </fix>"#;
        let dict = Dictionary::load_str(DICT).unwrap();
        let bytes = b"8=FIX.4.2\x019=30\x0135=R\x01146=2\x0155=IBM\x0155=GOOG\x0110=000\x01";
        let msg = Message::from_wire(bytes, None, Some(&dict), false).unwrap();
        assert_eq!(msg.body.group_count(146), 2);
        assert_eq!(msg.body.group(1, 146).unwrap().get(55).unwrap().value(), b"IBM");
        assert_eq!(msg.body.group(2, 146).unwrap().get(55).unwrap().value(), b"GOOG");
    }

    #[test]
    fn test_reverse_route_swaps_comp_ids() {
        let mut msg = Message::new(None);
        msg.header.set(Field::new(8, "FIX.4.2"));
        msg.header.set(Field::new(49, "CLIENT"));
        msg.header.set(Field::new(56, "SERVER"));
        let reversed = msg.reverse_route();
        assert_eq!(reversed.get(49).unwrap().value(), b"SERVER");
        assert_eq!(reversed.get(56).unwrap().value(), b"CLIENT");
        assert_eq!(reversed.get(8).unwrap().value(), b"FIX.4.2");
    }

    #[test]
    fn test_checksum_failure_detected() {
        let mut bytes = heartbeat_bytes();
        let len = bytes.len();
        bytes[len - 4..len - 1].copy_from_slice(b"000");
        let err = Message::from_wire(&bytes, None, None, true).unwrap_err();
        assert_eq!(err, MessageError::ChecksumMismatch);
    }
}
