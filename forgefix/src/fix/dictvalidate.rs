//! Dictionary-driven structural and schema validation of a parsed [`Message`], producing the
//! `SessionRejectReason`/`BusinessRejectReason` outcome a session should reply with. Distinct
//! from `validate.rs`, which checks session-level admin invariants (CompIDs, SendingTime) that
//! don't depend on a data dictionary at all.

use crate::fix::dictionary::{Container, Dictionary};
use crate::fix::fieldmap::FieldMap;
use crate::fix::generated::{BusinessRejectReason, SessionRejectReason};
use crate::fix::message::Message;

use log::debug;

/// The two ways a dictionary-driven reject can be communicated, per spec.md §4.6: a session
/// `Reject(MsgType=3)` carrying a `SessionRejectReason`, or (for BeginString >= FIX.4.2
/// application-level problems) a `BusinessMessageReject` carrying a `BusinessRejectReason`.
#[derive(Debug, PartialEq, Eq)]
pub enum RejectOutcome {
    Session {
        reason: SessionRejectReason,
        ref_tag_id: Option<u32>,
        text: String,
    },
    Business {
        reason: BusinessRejectReason,
        text: String,
    },
}

/// Runs every structural and schema check spec.md §4.6 requires and returns the first
/// violation found, in the order: structural checks, then schema checks against `dict`.
/// `None` means the message is valid for this dictionary.
pub fn validate(msg: &Message, dict: &Dictionary, fix_version_at_least_42: bool) -> Option<RejectOutcome> {
    if let Some(outcome) = validate_structure(msg, dict) {
        return Some(outcome);
    }
    validate_schema(msg, dict, fix_version_at_least_42)
}

fn validate_structure(msg: &Message, dict: &Dictionary) -> Option<RejectOutcome> {
    if msg.header.has_duplicate_tags() || msg.body.has_duplicate_tags() || msg.trailer.has_duplicate_tags() {
        return Some(reject(SessionRejectReason::REPEATED_TAG, None, "Tag appears more than once"));
    }
    if dict.checks.fields_out_of_order && !msg.well_formed {
        return Some(reject(
            SessionRejectReason::TAG_SPECIFIED_OUT_OF_REQUIRED_ORDER,
            None,
            "Tag specified out of required order",
        ));
    }
    None
}

fn validate_schema(msg: &Message, dict: &Dictionary, fix_version_at_least_42: bool) -> Option<RejectOutcome> {
    let Some(msg_type) = msg.msg_type() else {
        return Some(reject(SessionRejectReason::REQUIRED_TAG_MISSING, Some(35), "MsgType missing"));
    };

    if !dict.is_msg_type(&msg_type) {
        if !dict.checks.unknown_msg_type {
            return None;
        }
        debug!("unknown MsgType {}", msg_type);
        return Some(if fix_version_at_least_42 {
            RejectOutcome::Business {
                reason: BusinessRejectReason::UNSUPPORTED_MESSAGE_TYPE,
                text: format!("Unsupported message type {}", msg_type),
            }
        } else {
            reject(SessionRejectReason::INVALID_MSGTYPE, Some(35), "Invalid MsgType")
        });
    }

    let container = Container::MsgType(msg_type.clone());

    if dict.checks.required_fields {
        if let Some(outcome) = check_required_fields(&msg.body, &container, dict) {
            return Some(outcome);
        }
    }
    if let Some(outcome) = check_fields(&msg.body, &container, &msg_type, dict) {
        return Some(outcome);
    }
    if dict.checks.required_fields {
        if let Some(outcome) = check_required_fields_in_header_trailer(msg, dict) {
            return Some(outcome);
        }
    }
    None
}

fn check_required_fields_in_header_trailer(msg: &Message, dict: &Dictionary) -> Option<RejectOutcome> {
    for tag in dict.field_order(&Container::Header) {
        if dict.is_required(&Container::Header, *tag) && !msg.header.contains(*tag) {
            return Some(reject(SessionRejectReason::REQUIRED_TAG_MISSING, Some(*tag), "Required header tag missing"));
        }
    }
    for tag in dict.field_order(&Container::Trailer) {
        if dict.is_required(&Container::Trailer, *tag) && !msg.trailer.contains(*tag) {
            return Some(reject(SessionRejectReason::REQUIRED_TAG_MISSING, Some(*tag), "Required trailer tag missing"));
        }
    }
    None
}

/// Walks required-field membership recursively into every present repeating group occurrence,
/// matching QuickFIX's `DataDictionary::checkHasRequired` tree walk.
fn check_required_fields(body: &FieldMap, container: &Container, dict: &Dictionary) -> Option<RejectOutcome> {
    for tag in dict.field_order(container) {
        if dict.is_required(container, *tag) && !body.contains(*tag) {
            return Some(reject(SessionRejectReason::REQUIRED_TAG_MISSING, Some(*tag), "Required tag missing"));
        }
    }
    for tag in body.ordered_tags() {
        if let Some((_, group_idx)) = dict.group_info(container, tag) {
            let schema = dict.group_schema(group_idx);
            for occ in body.group_occurrences(tag) {
                if let Some(outcome) = check_required_fields(occ, &Container::Group(group_idx), dict) {
                    return Some(outcome);
                }
                let _ = schema;
            }
        }
    }
    None
}

fn check_fields(body: &FieldMap, container: &Container, msg_type: &str, dict: &Dictionary) -> Option<RejectOutcome> {
    for field in body.iter() {
        let tag = field.tag();
        if dict.checks.fields_have_values && field.value().is_empty() {
            return Some(reject(SessionRejectReason::TAG_SPECIFIED_WITHOUT_A_VALUE, Some(tag), "Tag specified without a value"));
        }
        if dict.checks.unknown_fields && !dict.is_field(tag) {
            return Some(reject(SessionRejectReason::UNDEFINED_TAG, Some(tag), "Undefined tag"));
        }
        let is_user_defined = dict.is_user_defined(tag);
        if !(is_user_defined && !dict.checks.user_defined_fields) {
            let allowed = match container {
                Container::MsgType(_) => dict.is_in_message(msg_type, tag),
                Container::Group(idx) => dict.group_schema(*idx).fields.allowed.contains(&tag),
                Container::Header => dict.is_header_field(tag),
                Container::Trailer => dict.is_trailer_field(tag),
            };
            if !allowed {
                return Some(reject(
                    SessionRejectReason::TAG_NOT_DEFINED_FOR_THIS_MESSAGE_TYPE,
                    Some(tag),
                    "Tag not defined for this message type",
                ));
            }
        }
        if dict.field_has_enum(tag) && !dict.enum_allowed(tag, field.value()) {
            return Some(reject(SessionRejectReason::VALUE_IS_INCORRECT, Some(tag), "Value is incorrect"));
        }
    }
    for tag in body.ordered_tags() {
        if let Some((_, group_idx)) = dict.group_info(container, tag) {
            let expected_count = body.group_count(tag);
            let actual_count = body.group_occurrences(tag).len() as u32;
            if expected_count != actual_count {
                return Some(reject(
                    SessionRejectReason::INCORRECT_NUMINGROUP_COUNT_FOR_REPEATING_GROUP,
                    Some(tag),
                    "Incorrect NumInGroup count for repeating group",
                ));
            }
            for occ in body.group_occurrences(tag) {
                if let Some(outcome) = check_fields(occ, &Container::Group(group_idx), msg_type, dict) {
                    return Some(outcome);
                }
            }
        }
    }
    None
}

fn reject(reason: SessionRejectReason, ref_tag_id: Option<u32>, text: &str) -> RejectOutcome {
    RejectOutcome::Session { reason, ref_tag_id, text: text.to_string() }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fix::dictionary::Dictionary;

    const DICT: &str = r#"
    <fix type="FIX" major="4" minor="2">
      <header>
        <field name="BeginString" required="Y"/>
        <field name="BodyLength" required="Y"/>
        <field name="MsgType" required="Y"/>
      </header>
      <trailer><field name="CheckSum" required="Y"/></trailer>
      <messages>
        <message name="NewOrderSingle" msgtype="D">
          <field name="ClOrdID" required="Y"/>
          <field name="Symbol" required="Y"/>
          <field name="Side" required="N"/>
        </message>
      </messages>
      <fields>
        <field number="8" name="BeginString" type="STRING"/>
        <field number="9" name="BodyLength" type="LENGTH"/>
        <field number="35" name="MsgType" type="STRING"/>
        <field number="10" name="CheckSum" type="STRING"/>
        <field number="11" name="ClOrdID" type="STRING"/>
        <field number="55" name="Symbol" type="STRING"/>
        <field number="54" name="Side" type="CHAR">
          <value enum="1" description="BUY"/>
          <value enum="2" description="SELL"/>
        </field>
      </fields>
    </fix>"#;

    fn dict() -> Dictionary {
        Dictionary::load_str(DICT).unwrap()
    }

    fn msg(bytes: &[u8]) -> Message {
        Message::from_wire(bytes, None, Some(&dict()), false).unwrap()
    }

    #[test]
    fn test_valid_message_passes() {
        let d = dict();
        let m = msg(b"8=FIX.4.2\x019=0\x0135=D\x0111=abc\x0155=IBM\x0110=000\x01");
        assert_eq!(validate(&m, &d, true), None);
    }

    #[test]
    fn test_missing_required_field() {
        let d = dict();
        let m = msg(b"8=FIX.4.2\x019=0\x0135=D\x0155=IBM\x0110=000\x01");
        assert_eq!(
            validate(&m, &d, true),
            Some(reject(SessionRejectReason::REQUIRED_TAG_MISSING, Some(11), "Required tag missing"))
        );
    }

    #[test]
    fn test_undefined_tag_rejected() {
        let d = dict();
        let m = msg(b"8=FIX.4.2\x019=0\x0135=D\x0111=abc\x0155=IBM\x019999=x\x0110=000\x01");
        assert_eq!(
            validate(&m, &d, true),
            Some(reject(SessionRejectReason::UNDEFINED_TAG, Some(9999), "Undefined tag"))
        );
    }

    #[test]
    fn test_enum_violation_rejected() {
        let d = dict();
        let m = msg(b"8=FIX.4.2\x019=0\x0135=D\x0111=abc\x0155=IBM\x0154=9\x0110=000\x01");
        assert_eq!(
            validate(&m, &d, true),
            Some(reject(SessionRejectReason::VALUE_IS_INCORRECT, Some(54), "Value is incorrect"))
        );
    }

    #[test]
    fn test_unknown_msg_type_business_reject_at_42() {
        let d = dict();
        let m = Message::from_wire(b"8=FIX.4.2\x019=0\x0135=Z\x0110=000\x01", None, None, false).unwrap();
        assert_eq!(
            validate(&m, &d, true),
            Some(RejectOutcome::Business {
                reason: BusinessRejectReason::UNSUPPORTED_MESSAGE_TYPE,
                text: "Unsupported message type Z".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_msg_type_session_reject_below_42() {
        let d = dict();
        let m = Message::from_wire(b"8=FIX.4.0\x019=0\x0135=Z\x0110=000\x01", None, None, false).unwrap();
        assert_eq!(
            validate(&m, &d, false),
            Some(reject(SessionRejectReason::INVALID_MSGTYPE, Some(35), "Invalid MsgType"))
        );
    }
}
