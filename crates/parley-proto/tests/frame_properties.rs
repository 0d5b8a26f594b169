//! Property and snapshot tests for the wire contract.
//!
//! Properties verified:
//! - Decoding arbitrary text never panics
//! - Identifier normalization is independent of field spelling and scalar type
//! - Outbound payloads keep the exact shapes the server expects

use parley_proto::{
    ConversationId, EventKind, Frame, InboundEvent, OutboundEvent, UserId,
    payloads::{ConversationMember, SendAck, SendMessage},
};
use proptest::prelude::*;
use serde_json::json;

fn member(conversation: &str, user: &str) -> ConversationMember {
    ConversationMember {
        conversation_id: ConversationId::new(conversation).expect("conversation id"),
        user_id: UserId::new(user).expect("user id"),
    }
}

proptest! {
    #[test]
    fn prop_decode_never_panics(text in ".*") {
        let _ = Frame::decode(&text);
    }

    #[test]
    fn prop_numeric_ids_normalize(n in any::<u64>(), pad in 0usize..3) {
        let padded = format!("{}{n}{}", " ".repeat(pad), " ".repeat(pad));
        let from_number = ConversationId::from_value(&json!(n));
        let from_text = ConversationId::from_value(&json!(padded));
        prop_assert!(from_number.is_some());
        prop_assert_eq!(from_number, from_text);
    }

    #[test]
    fn prop_field_spelling_is_irrelevant(
        id in "[a-z0-9]{1,12}",
        field in prop::sample::select(vec!["conversationId", "conversation_id", "id"]),
    ) {
        let mut payload = serde_json::Map::new();
        payload.insert(field.to_owned(), json!(id.clone()));
        payload.insert("lastMessage".to_owned(), json!("hey"));
        payload.insert("senderId".to_owned(), json!("u9"));

        let event = InboundEvent::decode(EventKind::ConversationUpdated, &payload.into());
        let Ok(InboundEvent::ConversationUpdated(update)) = event else {
            return Err(TestCaseError::fail(format!("unexpected decode result: {event:?}")));
        };
        prop_assert_eq!(update.conversation_id.as_str(), id.as_str());
        prop_assert_eq!(update.sender_id, UserId::new("u9"));
    }
}

#[test]
fn leave_conversation_frame_shape() {
    let event = OutboundEvent::LeaveConversation(ConversationId::new("c1").expect("id"));
    let frame = Frame::event(event.name(), event.payload().expect("payload"));
    insta::assert_snapshot!(frame.encode().expect("encode"), @r#"{"type":"event","event":"leave_conversation","data":"c1"}"#);
}

#[test]
fn ack_frame_shape() {
    let frame = Frame::ack(7, serde_json::Value::Null);
    insta::assert_snapshot!(frame.encode().expect("encode"), @r#"{"type":"ack","id":7,"data":null}"#);
}

#[test]
fn send_message_payload_uses_camel_case() {
    let event = OutboundEvent::SendMessage(SendMessage {
        conversation_id: ConversationId::new("c1").expect("id"),
        content: "hello".into(),
        user_id: UserId::new("u1").expect("id"),
    });

    assert_eq!(event.name(), "send_message");
    assert_eq!(
        event.payload().expect("payload"),
        json!({ "conversationId": "c1", "content": "hello", "userId": "u1" })
    );
}

#[test]
fn membership_events_share_payload_shape() {
    let expected = json!({ "conversationId": "c1", "userId": "u1" });
    let events = [
        OutboundEvent::JoinConversation(member("c1", "u1")),
        OutboundEvent::UserTyping(member("c1", "u1")),
        OutboundEvent::UserStopTyping(member("c1", "u1")),
        OutboundEvent::AllMessagesRead(member("c1", "u1")),
    ];
    for event in events {
        assert_eq!(event.payload().expect("payload"), expected, "{}", event.name());
    }
}

#[test]
fn ack_parsing() {
    let ack = SendAck::from_value(&json!({
        "status": "Delivered",
        "messageId": 55,
        "timestamp": "2024-05-01T12:00:00Z",
    }))
    .expect("ack");
    assert!(ack.is_delivered());
    assert_eq!(ack.message_id.as_deref(), Some("55"));

    let rejected = SendAck::from_value(&json!({ "status": "error", "error": "too long" }))
        .expect("ack");
    assert!(!rejected.is_delivered());
    assert_eq!(rejected.error.as_deref(), Some("too long"));

    assert!(SendAck::from_value(&json!("delivered")).is_err());
}
