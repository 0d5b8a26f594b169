//! Property-based tests for delivery and reconciliation.
//!
//! Properties verified:
//! - Every send yields exactly one transcript entry, whatever the interleaving
//!   of acks, failures, timeouts, reconnects and manual retries
//! - Transcript identifiers stay unique
//! - A delivered message never returns to `sending` or `error`
//! - At most one automatic retry and one acknowledgement wait exist per message
//! - Unread counts equal the updates from others since the last read

use std::{collections::HashSet, time::Duration};

use parley_core::{
    ChatClient, ClientAction, ClientEvent, ConversationKind, ConversationList, ConversationSeed,
    ConversationSummary, DeliveryStatus, ManualEnv, MessageId, RequestId, SyncConfig, SyncError,
};
use parley_proto::{ConversationId, InboundEvent, UserId, payloads::ConversationUpdated};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Op {
    Send,
    Advance(u64),
    AckDelivered(usize),
    AckRejected(usize),
    TransportFailure(usize),
    Disconnect,
    Connect,
    Retry(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Send),
        3 => (0u64..4_000).prop_map(Op::Advance),
        3 => any::<usize>().prop_map(Op::AckDelivered),
        1 => any::<usize>().prop_map(Op::AckRejected),
        1 => any::<usize>().prop_map(Op::TransportFailure),
        1 => Just(Op::Disconnect),
        1 => Just(Op::Connect),
        1 => any::<usize>().prop_map(Op::Retry),
    ]
}

fn cid(raw: &str) -> ConversationId {
    ConversationId::new(raw).expect("conversation id")
}

fn uid(raw: &str) -> UserId {
    UserId::new(raw).expect("user id")
}

fn collect_requests(actions: &[ClientAction], requests: &mut Vec<RequestId>) {
    for action in actions {
        if let ClientAction::EmitWithAck { request_id, .. } = action {
            requests.push(*request_id);
        }
    }
}

fn pick<T: Copy>(items: &[T], index: usize) -> Option<T> {
    if items.is_empty() { None } else { items.get(index % items.len()).copied() }
}

proptest! {
    #[test]
    fn prop_delivery_invariants_hold(ops in prop::collection::vec(op_strategy(), 0..80)) {
        let env = ManualEnv::new();
        let mut client = ChatClient::new(env.clone(), uid("me"), SyncConfig::default());
        client.handle(ClientEvent::Inbound { scope: None, event: InboundEvent::Connected });
        client.open_conversation(cid("a"), ConversationSeed::default());

        let mut requests = Vec::new();
        let mut sent = 0usize;
        let mut delivered: HashSet<String> = HashSet::new();

        for op in ops {
            let actions = match op {
                Op::Send => {
                    sent += 1;
                    client.send_message(&format!("msg-{sent}"))
                },
                Op::Advance(ms) => {
                    env.advance(Duration::from_millis(ms));
                    client.handle(ClientEvent::Tick)
                },
                Op::AckDelivered(i) => match pick(&requests, i) {
                    Some(request_id) => client.handle(ClientEvent::AckReceived {
                        request_id,
                        payload: json!({ "status": "delivered", "messageId": format!("srv-{}", request_id.0) }),
                    }),
                    None => Vec::new(),
                },
                Op::AckRejected(i) => match pick(&requests, i) {
                    Some(request_id) => client.handle(ClientEvent::AckReceived {
                        request_id,
                        payload: json!({ "status": "error", "error": "rejected" }),
                    }),
                    None => Vec::new(),
                },
                Op::TransportFailure(i) => match pick(&requests, i) {
                    Some(request_id) => client.handle(ClientEvent::AckFailed {
                        request_id,
                        error: SyncError::Transport("reset".into()),
                    }),
                    None => Vec::new(),
                },
                Op::Disconnect => client.handle(ClientEvent::Inbound {
                    scope: None,
                    event: InboundEvent::Disconnected { reason: "lost".into() },
                }),
                Op::Connect => client.handle(ClientEvent::Inbound { scope: None, event: InboundEvent::Connected }),
                Op::Retry(i) => {
                    let ids: Vec<MessageId> = client
                        .view()
                        .map(|v| v.messages().iter().map(|m| m.id.clone()).collect())
                        .unwrap_or_default();
                    match ids.get(i % ids.len().max(1)) {
                        Some(id) => client.retry_message(id),
                        None => Vec::new(),
                    }
                },
            };
            collect_requests(&actions, &mut requests);

            let view = client.view().expect("view stays open");
            let messages = view.messages();
            prop_assert_eq!(messages.len(), sent);

            let ids: HashSet<String> = messages.iter().map(|m| m.id.to_string()).collect();
            prop_assert_eq!(ids.len(), messages.len());

            for message in messages {
                if delivered.contains(&message.content) {
                    prop_assert_eq!(message.status, DeliveryStatus::Delivered);
                }
                if message.status == DeliveryStatus::Delivered {
                    prop_assert!(!message.id.is_local());
                    delivered.insert(message.content.clone());
                } else {
                    prop_assert!(message.id.is_local());
                    let tracked = client.delivery();
                    prop_assert!(
                        !(tracked.is_awaiting_ack(&message.id) && tracked.is_retry_armed(&message.id))
                    );
                    prop_assert_eq!(
                        message.status == DeliveryStatus::Sending,
                        tracked.is_awaiting_ack(&message.id)
                    );
                }
            }
        }
    }

    #[test]
    fn prop_unread_counts_updates_from_others(
        events in prop::collection::vec((0usize..3, any::<bool>(), any::<bool>()), 0..60),
    ) {
        let conversations = ["a", "b", "c"];
        let mut list = ConversationList::new(uid("me"));
        for id in conversations {
            list.enrich(ConversationSummary::new(cid(id), id, ConversationKind::Direct));
        }
        let mut expected = [0u32; 3];

        for (target, from_other, read) in events {
            let id = cid(conversations[target]);
            if read {
                prop_assert!(list.mark_read(&id).is_ok());
                expected[target] = 0;
            } else {
                let sender = if from_other { uid("them") } else { uid("me") };
                list.apply_update(&ConversationUpdated {
                    conversation_id: id,
                    last_message: Some("x".into()),
                    last_message_at: None,
                    sender_id: Some(sender),
                });
                if from_other {
                    expected[target] += 1;
                }
            }

            for (index, name) in conversations.iter().enumerate() {
                prop_assert_eq!(list.unread_count(&cid(name)), Some(expected[index]));
            }
            prop_assert_eq!(list.entries().len(), conversations.len());
        }
    }
}
