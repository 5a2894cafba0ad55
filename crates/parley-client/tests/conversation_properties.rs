//! Property-based tests for conversation transitions.
//!
//! Each case runs against a fresh loopback server and compares the
//! conversation with a plain model of the expected state.

use std::collections::BTreeSet;

use futures::executor::block_on;
use parley_client::{Attributes, ClientId, Conversation, StageMode};
use parley_harness::{LoopbackConfig, LoopbackSession};
use parley_proto::ConversationData;
use proptest::prelude::*;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
enum Stage {
    One(String, i64),
    Many(Vec<(String, i64)>, StageMode),
}

fn key() -> impl Strategy<Value = String> {
    "[a-d]"
}

fn stage_strategy() -> impl Strategy<Value = Stage> {
    prop_oneof![
        (key(), any::<i64>()).prop_map(|(k, v)| Stage::One(k, v)),
        (
            prop::collection::vec((key(), any::<i64>()), 0..4),
            prop_oneof![Just(StageMode::Replace), Just(StageMode::Merge)],
        )
            .prop_map(|(pairs, mode)| Stage::Many(pairs, mode)),
    ]
}

fn to_map(pairs: &[(String, i64)]) -> Attributes {
    pairs.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect()
}

fn setup(data: ConversationData) -> Conversation<LoopbackSession> {
    let session = LoopbackSession::new("alice", LoopbackConfig::default());
    let id = data.id.clone();
    session.seed(data);
    let snapshot = session.snapshot(&id).expect("seeded conversation should exist");
    Conversation::from_snapshot(snapshot, session).expect("snapshot should load")
}

fn client_ids(ids: &BTreeSet<String>) -> BTreeSet<ClientId> {
    ids.iter().map(|id| ClientId::from(id.as_str())).collect()
}

proptest! {
    /// INVARIANT: After a successful save, current attributes equal the last
    /// staged value and nothing stays staged.
    #[test]
    fn save_commits_last_staged_attributes(
        committed in prop::collection::vec((key(), any::<i64>()), 0..4),
        stages in prop::collection::vec(stage_strategy(), 1..8),
    ) {
        let committed = to_map(&committed);
        let conversation = setup(ConversationData {
            attributes: committed.clone(),
            ..ConversationData::new("c1")
        });

        let mut model: Option<Attributes> = None;
        for stage in stages {
            match stage {
                Stage::One(k, v) => {
                    conversation.stage_attribute(k.clone(), Value::from(v));
                    model.get_or_insert_with(Map::new).insert(k, Value::from(v));
                },
                Stage::Many(pairs, mode) => {
                    let map = to_map(&pairs);
                    conversation
                        .stage_attributes(Value::Object(map.clone()), mode)
                        .expect("objects always stage");
                    model = Some(match mode {
                        StageMode::Replace => map,
                        StageMode::Merge => {
                            let mut merged = committed.clone();
                            merged.extend(map);
                            merged
                        },
                    });
                },
            }
        }

        block_on(conversation.save()).expect("save should succeed");

        let expected = model.unwrap_or(committed);
        prop_assert_eq!(conversation.current_attributes(), expected.clone());
        prop_assert_eq!(conversation.committed_attributes(), expected);
        prop_assert!(!conversation.pending_attributes().is_staged());
    }

    /// INVARIANT: add(X) then remove(X) restores members when X was disjoint.
    #[test]
    fn add_then_remove_restores_members(
        initial in prop::collection::btree_set("[a-e]", 0..5),
        added in prop::collection::btree_set("[f-j]", 1..5),
    ) {
        let conversation = setup(ConversationData {
            members: initial.iter().cloned().collect(),
            ..ConversationData::new("c1")
        });

        let request: Vec<String> = added.iter().cloned().collect();
        block_on(conversation.add(request.clone())).expect("add should succeed");
        prop_assert_eq!(conversation.members().len(), initial.len() + added.len());

        block_on(conversation.remove(request)).expect("remove should succeed");
        prop_assert_eq!(conversation.members(), client_ids(&initial));
    }

    /// INVARIANT: Adding existing members neither duplicates nor grows.
    #[test]
    fn adding_existing_members_is_idempotent(
        initial in prop::collection::btree_set("[a-e]", 1..5),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..6),
    ) {
        let existing: Vec<String> = initial.iter().cloned().collect();
        let repeated: Vec<String> = picks.iter().map(|i| i.get(&existing).clone()).collect();
        let conversation = setup(ConversationData {
            members: existing.clone(),
            ..ConversationData::new("c1")
        });

        block_on(conversation.add(repeated)).expect("add should succeed");

        prop_assert_eq!(conversation.members(), client_ids(&initial));
    }

    /// INVARIANT: mute adds and unmute removes exactly the local id,
    /// independent of other muted members.
    #[test]
    fn mute_unmute_touch_only_local_id(
        others in prop::collection::btree_set("[b-e]", 0..4),
    ) {
        let conversation = setup(ConversationData {
            muted_members: others.iter().cloned().collect(),
            ..ConversationData::new("c1")
        });
        let mut with_local = client_ids(&others);
        with_local.insert(ClientId::from("alice"));

        block_on(conversation.mute()).expect("mute should succeed");
        prop_assert!(conversation.is_muted());
        prop_assert_eq!(conversation.muted_members(), with_local);

        block_on(conversation.unmute()).expect("unmute should succeed");
        prop_assert!(!conversation.is_muted());
        prop_assert_eq!(conversation.muted_members(), client_ids(&others));
    }
}
