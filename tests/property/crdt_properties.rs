//! Property-based tests for the chunk CRDT: LSEQ betweenness, ordering
//! laws, and replay determinism under permutation of commuting entries.

use proptest::prelude::*;
use uuid::Uuid;

use xfdocs::shared::crdt::{
    between, replay, Chunk, ChunkList, DocOp, LseqId, OpLogEntry,
};

fn arb_lseq_id() -> impl Strategy<Value = LseqId> {
    prop::collection::vec(1u16..=65535, 1..4)
        .prop_map(|components| LseqId::from_components(components).unwrap())
}

proptest! {
    #[test]
    fn prop_between_is_strictly_between(a in arb_lseq_id(), b in arb_lseq_id()) {
        prop_assume!(a != b);
        let (left, right) = if a < b { (a, b) } else { (b, a) };
        let allocated = between(Some(&left), Some(&right));
        prop_assert!(left < allocated, "{} !< {}", left, allocated);
        prop_assert!(allocated < right, "{} !< {}", allocated, right);
    }

    #[test]
    fn prop_between_open_ends(id in arb_lseq_id()) {
        let after = between(Some(&id), None);
        prop_assert!(id < after);
        let alone = between(None, None);
        prop_assert_eq!(alone.depth(), 1);
    }

    #[test]
    fn prop_id_display_round_trips(id in arb_lseq_id()) {
        let parsed: LseqId = id.to_string().parse().unwrap();
        prop_assert_eq!(parsed, id);
    }

    #[test]
    fn prop_id_ordering_matches_display_ordering(a in arb_lseq_id(), b in arb_lseq_id()) {
        // The padded dot-joined rendering must sort the same way the ids
        // do, because persisted chunk arrays are ordered by rendered id.
        let by_id = a.cmp(&b);
        let by_string = a.to_string().cmp(&b.to_string());
        // The prefix rule maps to '.' (0x2e) sorting below every digit.
        prop_assert_eq!(by_id, by_string);
    }

    #[test]
    fn prop_content_equals_chunk_concat(
        texts in prop::collection::vec("[a-z]{1,8}", 0..10),
    ) {
        let mut list = ChunkList::new();
        let mut last: Option<LseqId> = None;
        for text in &texts {
            let id = list
                .insert_between(last.as_ref(), None, text.clone())
                .unwrap();
            last = Some(id);
        }
        prop_assert_eq!(list.content(), texts.concat());
        prop_assert!(list.is_strictly_ordered());
    }

    #[test]
    fn prop_replay_of_commuting_permutation_converges(
        seed in prop::collection::vec(("[a-z]{1,5}", 1u16..1000), 3..8),
        swap_at in 0usize..6,
    ) {
        // Build a base list, then two independent ops on distinct chunks;
        // replaying them in either order must converge.
        let mut components: Vec<u16> = seed.iter().map(|(_, c)| *c).collect();
        components.sort_unstable();
        components.dedup();
        prop_assume!(components.len() >= 3);

        let base = ChunkList::from_chunks(
            components
                .iter()
                .zip(seed.iter())
                .map(|(c, (text, _))| Chunk {
                    id: LseqId::from_components(vec![*c]).unwrap(),
                    text: text.clone(),
                })
                .collect(),
        );

        let victim = base.chunks()[swap_at % base.len()].clone();
        let neighbor = base.chunks()[(swap_at + 1) % base.len()].clone();
        prop_assume!(victim.id != neighbor.id);

        let user = Uuid::new_v4();
        let delete = OpLogEntry::new(user, DocOp::Delete {
            id: victim.id.clone(),
            text: victim.text.clone(),
        });
        let insert_id = between(Some(&neighbor.id), None);
        prop_assume!(!base.contains(&insert_id));
        prop_assume!(insert_id != victim.id);
        let insert = OpLogEntry::new(user, DocOp::Insert {
            id: insert_id,
            text: "NEW".to_string(),
            left_id: Some(neighbor.id.clone()),
            right_id: None,
        });

        let mut forward = base.clone();
        replay(&mut forward, &[delete.clone(), insert.clone()]);
        let mut backward = base;
        replay(&mut backward, &[insert, delete]);

        prop_assert_eq!(&forward, &backward);
        prop_assert!(forward.is_strictly_ordered());
    }

    #[test]
    fn prop_split_preserves_content(
        text in "[a-z]{1,12}",
        insert in "[A-Z]{1,4}",
        offset_seed in 0usize..16,
    ) {
        let mut list = ChunkList::new();
        let id = list.insert_between(None, None, text.clone()).unwrap();
        let offset = offset_seed % (text.len() + 1);

        list.split_and_insert(&id, offset, insert.clone()).unwrap();

        let expected = format!("{}{}{}", &text[..offset], insert, &text[offset..]);
        prop_assert_eq!(list.content(), expected);
        prop_assert!(list.is_strictly_ordered());
    }
}
