//! Edge case tests for tandem-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use tandem_engine::{
    codepoint_len, transform_ops, transform_x, Component, DocSnapshot, Document, Error,
    LifecycleState, Operation, RemoteUpdate, Side, SubmitAck,
};

fn ins(p: usize, t: &str) -> Component {
    Component::insert(p, t)
}

fn del(p: usize, t: &str) -> Component {
    Component::delete(p, t)
}

fn op(components: Vec<Component>) -> Operation {
    Operation::from_components(components)
}

fn joined(text: &str, version: u64) -> Document {
    let mut doc = Document::new("doc");
    doc.begin_join().unwrap();
    doc.complete_join(DocSnapshot::new(text, version)).unwrap();
    doc
}

// ============================================================================
// Unicode Edge Cases
// ============================================================================

#[test]
fn insert_between_emoji() {
    let result = Operation::insert(1, "中").apply("😀😀").unwrap();
    assert_eq!(result, "😀中😀");
}

#[test]
fn delete_multibyte_run() {
    let result = Operation::delete(1, "日本").apply("a日本b").unwrap();
    assert_eq!(result, "ab");
}

#[test]
fn combining_sequences_count_each_codepoint() {
    // "e" followed by a combining acute accent is two codepoints
    let text = "e\u{301}x";
    assert_eq!(codepoint_len(text), 3);
    let result = Operation::insert(2, "!").apply(text).unwrap();
    assert_eq!(result, "e\u{301}!x");
}

#[test]
fn delete_text_ending_mid_character() {
    // Three bytes removed from "中" plus one byte of "文" would split "文"
    let err = Operation::delete(0, "中a").apply("中文").unwrap_err();
    assert!(err.is_malformed());
}

#[test]
fn control_and_null_characters() {
    let text = "a\0b\n";
    let result = op(vec![ins(4, "\t"), del(1, "\0")]).apply(text).unwrap();
    assert_eq!(result, "ab\n\t");
}

// ============================================================================
// Boundary Positions
// ============================================================================

#[test]
fn insert_at_start_and_end() {
    let text = "mid";
    assert_eq!(Operation::insert(0, ">").apply(text).unwrap(), ">mid");
    assert_eq!(Operation::insert(3, "<").apply(text).unwrap(), "mid<");
}

#[test]
fn insert_one_past_end() {
    let err = Operation::insert(4, "x").apply("mid").unwrap_err();
    assert!(matches!(err, Error::OffsetOutOfRange { offset: 4, .. }));
}

#[test]
fn delete_entire_text() {
    assert_eq!(Operation::delete(0, "héllo").apply("héllo").unwrap(), "");
}

#[test]
fn empty_operation_and_empty_text() {
    assert_eq!(Operation::new().apply("").unwrap(), "");
    assert_eq!(Operation::new().apply("abc").unwrap(), "abc");
    assert_eq!(Operation::insert(0, "").apply("").unwrap(), "");
}

// ============================================================================
// Sequential Apply
// ============================================================================

#[test]
fn later_components_see_earlier_ones() {
    // The delete at 0 must remove the "X" the first component inserted
    let result = op(vec![ins(0, "X"), del(0, "X"), ins(3, "!")])
        .apply("abc")
        .unwrap();
    assert_eq!(result, "abc!");
}

#[test]
fn composed_operation_equals_sequential_apply() {
    let text = "añb";
    let a = op(vec![ins(1, "中")]);
    let b = op(vec![del(2, "ñ"), ins(0, "😀")]);

    let stepwise = b.apply(&a.apply(text).unwrap()).unwrap();
    let composed = a.compose(b).apply(text).unwrap();
    assert_eq!(stepwise, composed);
    assert_eq!(composed, "😀a中b");
}

#[test]
fn failed_component_discards_earlier_ones() {
    let text = "abc";
    let result = op(vec![ins(0, "X"), del(9, "y")]).apply(text);
    assert!(result.is_err());
    assert_eq!(text, "abc");
}

// ============================================================================
// Split Correctness
// ============================================================================

#[test]
fn delete_split_around_multibyte_insert() {
    let text = "a中文b";
    let delete = Operation::delete(0, "a中文b");
    let insert = Operation::insert(2, "😀");

    let split = transform_ops(&delete, &insert, Side::Left);
    assert_eq!(split.components(), &[del(0, "a中"), del(1, "文b")]);

    let after_insert = insert.apply(text).unwrap();
    assert_eq!(split.apply(&after_insert).unwrap(), "😀");
}

#[test]
fn split_pieces_meet_later_components() {
    // The remote insert splits the first delete; the second delete must
    // still land on "d" afterwards.
    let text = "abcd";
    let local = op(vec![del(0, "abc"), del(0, "d")]);
    let remote = Operation::insert(1, "X");

    let (local2, remote2) = transform_x(&local, &remote);
    let via_local = remote2.apply(&local.apply(text).unwrap()).unwrap();
    let via_remote = local2.apply(&remote.apply(text).unwrap()).unwrap();
    assert_eq!(via_local, "X");
    assert_eq!(via_remote, "X");
}

#[test]
fn concurrent_deletes_of_same_text() {
    let a = Operation::delete(1, "中文");
    let b = Operation::delete(1, "中文");
    let (a2, b2) = transform_x(&a, &b);
    assert!(a2.is_empty());
    assert!(b2.is_empty());
    assert_eq!(a2.apply("xy").unwrap(), "xy");
    assert_eq!(b2.apply("xy").unwrap(), "xy");
}

// ============================================================================
// Document Scenarios
// ============================================================================

#[test]
fn hello_world_scenario() {
    let mut doc = joined("Hello World", 0);

    doc.submit_local_edit(Operation::insert(5, " Beautiful")).unwrap();
    let submission = doc.flush().unwrap();
    assert_eq!(submission.version, 0);
    assert_eq!(submission.baseline, "Hello World");

    let applied = doc
        .apply_remote(RemoteUpdate {
            op: Operation::insert(5, "!"),
            version: 0,
        })
        .unwrap();
    assert_eq!(applied.render, Operation::insert(15, "!"));
    assert!(applied.resubmit.is_none());
    assert_eq!(doc.content(), Some("Hello Beautiful! World"));
    assert_eq!(doc.server_content(), Some("Hello! World"));

    let next = doc.acknowledge(SubmitAck { version: 1 }).unwrap();
    assert!(next.is_none());
    assert_eq!(doc.version(), Some(2));
    assert_eq!(doc.server_content(), Some("Hello Beautiful! World"));
    assert_eq!(doc.content(), doc.server_content());
    doc.check_invariants().unwrap();
}

#[test]
fn at_most_one_inflight_across_many_edits() {
    let mut doc = joined("", 0);
    let mut sent = 0;

    for (i, ch) in "héllo".chars().enumerate() {
        doc.submit_local_edit(Operation::insert(i, ch.to_string()))
            .unwrap();
        if doc.flush().is_some() {
            sent += 1;
        }
    }

    assert_eq!(sent, 1);
    assert_eq!(doc.inflight(), Some(&Operation::insert(0, "h")));
    assert_eq!(doc.pending().map(Operation::len), Some(4));

    let next = doc.acknowledge(SubmitAck { version: 0 }).unwrap().unwrap();
    assert_eq!(next.version, 1);
    assert!(doc.flush().is_none());
    doc.acknowledge(SubmitAck { version: 1 }).unwrap();
    assert_eq!(doc.server_content(), Some("héllo"));
    assert!(doc.inflight().is_none());
}

#[test]
fn version_advances_by_one_per_operation() {
    let mut doc = joined("", 10);
    let mut last = doc.version().unwrap();

    for i in 0..3 {
        doc.apply_remote(RemoteUpdate {
            op: Operation::insert(0, "r"),
            version: last,
        })
        .unwrap();
        assert_eq!(doc.version(), Some(last + 1));
        last += 1;

        doc.submit_local_edit(Operation::insert(i, "l")).unwrap();
        doc.flush().unwrap();
        doc.acknowledge(SubmitAck { version: last }).unwrap();
        assert_eq!(doc.version(), Some(last + 1));
        last += 1;
    }

    assert_eq!(last, 16);
    doc.check_invariants().unwrap();
}

#[test]
fn remote_delete_overlapping_pending_edit() {
    let mut doc = joined("abcdef", 0);
    doc.submit_local_edit(Operation::delete(1, "bcd")).unwrap();
    doc.flush().unwrap();
    doc.submit_local_edit(Operation::insert(2, "中")).unwrap();
    assert_eq!(doc.content(), Some("ae中f"));

    doc.apply_remote(RemoteUpdate {
        op: Operation::delete(2, "cde"),
        version: 0,
    })
    .unwrap();
    assert_eq!(doc.server_content(), Some("abf"));
    assert_eq!(doc.content(), Some("a中f"));
    doc.check_invariants().unwrap();

    doc.acknowledge(SubmitAck { version: 1 }).unwrap();
    assert_eq!(doc.server_content(), Some("af"));
    assert_eq!(doc.pending(), None);
    assert_eq!(doc.inflight(), Some(&Operation::insert(1, "中")));
}

#[test]
fn late_acks_after_two_confirming_updates() {
    let mut doc = joined("ab", 0);
    doc.submit_local_edit(Operation::insert(0, "x")).unwrap();
    doc.flush().unwrap();
    doc.submit_local_edit(Operation::insert(3, "y")).unwrap();

    // "x" was committed at 0, so this update at 1 confirms it
    let applied = doc
        .apply_remote(RemoteUpdate {
            op: Operation::insert(2, "!"),
            version: 1,
        })
        .unwrap();
    let second = applied.resubmit.unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(second.op, Operation::insert(4, "y"));
    assert_eq!(doc.content(), Some("xa!by"));

    doc.submit_local_edit(Operation::insert(0, "z")).unwrap();

    // "y" was committed at 2, so this update at 3 confirms it too
    let applied = doc
        .apply_remote(RemoteUpdate {
            op: Operation::insert(0, "#"),
            version: 3,
        })
        .unwrap();
    let third = applied.resubmit.unwrap();
    assert_eq!(third.version, 4);
    assert_eq!(third.baseline, "#xa!by");
    assert_eq!(doc.content(), Some("z#xa!by"));

    // Both acknowledgements are still on their way
    assert!(doc.acknowledge(SubmitAck { version: 0 }).unwrap().is_none());
    assert!(doc.acknowledge(SubmitAck { version: 2 }).unwrap().is_none());
    assert_eq!(doc.inflight(), Some(&Operation::insert(0, "z")));
    assert_eq!(doc.version(), Some(4));

    doc.acknowledge(SubmitAck { version: 4 }).unwrap();
    assert_eq!(doc.server_content(), Some("z#xa!by"));
    assert_eq!(doc.content(), doc.server_content());
    doc.check_invariants().unwrap();
}

#[test]
fn rejoin_resets_version_and_queues() {
    let mut doc = joined("abc", 4);
    doc.submit_local_edit(Operation::insert(0, "x")).unwrap();
    doc.flush().unwrap();
    doc.submit_local_edit(Operation::insert(0, "y")).unwrap();

    doc.begin_rejoin(1).unwrap();
    assert_eq!(doc.state(), LifecycleState::Rejoining { attempt: 1 });
    assert!(doc.flush().is_none());

    doc.complete_join(DocSnapshot::new("server", 2)).unwrap();
    assert_eq!(doc.version(), Some(2));
    assert!(doc.inflight().is_none());
    assert!(doc.pending().is_none());
    assert_eq!(doc.content(), Some("server"));
}

#[test]
fn detached_document_rejects_everything() {
    let mut doc = joined("abc", 0);
    doc.detach();
    assert_eq!(doc.state(), LifecycleState::Detached);
    assert!(doc.submit_local_edit(Operation::insert(0, "x")).is_err());
    assert!(doc.acknowledge(SubmitAck { version: 0 }).is_err());
    assert!(doc.begin_rejoin(1).unwrap());
}
