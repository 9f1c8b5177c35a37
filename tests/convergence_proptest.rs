//! Randomized convergence tests.
//!
//! Two replicas edit the same document concurrently (array inserts,
//! deletes, replacements and moves, text edits, object writes, tree inserts
//! and removals) and exchange their operations at random points. After a
//! final exchange both must hold the same document. A third replica replays
//! the whole log with every operation delivered twice and must end up
//! identical as well.

use proptest::prelude::*;
use proptest::test_runner::Config;
use proptest::test_runner::TestCaseError;

use tandem::crdt::Element;
use tandem::crdt::op::Operation;
use tandem::crdt::primitives::ActorId;
use tandem::crdt::primitives::Ticket;
use tandem::crdt::tree::FlatNode;
use tandem::document::Document;

// =============================================================================
// Test Helpers
// =============================================================================

/// Containers created during setup.
struct Handles {
    list: Ticket,
    text: Ticket,
    map: Ticket,
    tree: Ticket,
}

/// Build the shared starting document on `doc` and return the setup log.
fn setup(doc: &mut Document) -> (Handles, Vec<Operation>) {
    let mut log = Vec::new();

    let op = doc.object_set(Ticket::INITIAL, "list", Element::array).unwrap();
    let list = op.executed_at();
    log.push(op);
    let op = doc.object_set(Ticket::INITIAL, "text", Element::text).unwrap();
    let text = op.executed_at();
    log.push(op);
    let op = doc.object_set(Ticket::INITIAL, "map", Element::object).unwrap();
    let map = op.executed_at();
    log.push(op);
    let op = doc.object_set(Ticket::INITIAL, "tree", |t| Element::tree(t, "doc")).unwrap();
    let tree = op.executed_at();
    log.push(op);

    for i in 0..3 {
        log.push(doc.array_push(list, |t| Element::primitive(i, t)).unwrap());
    }
    log.push(doc.text_edit(text, 0, 0, "abc").unwrap());
    log.push(doc.tree_insert(tree, &[], 0, paragraph("p")).unwrap());

    return (Handles { list, text, map, tree }, log);
}

/// A paragraph holding one text leaf; the builder stamps the tickets.
fn paragraph(content: &str) -> Vec<FlatNode> {
    return vec![
        FlatNode::element(Ticket::INITIAL, "p", 1),
        FlatNode::text(Ticket::INITIAL, content),
    ];
}

fn list_len(doc: &Document, list: &Ticket) -> usize {
    return doc.find(list).and_then(|e| e.as_array().ok()).map_or(0, |a| a.len());
}

fn text_len(doc: &Document, text: &Ticket) -> usize {
    return doc.find(text).and_then(|e| e.as_text().ok()).map_or(0, |t| t.len());
}

/// Live child count of each live paragraph under the tree root.
fn paragraphs(doc: &Document, tree: &Ticket) -> Vec<usize> {
    let Some(tree) = doc.find(tree).and_then(|e| e.as_tree().ok()) else {
        return Vec::new();
    };
    let root = tree.root().id();
    return tree.children(&root).map(|p| tree.children(&p.id()).count()).collect();
}

/// Removed nodes still held by the tree. A removed paragraph stays while a
/// concurrently inserted live child remains under it.
fn tree_garbage(doc: &Document, tree: &Ticket) -> usize {
    return doc.find(tree).map_or(0, Element::garbage_len);
}

const KEYS: [&str; 3] = ["x", "y", "z"];

/// Kind of edit that exchanges operations instead of editing.
const SYNC: u8 = 9;

/// One local edit chosen by `kind`. Returns None when it does not apply.
fn local_edit(doc: &mut Document, handles: &Handles, kind: u8, a: u16, b: u16, content: &str) -> Option<Operation> {
    let list_len = list_len(doc, &handles.list);
    let a = a as usize;
    let b = b as usize;
    let op = match kind {
        0 => doc.array_insert(handles.list, a % (list_len + 1), |t| Element::primitive(a as i32, t)),
        1 if list_len > 0 => doc.array_delete(handles.list, a % list_len),
        2 if list_len > 0 => doc.array_set(handles.list, a % list_len, |t| Element::primitive(-(b as i32), t)),
        3 => {
            let len = text_len(doc, &handles.text);
            let from = a % (len + 1);
            let to = from + b % (len - from + 1);
            doc.text_edit(handles.text, from, to, content)
        }
        4 => doc.object_set(handles.map, KEYS[a % KEYS.len()], |t| Element::primitive(b as i32, t)),
        5 => {
            let key = KEYS[a % KEYS.len()];
            let present = doc.find(&handles.map).and_then(|e| e.as_object().ok()).is_some_and(|o| o.has(key));
            if !present {
                return None;
            }
            doc.object_delete(handles.map, key)
        }
        6 if list_len > 0 => {
            let prev = match b % (list_len + 1) {
                0 => None,
                p => Some(p - 1),
            };
            doc.array_move_after(handles.list, prev, a % list_len)
        }
        7 => {
            let paragraphs = paragraphs(doc, &handles.tree);
            let at = a % (paragraphs.len() + 1);
            if at == paragraphs.len() {
                doc.tree_insert(handles.tree, &[], b % (paragraphs.len() + 1), paragraph(content))
            } else {
                let leaf = vec![FlatNode::text(Ticket::INITIAL, content)];
                doc.tree_insert(handles.tree, &[at], b % (paragraphs[at] + 1), leaf)
            }
        }
        8 => {
            let paragraphs = paragraphs(doc, &handles.tree);
            if paragraphs.is_empty() {
                return None;
            }
            let at = a % paragraphs.len();
            match paragraphs[at] {
                0 => doc.tree_remove(handles.tree, &[at]),
                _ if b % 2 == 0 => doc.tree_remove(handles.tree, &[at]),
                leaves => doc.tree_remove(handles.tree, &[at, b % leaves]),
            }
        }
        _ => return None,
    };
    return Some(op.unwrap());
}

/// Deliver the not yet seen part of `outbox` into `to`, logging what was applied.
fn deliver(to: &mut Document, outbox: &[Operation], seen: &mut usize, log: Option<&mut Vec<Operation>>) {
    let pending = &outbox[*seen..];
    for op in pending {
        to.apply(op).unwrap();
    }
    if let Some(log) = log {
        log.extend(pending.iter().cloned());
    }
    *seen = outbox.len();
}

fn verify_convergence(docs: &[&Document]) -> Result<(), TestCaseError> {
    let first = docs[0].snapshot();
    for (i, doc) in docs.iter().enumerate().skip(1) {
        prop_assert_eq!(&doc.snapshot(), &first, "Replica {} diverged from replica 0", i);
    }
    Ok(())
}

fn edit_strategy() -> impl Strategy<Value = (u8, u8, u16, u16, String)> {
    return (0u8..=SYNC, 0u8..2, any::<u16>(), any::<u16>(), "[a-z]{0,3}");
}

// =============================================================================
// Proptest Tests
// =============================================================================

proptest! {
    #![proptest_config(Config {
        cases: 128,
        max_shrink_iters: 1000,
        fork: false,
        ..Config::default()
    })]

    /// Concurrent edits with random exchange points converge.
    #[test]
    fn replicas_converge(edits in prop::collection::vec(edit_strategy(), 1..80)) {
        let mut a = Document::new(ActorId::from_u64(1));
        let mut b = Document::new(ActorId::from_u64(2));

        let (handles, setup_log) = setup(&mut a);
        for op in &setup_log {
            b.apply(op).unwrap();
        }

        // Everything in the order replica A applied it
        let mut log = setup_log.clone();
        let mut a_out: Vec<Operation> = Vec::new();
        let mut b_out: Vec<Operation> = Vec::new();
        let mut a_seen = 0;
        let mut b_seen = 0;

        for (kind, replica, x, y, content) in &edits {
            if *kind == SYNC {
                deliver(&mut a, &b_out, &mut a_seen, Some(&mut log));
                deliver(&mut b, &a_out, &mut b_seen, None);
                continue;
            }
            if *replica == 0 {
                if let Some(op) = local_edit(&mut a, &handles, *kind, *x, *y, content) {
                    log.push(op.clone());
                    a_out.push(op);
                }
            } else if let Some(op) = local_edit(&mut b, &handles, *kind, *x, *y, content) {
                b_out.push(op);
            }
        }

        deliver(&mut a, &b_out, &mut a_seen, Some(&mut log));
        deliver(&mut b, &a_out, &mut b_seen, None);
        verify_convergence(&[&a, &b])?;

        let list = a.find(&handles.list).unwrap().as_array().unwrap();
        prop_assert!(list.check_weights());

        // Replay with duplicates
        let mut c = Document::new(ActorId::from_u64(3));
        for op in &log {
            c.apply(op).unwrap();
            c.apply(op).unwrap();
        }
        verify_convergence(&[&a, &b, &c])?;

        // Once everything is synced all garbage can go, apart from removed
        // tree nodes that still hold live children
        a.garbage_collect(&Ticket::MAX);
        b.garbage_collect(&Ticket::MAX);
        prop_assert_eq!(a.garbage_len(), tree_garbage(&a, &handles.tree));
        prop_assert_eq!(a.garbage_len(), b.garbage_len());
        verify_convergence(&[&a, &b, &c])?;
    }

    /// Delivering one replica's operations in two batches or one is the same.
    #[test]
    fn batching_does_not_matter(
        edits in prop::collection::vec(edit_strategy(), 1..40),
        split in any::<prop::sample::Index>(),
    ) {
        let mut a = Document::new(ActorId::from_u64(1));
        let (handles, mut log) = setup(&mut a);
        for (kind, _, x, y, content) in &edits {
            if let Some(op) = local_edit(&mut a, &handles, *kind, *x, *y, content) {
                log.push(op);
            }
        }

        let mut whole = Document::new(ActorId::from_u64(2));
        for op in &log {
            whole.apply(op).unwrap();
        }

        let mut halves = Document::new(ActorId::from_u64(3));
        let at = split.index(log.len() + 1);
        for op in &log[..at] {
            halves.apply(op).unwrap();
        }
        for op in &log[at..] {
            halves.apply(op).unwrap();
        }

        verify_convergence(&[&a, &whole, &halves])?;
    }
}
