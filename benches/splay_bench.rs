// Benchmarks for positional addressing: the splay tree on its own and the
// sequence containers built on it.

use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use tandem::crdt::primitives::{ActorId, NodeId, SplayTree, Ticket, Weighted};
use tandem::crdt::tree::FlatNode;
use tandem::crdt::Element;
use tandem::crdt::Tree;
use tandem::document::Document;

const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

#[derive(Clone)]
struct Unit;

impl Weighted for Unit {
    fn weight(&self) -> u64 {
        return 1;
    }
}

fn filled(size: usize) -> (SplayTree<Unit>, Vec<NodeId>) {
    let mut tree = SplayTree::new();
    let ids = (0..size).map(|_| tree.push(Unit)).collect();
    return (tree, ids);
}

// =============================================================================
// Splay tree
// =============================================================================

fn bench_random_inserts(c: &mut Criterion) {
    let mut group = c.benchmark_group("splay_random_insert");
    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(42);
                let mut tree = SplayTree::new();
                for _ in 0..size {
                    let prev = match tree.len() {
                        0 => None,
                        len => tree.find(rng.gen_range(0..len as u64)).map(|(id, _)| id),
                    };
                    tree.insert_after(prev, Unit);
                }
                black_box(tree.total_weight())
            });
        });
    }
    group.finish();
}

fn bench_random_finds(c: &mut Criterion) {
    let mut group = c.benchmark_group("splay_random_find");
    for size in SIZES {
        let (mut tree, _) = filled(size);
        let mut rng = StdRng::seed_from_u64(7);
        let positions: Vec<u64> = (0..1_000).map(|_| rng.gen_range(0..size as u64)).collect();

        group.throughput(Throughput::Elements(positions.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &positions, |b, positions| {
            b.iter(|| {
                for pos in positions {
                    black_box(tree.find(*pos));
                }
            });
        });
    }
    group.finish();
}

fn bench_random_deletes(c: &mut Criterion) {
    let mut group = c.benchmark_group("splay_random_delete");
    for size in SIZES {
        let (tree, mut ids) = filled(size);
        ids.shuffle(&mut StdRng::seed_from_u64(3));

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &ids, |b, ids| {
            b.iter(|| {
                let mut tree = tree.clone();
                for id in ids {
                    tree.delete(*id);
                }
                black_box(tree.len())
            });
        });
    }
    group.finish();
}

// =============================================================================
// Containers
// =============================================================================

fn bench_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_typing");
    for size in [1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut doc = Document::new(ActorId::from_u64(1));
                let text = doc
                    .object_set(Ticket::INITIAL, "text", Element::text)
                    .map(|op| op.executed_at())
                    .unwrap();
                for i in 0..size {
                    doc.text_edit(text, i, i, "x").unwrap();
                }
                black_box(doc.garbage_len())
            });
        });
    }
    group.finish();
}

fn bench_array_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_insert_delete");
    for size in [1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(9);
                let mut doc = Document::new(ActorId::from_u64(1));
                let list = doc
                    .object_set(Ticket::INITIAL, "list", Element::array)
                    .map(|op| op.executed_at())
                    .unwrap();
                for i in 0..size {
                    let index = rng.gen_range(0..=i);
                    doc.array_insert(list, index, |t| Element::primitive(i as i64, t)).unwrap();
                }
                for i in 0..size {
                    let index = rng.gen_range(0..size - i);
                    doc.array_delete(list, index).unwrap();
                }
                black_box(doc.garbage_collect(&Ticket::MAX))
            });
        });
    }
    group.finish();
}

/// Root plus paragraphs holding one text leaf each, `size` nodes in total.
fn flat_document(size: usize) -> Vec<FlatNode> {
    let actor = ActorId::from_u64(1);
    let paragraphs = (size - 1) / 2;
    let mut flat = Vec::with_capacity(size);
    flat.push(FlatNode::element(Ticket::new(1, 0, actor), "doc", paragraphs));
    for i in 0..paragraphs {
        let lamport = 2 + i as u64;
        flat.push(FlatNode::element(Ticket::new(lamport, 0, actor), "p", 1));
        flat.push(FlatNode::text(Ticket::new(lamport, 1, actor), "hello"));
    }
    return flat;
}

fn bench_tree_flat_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_flat_round_trip");
    for size in [10_001, 20_001, 30_001] {
        let flat = flat_document(size);
        let tree = Tree::from_flat_nodes(flat[0].id, &flat).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            b.iter(|| {
                let flat = tree.to_flat_nodes();
                black_box(Tree::from_flat_nodes(flat[0].id, &flat).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_random_inserts,
    bench_random_finds,
    bench_random_deletes,
    bench_typing,
    bench_array_churn,
    bench_tree_flat_round_trip,
);
criterion_main!(benches);
