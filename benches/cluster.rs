//! Benchmarks for the cluster encoder and the learner loop.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use oaru::action::Action;
use oaru::cluster::{cluster, ClusterOptions, NameAllocator};
use oaru::learner::OaruAlgorithm;
use oaru::model::{Atom, Context, Object};
use oaru::solver::AmoEncoding;

fn p(head: &str, args: &[&str]) -> Atom {
    Atom::new(head, args.iter().map(|a| Object::untyped(*a)).collect())
}

/// A robot moving along a corridor of `len` cells, with every adjacency in
/// the state.
fn corridor_move(robot: &str, len: usize, at: usize) -> (Context, Context) {
    let cells: Vec<String> = (0..len).map(|i| format!("cell{i}")).collect();
    let mut common: Vec<Atom> = cells
        .windows(2)
        .map(|w| p("adjacent", &[w[0].as_str(), w[1].as_str()]))
        .collect();
    common.push(p("battery", &[robot]));
    let mut pre = common.clone();
    pre.push(p("at", &[robot, cells[at].as_str()]));
    let mut post = common;
    post.push(p("at", &[robot, cells[at + 1].as_str()]));
    (Context::from_atoms(pre), Context::from_atoms(post))
}

fn bench_cluster(c: &mut Criterion) {
    let names = NameAllocator::new();
    let (pre1, post1) = corridor_move("r1", 6, 1);
    let (pre2, post2) = corridor_move("r2", 6, 3);
    let left = Action::from_transition("left", &pre1, &post1);
    let right = Action::from_transition("right", &pre2, &post2);

    for (label, amo_encoding) in [
        ("cluster_corridor_quadratic", AmoEncoding::Quadratic),
        ("cluster_corridor_native_amo", AmoEncoding::PseudoBoolean),
    ] {
        let options = ClusterOptions {
            amo_encoding,
            ..ClusterOptions::default()
        };
        c.bench_function(label, |bench| {
            bench.iter(|| black_box(cluster(&left, &right, &options, &names).unwrap()))
        });
    }
}

fn bench_learner(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let robots = ["r1", "r2", "r3"];
    let stream: Vec<(Context, Context)> = (0..12)
        .map(|i| corridor_move(robots.choose(&mut rng).unwrap(), 5, i % 4))
        .collect();

    c.bench_function("learner_12_moves", |bench| {
        bench.iter(|| {
            let mut oaru = OaruAlgorithm::default();
            for (pre, post) in &stream {
                black_box(oaru.action_recognition(pre, post).unwrap());
            }
            oaru.library_len()
        })
    });
}

criterion_group!(benches, bench_cluster, bench_learner);
criterion_main!(benches);
