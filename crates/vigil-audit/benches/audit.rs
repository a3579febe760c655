//! Benchmarks the conservation audit over UHS maps of increasing size, with
//! randomized locked/spent partition sizes the way a live shard would hold
//! them.

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use vigil_audit::audit;
use vigil_audit::UhsElement;
use vigil_audit::UhsMap;
use vigil_common::sha256;
use vigil_transaction::calculate_uhs_id;
use vigil_transaction::proof::prove;
use vigil_transaction::CompactOutput;

const EPOCH: u64 = 1000;

fn gen_map(rng: &mut StdRng, map_size: u64, deleted: bool) -> UhsMap {
    // One proof shared across the map; proving dominates setup time and the
    // audit only ever verifies
    let (range, value_commitment) = prove(10, &[0u8; 32]).unwrap();

    let map = UhsMap::new();
    for _ in 0..map_size {
        let out = CompactOutput {
            value_commitment,
            range: range.clone(),
            provenance: sha256(&rng.gen::<[u8; 32]>()),
        };
        let deletion_epoch = deleted.then(|| rng.gen_range(EPOCH - 100..EPOCH + 100));
        let element = UhsElement {
            out,
            creation_epoch: 0,
            deletion_epoch,
        };
        map.insert(calculate_uhs_id(&element.out), element);
    }
    map
}

fn audit_routine(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit");
    group.sample_size(10);

    for key_count in [10u64, 100, 1000] {
        let mut rng = StdRng::seed_from_u64(key_count);

        let locked_size = rng.gen_range(0..=key_count);
        let spent_size = rng.gen_range(0..=key_count - locked_size);

        let uhs = gen_map(&mut rng, key_count, false);
        let locked = gen_map(&mut rng, locked_size, false);
        let spent = gen_map(&mut rng, spent_size, true);

        group.bench_with_input(BenchmarkId::from_parameter(key_count), &key_count, |b, _| {
            b.iter(|| {
                let res = audit(&uhs, &locked, &spent, EPOCH);
                assert!(res.is_some());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, audit_routine);
criterion_main!(benches);
