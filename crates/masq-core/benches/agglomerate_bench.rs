//! # Engine Benchmarks
//!
//! Run with: `cargo bench -p masq-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use masq_core::{
    AgglomerationOptions, Agglomerator, EdgeRecord, Level, MemoryStore, MinCount, NetworkRecord,
    NetworkStore, SequenceIds, SetAlgebra, TaxonRecord,
};
use std::hint::black_box;

/// A network of `size` taxa spread over 10 families and 40 genera, each taxon
/// linked to the next three.
fn create_network(store: &mut MemoryStore, network: &str, size: usize) {
    let taxa: Vec<TaxonRecord> = (0..size)
        .map(|i| {
            TaxonRecord::with_lineage(
                format!("otu{i}"),
                "bench",
                [
                    "Bacteria".to_string(),
                    "Firmicutes".to_string(),
                    "Bacilli".to_string(),
                    "Lactobacillales".to_string(),
                    format!("F{}", i % 10),
                    format!("G{}", i % 40),
                    format!("S{i}"),
                ],
            )
        })
        .collect();
    let edges: Vec<EdgeRecord> = (0..size)
        .flat_map(|i| {
            (1..=3).map(move |step| {
                let weight = if (i + step) % 2 == 0 { 0.5 } else { -0.5 };
                EdgeRecord::new(
                    network,
                    format!("otu{i}"),
                    format!("otu{}", (i + step) % size),
                    Some(weight),
                )
            })
        })
        .collect();
    store
        .ingest_dataset(
            taxa,
            vec![(NetworkRecord::new(network, "bench", size as u64, edges.len() as u64), edges)],
        )
        .expect("ingest");
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_agglomerate_family(c: &mut Criterion) {
    let mut group = c.benchmark_group("agglomerate_family");

    for size in [100, 500, 1000].iter() {
        let mut base = MemoryStore::new();
        create_network(&mut base, "n", *size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &base, |b, base| {
            b.iter(|| {
                let mut store = base.clone();
                let mut engine = Agglomerator::new(
                    &mut store,
                    SequenceIds::new("bench"),
                    AgglomerationOptions::default(),
                );
                black_box(engine.agglomerate(Level::Family, None).expect("agglomerate"))
            });
        });
    }

    group.finish();
}

fn bench_intersection(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersection");

    for size in [100, 1000, 10000].iter() {
        let mut store = MemoryStore::new();
        create_network(&mut store, "a", *size);
        let shifted: Vec<EdgeRecord> = store
            .get_edges("a")
            .expect("edges")
            .into_iter()
            .map(|e| EdgeRecord::new("b", e.target, e.source, e.weight))
            .collect();
        store
            .ingest_dataset(
                Vec::new(),
                vec![(NetworkRecord::new("b", "bench", 0, 0), shifted)],
            )
            .expect("ingest");

        group.bench_with_input(BenchmarkId::from_parameter(size), &store, |b, store| {
            b.iter(|| {
                black_box(
                    SetAlgebra::new(store)
                        .intersection(None, MinCount::All, true)
                        .expect("intersection"),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_agglomerate_family, bench_intersection);

criterion_main!(benches);
