use cairn_core::{diff, ArtifactSnapshot, Classifier, Ontology};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn snapshot(properties: usize, offset: usize) -> ArtifactSnapshot {
    let mut snapshot = ArtifactSnapshot::empty();
    for i in 0..properties {
        snapshot
            .properties
            .insert(format!("prop-{}", i + offset), format!("value-{}", i));
    }
    for i in 0..8 {
        snapshot.classifiers.insert(format!("urn:class#{}", i + offset));
    }
    snapshot
}

fn deep_ontology(depth: usize) -> Ontology {
    let o = Ontology::new("http://example.org/bench");
    let mut class = o.create_class(format!("c{}", depth));
    for level in (0..depth).rev() {
        class = o.create_class(format!("c{}", level)).with_child(class);
    }
    o.clone().with_root(class)
}

fn bench_diff(c: &mut Criterion) {
    let old = snapshot(64, 0);
    let new = snapshot(64, 16);

    c.bench_function("audit/diff_64_props", |b| {
        b.iter(|| {
            let delta = diff(black_box(&old), black_box(&new));
            black_box(delta.is_empty());
        });
    });
}

fn bench_normalize(c: &mut Criterion) {
    let ontologies = vec![deep_ontology(32)];
    let classifier = Classifier::new(&ontologies);
    let leaf = "http://example.org/bench#c32";

    c.bench_function("ontology/normalize_depth_32", |b| {
        b.iter(|| {
            let classes = classifier.normalize(black_box(leaf)).expect("normalize");
            black_box(classes.len());
        });
    });
}

criterion_group!(benches, bench_diff, bench_normalize);
criterion_main!(benches);
