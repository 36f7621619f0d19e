//! Keyed list reconciliation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trellis_core::dom::{ElementBuilder, KeyedList, View};
use trellis_core::reactive::Observable;
use trellis_core::Document;

fn mounted(len: usize) -> (Document, KeyedList<u32, u32>, Observable<Vec<u32>>) {
    let doc = Document::new();
    let host = doc.create_element("ul");
    let items = Observable::new_sync((0..len as u32).collect::<Vec<_>>());
    let factory_doc = doc.clone();
    let list = KeyedList::new(&doc, &items, |n: &u32| *n, move |n: &u32| {
        let li = ElementBuilder::new("li")
            .text(n.to_string())
            .build(&factory_doc)
            .expect("li builds");
        View::Node(li)
    });
    list.mount(host, None).expect("mount");
    (doc, list, items)
}

fn bench_reorder(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_list");

    for len in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::new("rotate", len), &len, |b, &len| {
            let (_doc, list, items) = mounted(len);
            b.iter(|| {
                let mut next = items.get();
                next.rotate_right(1);
                items.set(next).expect("root write");
                black_box(list.len());
            });
        });

        group.bench_with_input(BenchmarkId::new("reverse", len), &len, |b, &len| {
            let (_doc, list, items) = mounted(len);
            b.iter(|| {
                let mut next = items.get();
                next.reverse();
                items.set(next).expect("root write");
                black_box(list.len());
            });
        });

        group.bench_with_input(BenchmarkId::new("replace_all", len), &len, |b, &len| {
            let (_doc, list, items) = mounted(len);
            let mut offset = len as u32;
            b.iter(|| {
                items
                    .set((offset..offset + len as u32).collect())
                    .expect("root write");
                offset += len as u32;
                black_box(list.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reorder);
criterion_main!(benches);
