use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use serde_json::{json, Value};

use arbor_core::anode::{ANode, Directive, ForDirective};
use arbor_core::dom::MemoryDom;
use arbor_core::expr::{parse_expr, parse_text};
use arbor_core::view::View;

fn template() -> ANode {
    let item = ANode::element("li")
        .child(ANode::text(parse_text("{{i}}: {{item.name}}").unwrap()))
        .directive(Directive::For(ForDirective::new("item", "i", parse_expr("list").unwrap())));
    ANode::element("ul").child(item)
}

fn rows(n: usize) -> Value {
    let list: Vec<Value> = (0..n).map(|i| json!({"name": format!("row {i}")})).collect();
    json!({ "list": list })
}

fn render(n: usize) -> (View<MemoryDom>, arbor_core::data::ScopeId) {
    let mut view = View::new(MemoryDom::new());
    let container = view.dom().container();
    let root = view.bind_and_render(template(), rows(n), container).unwrap();
    let scope = view.data_scope(root).unwrap();
    (view, scope)
}

fn benchmark_initial_render(c: &mut Criterion) {
    c.bench_function("render_1000", |b| b.iter(|| black_box(render(1000))));
}

fn benchmark_splice_middle(c: &mut Criterion) {
    c.bench_function("splice_middle_1000", |b| {
        b.iter_batched(
            || render(1000),
            |(mut view, scope)| {
                view.splice(scope, "list", 500, 1, vec![json!({"name": "x"}), json!({"name": "y"})])
                    .unwrap();
                black_box(view.flush())
            },
            BatchSize::LargeInput,
        )
    });
}

fn benchmark_item_set(c: &mut Criterion) {
    c.bench_function("item_set_1000", |b| {
        b.iter_batched(
            || render(1000),
            |(mut view, scope)| {
                view.set(scope, "list[700].name", json!("changed")).unwrap();
                black_box(view.flush())
            },
            BatchSize::LargeInput,
        )
    });
}

fn benchmark_whole_list_set(c: &mut Criterion) {
    c.bench_function("whole_set_1000", |b| {
        b.iter_batched(
            || render(1000),
            |(mut view, scope)| {
                view.set(scope, "list", rows(900)).unwrap();
                black_box(view.flush())
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    benchmark_initial_render,
    benchmark_splice_middle,
    benchmark_item_set,
    benchmark_whole_list_set
);
criterion_main!(benches);
