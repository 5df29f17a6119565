use arxiv_research_mcp::client::collapse_whitespace;
use arxiv_research_mcp::{normalize, PaperIdentifier};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_resolve(c: &mut Criterion) {
    c.bench_function("resolve_bare_id", |b| {
        b.iter(|| PaperIdentifier::resolve(black_box("2401.00001v2")))
    });
    c.bench_function("resolve_abstract_url", |b| {
        b.iter(|| PaperIdentifier::resolve(black_box("https://arxiv.org/abs/hep-th/9901001v3")))
    });
    c.bench_function("normalize", |b| b.iter(|| normalize(black_box("2401.00001v12"))));
}

fn bench_collapse(c: &mut Criterion) {
    let page = "Attention   is\n\n all you\tneed. ".repeat(2_000);
    c.bench_function("collapse_whitespace_page", |b| {
        b.iter(|| collapse_whitespace(black_box(&page)))
    });
}

criterion_group!(benches, bench_resolve, bench_collapse);
criterion_main!(benches);
