use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use sb_core::host::ElementView;
use sb_core::{resolve, ContentInspector, FilterConfig, KeywordSet, MatchType, NodeView, PageContext, Rule};

fn keywords() -> KeywordSet {
    (0..40).map(|i| format!("tracker{i}")).collect()
}

fn bench_inspect(c: &mut Criterion) {
    let keywords = keywords();
    let inspector = ContentInspector::new(&keywords);

    let mut clean = ElementView::new("script");
    clean.text_content = "function init(){ return document.querySelector('#app'); }".repeat(50);
    clean.src = Some("https://cdn.example.com/static/app.bundle.js".to_string());
    clean.attributes.push(("onload".into(), "init()".into()));
    let clean = NodeView::Element(clean);

    let mut hit = ElementView::new("img");
    hit.attributes.push(("onerror".into(), "tracker39.fire()".into()));
    let hit = NodeView::Element(hit);

    c.bench_function("inspect_clean_script", |b| b.iter(|| inspector.inspect(black_box(&clean))));
    c.bench_function("inspect_handler_hit", |b| b.iter(|| inspector.inspect(black_box(&hit))));
}

fn bench_resolve(c: &mut Criterion) {
    let rules = (0..100)
        .map(|i| {
            Rule::new(format!("rule {i}"), MatchType::Wildcard)
                .with_sites([format!("*.site{i}.com")])
                .with_keywords([format!("kw{i}")])
        })
        .collect();
    let config = FilterConfig {
        rules,
        ..FilterConfig::default()
    };
    let page = PageContext::from_url("https://www.site99.com/watch?v=1");
    c.bench_function("resolve_100_rules", |b| b.iter(|| resolve(black_box(&page), &config)));
}

criterion_group!(benches, bench_inspect, bench_resolve);
criterion_main!(benches);
