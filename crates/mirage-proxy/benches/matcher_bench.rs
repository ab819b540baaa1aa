use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mirage_proxy::cache::{CachedResponse, MatchCache};
use mirage_proxy::config::CacheConfig;
use mirage_proxy::matching::{evaluate_rule, match_request, MatchingStrategy};
use mirage_proxy::models::{
    FieldMatcher, RequestDetails, RequestMatcher, RequestMatcherResponsePair, ResponseDetails,
};
use std::collections::HashMap;

fn create_test_pair(id: usize, is_regex: bool) -> RequestMatcherResponsePair {
    let path = if is_regex {
        FieldMatcher::regex(format!(r"^/api/v\d+/endpoint{id}$"))
    } else {
        FieldMatcher::exact(format!("/api/v1/endpoint{id}"))
    };
    let matcher = RequestMatcher::default()
        .with_method(FieldMatcher::exact("GET"))
        .with_path(path);
    RequestMatcherResponsePair::new(matcher, ResponseDetails::new(200, format!("endpoint {id}")))
}

fn create_pairs(count: usize, is_regex: bool) -> Vec<RequestMatcherResponsePair> {
    (0..count).map(|i| create_test_pair(i, is_regex)).collect()
}

fn request(path: &str) -> RequestDetails {
    RequestDetails::new("GET", "http", "localhost", path, None)
}

fn bench_rule_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_matching");
    let state = HashMap::new();

    for rule_count in [10, 50, 100, 500, 1000].iter() {
        let pairs = create_pairs(*rule_count, false);

        let cases = [
            ("match_first", request("/api/v1/endpoint0")),
            (
                "match_middle",
                request(&format!("/api/v1/endpoint{}", rule_count / 2)),
            ),
            (
                "match_last",
                request(&format!("/api/v1/endpoint{}", rule_count - 1)),
            ),
            ("match_none", request("/not/found")),
        ];

        group.throughput(Throughput::Elements(1));
        for (name, req) in &cases {
            for strategy in [MatchingStrategy::First, MatchingStrategy::Strongest] {
                group.bench_with_input(
                    BenchmarkId::new(format!("{name}_{strategy}"), rule_count),
                    rule_count,
                    |b, _| {
                        b.iter(|| {
                            match_request(
                                black_box(strategy),
                                black_box(req),
                                black_box(&pairs),
                                black_box(&state),
                                false,
                            )
                        });
                    },
                );
            }
        }
    }

    group.finish();
}

fn bench_regex_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("regex_matching");
    let state = HashMap::new();

    for rule_count in [10, 50, 100].iter() {
        let pairs = create_pairs(*rule_count, true);
        let req = request("/api/v1/endpoint50");

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("regex_match", rule_count),
            rule_count,
            |b, _| {
                b.iter(|| {
                    match_request(
                        MatchingStrategy::Strongest,
                        black_box(&req),
                        black_box(&pairs),
                        black_box(&state),
                        false,
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_single_rule_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_rule_eval");
    let state = HashMap::new();

    let json_rule = RequestMatcher::default()
        .with_path(FieldMatcher::exact("/api/v1/test"))
        .with_body(FieldMatcher::json(r#"{"user": {"id": 7}}"#));
    let req = request("/api/v1/test").with_body(r#"{"user": {"id": 7, "name": "x"}, "n": [1, 2]}"#);

    group.throughput(Throughput::Elements(1));
    group.bench_function("exact_and_json_body", |b| {
        b.iter(|| evaluate_rule(black_box(&json_rule), black_box(&req), &state, false));
    });

    group.finish();
}

fn bench_cache_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_cache");
    let cache = MatchCache::new(CacheConfig::default());
    let pairs = create_pairs(1000, false);

    for (i, pair) in pairs.iter().enumerate() {
        cache.set(CachedResponse::matched(
            request(&format!("/api/v1/endpoint{i}")),
            pair.clone(),
        ));
    }

    let hit = request("/api/v1/endpoint500");
    let miss = request("/not/cached");

    group.throughput(Throughput::Elements(1));
    group.bench_function("hit", |b| b.iter(|| cache.get(black_box(&hit))));
    group.bench_function("miss", |b| b.iter(|| cache.get(black_box(&miss))));

    group.finish();
}

criterion_group!(
    benches,
    bench_rule_matching,
    bench_regex_matching,
    bench_single_rule_evaluation,
    bench_cache_lookup,
);
criterion_main!(benches);
