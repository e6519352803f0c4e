use criterion::{black_box, criterion_group, criterion_main, Criterion};
use embercore::pattern::CompiledPattern;

fn bench_literal_match(c: &mut Criterion) {
  let pattern = CompiledPattern::compile("/api/v1/status").unwrap();
  c.bench_function("pattern_match_literal", |b| {
    b.iter(|| black_box(pattern.matches("api/v1/status")))
  });
}

fn bench_typed_segment_match(c: &mut Criterion) {
  let pattern = CompiledPattern::compile("/users/{id:int}/posts/{slug:string}").unwrap();
  c.bench_function("pattern_match_typed_segments", |b| {
    b.iter(|| black_box(pattern.matches("users/42/posts/hello-world")))
  });
}

fn bench_regex_segment_match(c: &mut Criterion) {
  let pattern = CompiledPattern::compile("/tag/{name:regex:^[a-z0-9_-]{1,32}$}").unwrap();
  c.bench_function("pattern_match_regex_segment", |b| {
    b.iter(|| black_box(pattern.matches("tag/some_tag-42")))
  });
}

fn bench_wildcard_match(c: &mut Criterion) {
  let pattern = CompiledPattern::compile("/static/*").unwrap();
  c.bench_function("pattern_match_wildcard", |b| {
    b.iter(|| black_box(pattern.matches("static/assets/js/app.min.js")))
  });
}

criterion_group!(
  benches,
  bench_literal_match,
  bench_typed_segment_match,
  bench_regex_segment_match,
  bench_wildcard_match
);
criterion_main!(benches);
