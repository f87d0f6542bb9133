use criterion::{criterion_group, criterion_main, Criterion};
use gazette_core::classify::NumberFormat;
use gazette_core::normalize::Parser;
use gazette_core::stopwords;

fn bench_normalize(c: &mut Criterion) {
    let text = "The U.S. economy grew 3.5 percent between 1980 and 1990, \
                adding $2.5 million in cross-border trade on May 14. \
                Analysts expect a 10% rise, roughly 1,000,000 dollars, \
                in the next quarter."
        .repeat(50);
    let parser = Parser::new(true, stopwords::builtin(), NumberFormat::default());
    c.bench_function("normalize_newswire", |b| b.iter(|| parser.normalize(&text)));
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
