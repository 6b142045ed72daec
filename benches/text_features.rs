use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_text_features::feature_engineering::{
    CountVectorizerConfig, FeatureGenerator, FeatureMetadata, TextNgramConfig,
    TextNgramFeatureGenerator, TextSpecialFeatureGenerator,
};
use polars::prelude::*;
use rand::prelude::*;

const WORDS: [&str; 12] = [
    "price", "quality", "shipping", "fast", "slow", "broken", "great", "terrible", "refund",
    "support", "would", "recommend",
];

fn create_text_data(n_rows: usize) -> DataFrame {
    let mut rng = rand::thread_rng();
    let reviews: Vec<String> = (0..n_rows)
        .map(|_| {
            let len = rng.gen_range(3..12);
            (0..len)
                .map(|_| *WORDS.choose(&mut rng).unwrap())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    DataFrame::new(vec![Series::new("review".into(), reviews).into()]).unwrap()
}

fn bench_ngram(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_ngram");
    group.sample_size(10);
    let metadata = FeatureMetadata::with_text_features(["review"]);

    for n_rows in [1000, 10000].iter() {
        let df = create_text_data(*n_rows);

        group.bench_with_input(BenchmarkId::new("fit_transform", n_rows), &df, |b, df| {
            b.iter(|| {
                let config = TextNgramConfig::default()
                    .with_vectorizer(CountVectorizerConfig::default().with_min_df(2));
                let mut generator = TextNgramFeatureGenerator::new(config).unwrap();
                generator.fit_transform(black_box(df), &metadata).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_special(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_special");
    let metadata = FeatureMetadata::with_text_features(["review"]);
    let df = create_text_data(10000);

    group.bench_function("fit_transform", |b| {
        b.iter(|| {
            let mut generator = TextSpecialFeatureGenerator::default();
            generator.fit_transform(black_box(&df), &metadata).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_ngram, bench_special);
criterion_main!(benches);
