//! # Jukebox Performance Benchmarks
//!
//! Benchmarks for the hot paths of a recommendation request and of queue editing.
//!
//! ## Benchmark Categories
//!
//! - **Similarity**: cosine similarity at both vector sizes
//! - **Recommendation**: full requests over a general table of realistic size
//! - **Dataset Loading**: CSV parsing
//! - **Queue Operations**: moves, removals and shuffles on a long queue
//!
//! ## Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Run specific benchmark group
//! cargo bench similarity
//! cargo bench recommend
//! cargo bench queue
//! ```

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use jukebox::attributes::{AttributeStore, AttributeTable, Dataset, GENERAL_FEATURES};
use jukebox::queue::PlaybackQueue;
use jukebox::recommend::{Mood, RecommendOptions, Recommender};
use jukebox::similarity::cosine_similarity;
use jukebox::track::TrackRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::Arc;

const GENRES: [&str; 7] = ["pop", "country", "blues", "jazz", "reggae", "rock", "hip hop"];

/// A general-table CSV with `rows` tracks and random features.
fn general_csv(rows: usize) -> String {
    let mut rng = StdRng::seed_from_u64(42);
    let mut csv = String::from("track_name,artist_name,release_date,genre,lyrics,len");
    for feature in GENERAL_FEATURES {
        csv.push_str(&format!(",\"{feature}\""));
    }
    csv.push_str(",topic,age\n");

    for i in 0..rows {
        let features: Vec<String> = (0..GENERAL_FEATURES.len())
            .map(|_| format!("{:.4}", rng.gen::<f64>()))
            .collect();
        csv.push_str(&format!(
            "Track {i},Artist {},{},{},words,100,{},sadness,0.5\n",
            i % 300,
            1950 + i % 70,
            GENRES[i % GENRES.len()],
            features.join(",")
        ));
    }
    csv
}

fn create_benchmark_store(rows: usize) -> Arc<AttributeStore> {
    let (general, _) = AttributeTable::from_reader(Dataset::General, general_csv(rows).as_bytes())
        .expect("benchmark dataset parses");
    Arc::new(AttributeStore::new(general, AttributeTable::empty(Dataset::Curated)))
}

fn random_vector(rng: &mut StdRng, len: usize) -> Vec<f64> {
    (0..len).map(|_| rng.gen()).collect()
}

/// Benchmark cosine similarity at both dataset dimensions
fn benchmark_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");
    let mut rng = StdRng::seed_from_u64(1);

    for len in [9, 22] {
        let a = random_vector(&mut rng, len);
        let b = random_vector(&mut rng, len);
        group.bench_with_input(BenchmarkId::new("cosine", len), &(a, b), |bench, (a, b)| {
            bench.iter(|| cosine_similarity(black_box(a), black_box(b)))
        });
    }

    group.finish();
}

/// Benchmark full recommendation requests
fn benchmark_recommend(c: &mut Criterion) {
    let mut group = c.benchmark_group("recommend");
    group.sample_size(20);

    let store = create_benchmark_store(28_000);
    let seeds: Vec<TrackRecord> = [0, 7, 14, 301, 1000]
        .iter()
        .map(|&i| store.general().rows()[i].track.clone())
        .collect();

    for limit in [100, 500, 2000] {
        let recommender = Recommender::with_options(
            Arc::clone(&store),
            RecommendOptions {
                candidate_limit: limit,
                ..RecommendOptions::default()
            },
        );
        group.bench_with_input(BenchmarkId::new("candidate_limit", limit), &recommender, |b, engine| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| engine.recommend_scored(black_box(&seeds), &mut rng))
        });
    }

    let recommender = Recommender::new(Arc::clone(&store));
    group.bench_function("mood_party", |b| {
        b.iter(|| recommender.recommend_by_mood(black_box(Mood::Party)))
    });

    group.finish();
}

/// Benchmark CSV parsing
fn benchmark_dataset_loading(c: &mut Criterion) {
    let mut group = c.benchmark_group("dataset_loading");
    group.sample_size(20);

    let csv = general_csv(5_000);
    group.bench_function("parse_5000_rows", |b| {
        b.iter(|| AttributeTable::from_reader(Dataset::General, black_box(csv.as_bytes())))
    });

    group.finish();
}

/// Benchmark queue editing on a long queue
fn benchmark_queue_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    let mut queue = PlaybackQueue::new();
    queue.add((0..1000).map(|i| TrackRecord::from_dataset(format!("Song {i}"), "Artist")));
    for _ in 0..500 {
        queue.next().expect("queue is not empty");
    }

    group.bench_function("move_song_by_title", |b| {
        b.iter_batched(
            || queue.clone(),
            |mut q| q.move_song(black_box("Song 999"), 1),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("remove_at_cursor", |b| {
        b.iter_batched(
            || queue.clone(),
            |mut q| q.remove_at(black_box(500)),
            BatchSize::SmallInput,
        )
    });

    group.bench_function("shuffle_1000", |b| {
        let mut rng = StdRng::seed_from_u64(3);
        b.iter_batched(
            || queue.clone(),
            |mut q| {
                q.shuffle(&mut rng);
                q
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

// Group all benchmarks
criterion_group!(
    benches,
    benchmark_similarity,
    benchmark_recommend,
    benchmark_dataset_loading,
    benchmark_queue_operations
);

criterion_main!(benches);
