//! Performance benchmarks for the automated strategy, pairing and match play

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use nim_lobby::amqp::publisher::MockEventPublisher;
use nim_lobby::bot::{choose_take, ComputerOpponentProvider, ComputerPlayer};
use nim_lobby::game::{EngineConfig, MatchEngine};
use nim_lobby::lobby::{Matcher, Matchmaker, MatchmakerConfig, ParticipantRegistry, QueueOrderMatcher};
use nim_lobby::metrics::MetricsCollector;
use nim_lobby::player::Player;
use nim_lobby::types::Difficulty;
use std::sync::Arc;

fn create_bench_matchmaker() -> Matchmaker {
    Matchmaker::new(
        Arc::new(MockEventPublisher::new()),
        Arc::new(MetricsCollector::new().unwrap()),
        MatchmakerConfig::default(),
    )
}

fn bench_choose_take(c: &mut Criterion) {
    let mut rng = rand::thread_rng();

    c.bench_function("choose_take_hard_full_range", |b| {
        b.iter(|| {
            for pool in 2..=103u32 {
                black_box(choose_take(black_box(pool), Difficulty::Hard, &mut rng).unwrap());
            }
        })
    });

    c.bench_function("choose_take_easy_full_range", |b| {
        b.iter(|| {
            for pool in 2..=103u32 {
                black_box(choose_take(black_box(pool), Difficulty::Easy, &mut rng).unwrap());
            }
        })
    });
}

fn bench_computer_match(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let config = EngineConfig::default();

    c.bench_function("computer_vs_computer_hard_103", |b| {
        b.iter(|| {
            rt.block_on(async {
                let first: Arc<dyn Player> = Arc::new(ComputerPlayer::new(Difficulty::Hard));
                let second: Arc<dyn Player> = Arc::new(ComputerPlayer::new(Difficulty::Hard));
                let report = MatchEngine::with_setup(first, second, 103, 0, &config)
                    .run()
                    .await;
                black_box(report.turns)
            })
        })
    });
}

fn populated_registry(size: usize) -> ParticipantRegistry {
    let registry = ParticipantRegistry::new();
    for i in 0..size {
        let difficulty = if i % 2 == 0 {
            Difficulty::Easy
        } else {
            Difficulty::Hard
        };
        let player = Arc::new(ComputerPlayer::with_name(format!("bench-{}", i), difficulty));
        registry.register(player).unwrap();
    }
    registry
}

fn bench_pairing_scan(c: &mut Criterion) {
    let matcher = QueueOrderMatcher::new();
    let opponents = ComputerOpponentProvider::new();

    c.bench_function("pairing_scan_200_waiting", |b| {
        b.iter_batched(
            || populated_registry(200),
            |registry| {
                let scan = registry
                    .with_tables(|tables| matcher.pair(tables, &opponents))
                    .unwrap();
                black_box(scan.pairings.len())
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_run_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("run_cycle_100_matches", |b| {
        b.iter_batched(
            || {
                let matchmaker = create_bench_matchmaker();
                rt.block_on(async {
                    for i in 0..200 {
                        let player = Arc::new(ComputerPlayer::with_name(
                            format!("bench-{}", i),
                            Difficulty::Easy,
                        ));
                        matchmaker.register(player).await.unwrap();
                    }
                });
                matchmaker
            },
            |matchmaker| {
                rt.block_on(async {
                    let report = matchmaker.run_cycle().unwrap();
                    for launched in report.launched {
                        black_box(launched.handle.await.unwrap().turns);
                    }
                })
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_choose_take,
    bench_computer_match,
    bench_pairing_scan,
    bench_run_cycle
);
criterion_main!(benches);
