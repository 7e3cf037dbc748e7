mod common;

use common::{EchoNonce, MockPool, Plan, events_until, eventually, options, worker};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use xmr_kit_rs::network::PoolNotification;
use xmr_kit_rs::{ConnectionState, MinerDelegate, MinerError, MiningCoordinator, MiningEvent};

fn coordinator(pool: &Arc<MockPool>, cost: Duration, cpu_units: usize) -> MiningCoordinator {
    MiningCoordinator::new(
        Arc::clone(pool) as _,
        Arc::new(EchoNonce { cost }),
        options(cpu_units),
    )
}

#[test]
fn configure_rejects_bad_setups() {
    let pool = Arc::new(MockPool::default());
    let coordinator = coordinator(&pool, Duration::ZERO, 2);

    let dup = coordinator.configure(vec![worker("a", 1.0), worker("a", 1.0)], 1.0, 0.0);
    assert!(matches!(dup, Err(MinerError::ConfigError(_))));

    let weightless = coordinator.configure(vec![worker("a", 0.0)], 1.0, 0.0);
    assert!(matches!(weightless, Err(MinerError::ConfigError(_))));

    let over = coordinator.configure(vec![worker("a", 1.0)], 1.5, 0.0);
    assert!(matches!(over, Err(MinerError::ConfigError(_))));

    assert!(matches!(coordinator.start(), Err(MinerError::ConfigError(_))));
    assert!(!coordinator.is_active());
    assert_eq!(pool.connects("a"), 0);
}

#[test]
fn lifecycle_is_guarded_and_stop_is_idempotent() {
    let pool = Arc::new(MockPool::with_plans(&[("main", Plan::accepting(1))]));
    let coordinator = coordinator(&pool, Duration::from_micros(200), 2);
    coordinator
        .configure(vec![worker("main", 1.0)], 0.5, 0.0)
        .unwrap();

    assert_eq!(
        coordinator.connection_state("main"),
        Some(ConnectionState::Disconnected)
    );
    assert_eq!(coordinator.connection_state("ghost"), None);

    coordinator.start().unwrap();
    assert!(coordinator.is_active());
    assert!(matches!(coordinator.start(), Err(MinerError::StateError(_))));
    assert!(matches!(
        coordinator.configure(vec![worker("other", 1.0)], 1.0, 0.0),
        Err(MinerError::StateError(_))
    ));
    assert!(matches!(
        coordinator.set_limits(1.0, 0.0),
        Err(MinerError::StateError(_))
    ));
    assert!(eventually(|| {
        coordinator.connection_state("main") == Some(ConnectionState::Mining)
    }));

    coordinator.stop();
    coordinator.stop();
    assert!(!coordinator.is_active());
    assert_eq!(coordinator.hash_rate(), 0.0);
    assert_eq!(coordinator.difficulty("main"), None);
}

#[test]
fn accepted_results_follow_difficulty() {
    let pool = Arc::new(MockPool::with_plans(&[("main", Plan::accepting(5))]));
    let coordinator = coordinator(&pool, Duration::ZERO, 2);
    coordinator
        .configure(vec![worker("main", 1.0)], 1.0, 0.0)
        .unwrap();
    let events = coordinator.subscribe();
    coordinator.start().unwrap();

    let seen = events_until(&events, |event| {
        matches!(event, MiningEvent::AcceptedResult { count: 5, .. })
    });
    assert!(matches!(
        &seen[0],
        MiningEvent::DifficultyChanged { difficulty, worker_id }
            if *difficulty == u64::MAX / 5 && worker_id == "main"
    ));
    let counts: Vec<u64> = seen
        .iter()
        .filter_map(|event| match event {
            MiningEvent::AcceptedResult { count, .. } => Some(*count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    assert_eq!(coordinator.difficulty("main"), Some(u64::MAX / 5));

    pool.notify("main", PoolNotification::BlockFound);
    let seen = events_until(&events, |event| matches!(event, MiningEvent::BlockFound { .. }));
    assert_eq!(seen.last().map(|event| event.worker_id()), Some("main"));

    let stats = coordinator.stats().unwrap();
    assert_eq!(stats.shares_accepted, 5);
    assert_eq!(stats.shares_rejected, 0);
    coordinator.stop();
}

#[derive(Default)]
struct Counting {
    accepted: AtomicU64,
    difficulty_changes: AtomicU64,
}

impl MinerDelegate for Counting {
    fn accepted_result(&self, _count: u64, _worker_id: &str) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    fn difficulty_changed(&self, _difficulty: u64, _worker_id: &str) {
        self.difficulty_changes.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn delegate_sees_the_same_results() {
    let pool = Arc::new(MockPool::with_plans(&[("main", Plan::accepting(3))]));
    let coordinator = coordinator(&pool, Duration::ZERO, 1);
    coordinator
        .configure(vec![worker("main", 1.0)], 1.0, 0.0)
        .unwrap();
    let delegate = Arc::new(Counting::default());
    coordinator.set_delegate(Some(Arc::clone(&delegate) as Arc<dyn MinerDelegate>));
    coordinator.start().unwrap();

    assert!(eventually(|| delegate.accepted.load(Ordering::SeqCst) == 3));
    assert_eq!(delegate.difficulty_changes.load(Ordering::SeqCst), 1);
    coordinator.stop();
}

#[test]
fn refused_login_stops_the_worker_without_retry() {
    let plan = Plan {
        deny_login: true,
        ..Plan::accepting(1)
    };
    let pool = Arc::new(MockPool::with_plans(&[("main", plan)]));
    let coordinator = coordinator(&pool, Duration::ZERO, 1);
    coordinator
        .configure(vec![worker("main", 1.0)], 1.0, 0.0)
        .unwrap();
    let events = coordinator.subscribe();
    coordinator.start().unwrap();

    let seen = events_until(&events, |event| {
        matches!(event, MiningEvent::MiningError { stopped: true, .. })
    });
    let MiningEvent::MiningError { error, .. } = seen.last().unwrap() else {
        unreachable!();
    };
    assert!(matches!(**error, MinerError::AuthError(_)));
    assert!(eventually(|| !coordinator.is_active()));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pool.connects("main"), 1);

    // The dead session is replaced on the next start
    coordinator.start().unwrap();
    assert!(eventually(|| pool.connects("main") == 2));
    coordinator.stop();
}

#[test]
fn reject_threshold_stops_the_worker() {
    let plan = Plan {
        reject_shares: true,
        ..Plan::accepting(50)
    };
    let pool = Arc::new(MockPool::with_plans(&[("main", plan)]));
    let mut opts = options(1);
    opts.reject_threshold = 3;
    let coordinator = MiningCoordinator::new(
        Arc::clone(&pool) as _,
        Arc::new(EchoNonce {
            cost: Duration::ZERO,
        }),
        opts,
    );
    coordinator
        .configure(vec![worker("main", 1.0)], 1.0, 0.0)
        .unwrap();
    let events = coordinator.subscribe();
    coordinator.start().unwrap();

    let seen = events_until(&events, |event| {
        matches!(event, MiningEvent::MiningError { stopped: true, .. })
    });
    let warnings = seen
        .iter()
        .filter(|event| matches!(event, MiningEvent::MiningError { stopped: false, .. }))
        .count();
    assert_eq!(warnings, 2);
    let MiningEvent::MiningError { error, .. } = seen.last().unwrap() else {
        unreachable!();
    };
    assert!(matches!(**error, MinerError::ShareRejectedError(_)));
    assert!(eventually(|| !coordinator.is_active()));

    // Nothing after the stop notification
    thread::sleep(Duration::from_millis(100));
    assert!(events.try_recv().is_err());
    coordinator.stop();
}

#[test]
fn transient_failures_are_retried() {
    let plan = Plan {
        refuse_first: 2,
        ..Plan::accepting(1)
    };
    let pool = Arc::new(MockPool::with_plans(&[("main", plan)]));
    let coordinator = coordinator(&pool, Duration::ZERO, 1);
    coordinator
        .configure(vec![worker("main", 1.0)], 1.0, 0.0)
        .unwrap();
    let events = coordinator.subscribe();
    coordinator.start().unwrap();

    let seen = events_until(&events, |event| {
        matches!(event, MiningEvent::AcceptedResult { .. })
    });
    let retries: Vec<&MiningEvent> = seen
        .iter()
        .filter(|event| matches!(event, MiningEvent::MiningError { .. }))
        .collect();
    assert_eq!(retries.len(), 2);
    for event in retries {
        let MiningEvent::MiningError { error, stopped, .. } = event else {
            unreachable!();
        };
        assert!(!stopped);
        assert!(matches!(**error, MinerError::ConnectionError(_)));
    }
    assert_eq!(pool.connects("main"), 3);
    assert!(coordinator.is_active());
    coordinator.stop();
}

#[test]
fn hash_rate_tracks_capacity_and_restarts_cleanly() {
    let pool = Arc::new(MockPool::with_plans(&[("main", Plan::accepting(1))]));
    let coordinator = coordinator(&pool, Duration::from_millis(1), 2);
    coordinator
        .configure(vec![worker("main", 1.0)], 1.0, 0.0)
        .unwrap();

    coordinator.start().unwrap();
    thread::sleep(Duration::from_millis(1500));
    let first = coordinator.hash_rate();
    // Two lanes at no more than 1000 H/s each
    assert!(first > 500.0, "hash rate {}", first);
    assert!(first < 2200.0, "hash rate {}", first);
    coordinator.stop();
    assert_eq!(coordinator.hash_rate(), 0.0);

    coordinator.start().unwrap();
    thread::sleep(Duration::from_millis(1500));
    let second = coordinator.hash_rate();
    assert!(
        (second - first).abs() / first < 0.5,
        "restart went from {} to {}",
        first,
        second
    );
    coordinator.stop();
}

#[test]
fn capacity_is_split_by_weight() {
    let pool = Arc::new(MockPool::default());
    let coordinator = coordinator(&pool, Duration::from_micros(200), 4);
    coordinator
        .configure(
            vec![worker("a", 1.0), worker("b", 2.0), worker("c", 1.0)],
            0.8,
            0.4,
        )
        .unwrap();

    let planned = coordinator.allocations();
    assert_eq!(planned.len(), 3);
    let cpu: f64 = planned.iter().map(|(_, a)| a.cpu).sum();
    let accelerator: f64 = planned.iter().map(|(_, a)| a.accelerator).sum();
    assert!(cpu <= 0.8 + 1e-9);
    assert!(accelerator <= 0.4 + 1e-9);
    assert!((planned[1].1.cpu - 2.0 * planned[0].1.cpu).abs() < 1e-9);

    coordinator.start().unwrap();
    assert_eq!(coordinator.allocations(), planned);
    coordinator.stop();
}

#[test]
fn survivors_take_over_a_dead_worker_share() {
    let denied = Plan {
        deny_login: true,
        ..Plan::accepting(1)
    };
    let pool = Arc::new(MockPool::with_plans(&[
        ("good", Plan::accepting(1)),
        ("bad", denied),
    ]));
    let coordinator = coordinator(&pool, Duration::from_micros(200), 2);
    coordinator
        .configure(vec![worker("good", 1.0), worker("bad", 1.0)], 1.0, 0.0)
        .unwrap();
    let events = coordinator.subscribe();
    coordinator.start().unwrap();

    let seen = events_until(&events, |event| {
        matches!(event, MiningEvent::MiningError { stopped: true, .. })
    });
    assert_eq!(seen.last().map(|event| event.worker_id()), Some("bad"));
    assert!(eventually(|| {
        coordinator
            .allocations()
            .iter()
            .any(|(id, a)| id == "good" && (a.cpu - 1.0).abs() < 1e-9)
    }));
    assert!(coordinator.is_active());
    coordinator.stop();
}

struct StopOnFirstResult {
    coordinator: Weak<MiningCoordinator>,
}

impl MinerDelegate for StopOnFirstResult {
    fn accepted_result(&self, _count: u64, _worker_id: &str) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.stop();
        }
    }
}

#[test]
fn stop_from_a_callback() {
    let pool = Arc::new(MockPool::with_plans(&[("main", Plan::accepting(4))]));
    let coordinator = Arc::new(coordinator(&pool, Duration::ZERO, 1));
    coordinator
        .configure(vec![worker("main", 1.0)], 1.0, 0.0)
        .unwrap();
    let delegate: Arc<dyn MinerDelegate> = Arc::new(StopOnFirstResult {
        coordinator: Arc::downgrade(&coordinator),
    });
    coordinator.set_delegate(Some(delegate));
    coordinator.start().unwrap();

    assert!(eventually(|| !coordinator.is_active()));
    coordinator.stop();
}
