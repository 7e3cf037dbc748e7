#![allow(dead_code)]

use crossbeam_channel::Receiver;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use xmr_kit_rs::coordinator::CoordinatorOptions;
use xmr_kit_rs::miner::DeviceInventory;
use xmr_kit_rs::miner::job::NONCE_OFFSET;
use xmr_kit_rs::network::{
    ConnectionSettings, LoginReply, PoolChannel, PoolNotification, PoolRequest, ShareAck,
};
use xmr_kit_rs::{
    Algorithm, AlgorithmType, MinerError, MiningEvent, MiningJob, PoolConnector, RetryPolicy,
    Worker,
};

/// Hash whose value is the nonce, so a job with target `n` has exactly the
/// shares `0..n`
pub struct EchoNonce {
    pub cost: Duration,
}

impl Algorithm for EchoNonce {
    fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError> {
        if !self.cost.is_zero() {
            thread::sleep(self.cost);
        }
        let mut hash = [0u8; 32];
        hash[24..28].copy_from_slice(&blob[NONCE_OFFSET..NONCE_OFFSET + 4]);
        Ok(hash)
    }

    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::CryptoNight
    }
}

/// How the mock pool treats one worker
#[derive(Debug, Clone)]
pub struct Plan {
    pub refuse_first: usize,
    pub deny_login: bool,
    pub reject_shares: bool,
    pub target: u64,
}

impl Plan {
    pub fn accepting(target: u64) -> Self {
        Plan {
            refuse_first: 0,
            deny_login: false,
            reject_shares: false,
            target,
        }
    }
}

/// Scripted in-process pool
#[derive(Default)]
pub struct MockPool {
    plans: Mutex<HashMap<String, Plan>>,
    connects: Mutex<HashMap<String, usize>>,
    notifiers: Mutex<HashMap<String, mpsc::Sender<PoolNotification>>>,
}

impl MockPool {
    pub fn with_plans(plans: &[(&str, Plan)]) -> Self {
        let pool = MockPool::default();
        {
            let mut map = pool.plans.lock().unwrap();
            for (id, plan) in plans {
                map.insert(id.to_string(), plan.clone());
            }
        }
        pool
    }

    pub fn connects(&self, worker_id: &str) -> usize {
        self.connects
            .lock()
            .unwrap()
            .get(worker_id)
            .copied()
            .unwrap_or(0)
    }

    /// Pushes a notification on the worker's current link (call from a
    /// plain thread)
    pub fn notify(&self, worker_id: &str, note: PoolNotification) {
        let tx = self.notifiers.lock().unwrap().get(worker_id).cloned().unwrap();
        tx.blocking_send(note).unwrap();
    }
}

impl PoolConnector for MockPool {
    fn connect<'a>(&'a self, worker: &'a Worker) -> BoxFuture<'a, Result<PoolChannel, MinerError>> {
        async move {
            let id = worker.identifier.clone();
            let plan = self
                .plans
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .unwrap_or(Plan::accepting(1));
            let attempt = {
                let mut connects = self.connects.lock().unwrap();
                let count = connects.entry(id.clone()).or_default();
                *count += 1;
                *count
            };
            if attempt <= plan.refuse_first {
                return Err(MinerError::ConnectionError(format!(
                    "{} refused (attempt {})",
                    worker.pool_host, attempt
                )));
            }

            let (req_tx, mut req_rx) = mpsc::channel(64);
            let (note_tx, note_rx) = mpsc::channel(64);
            self.notifiers.lock().unwrap().insert(id.clone(), note_tx);

            tokio::spawn(async move {
                while let Some(request) = req_rx.recv().await {
                    match request {
                        PoolRequest::Login { reply, .. } if plan.deny_login => {
                            let _ = reply.send(Err(MinerError::AuthError("invalid wallet".into())));
                        }
                        PoolRequest::Login { reply, .. } => {
                            let job = MiningJob::new(format!("{}-1", id), vec![0; 76], plan.target);
                            let _ = reply.send(job.map(|job| LoginReply {
                                session_id: format!("{}-session", id),
                                job: Some(job),
                            }));
                        }
                        PoolRequest::Submit { reply, .. } => {
                            let ack = if plan.reject_shares {
                                ShareAck::Rejected("Low difficulty share".into())
                            } else {
                                ShareAck::Accepted
                            };
                            let _ = reply.send(Ok(ack));
                        }
                        PoolRequest::KeepAlive => {}
                        PoolRequest::Close => break,
                    }
                }
            });

            Ok(PoolChannel {
                requests: req_tx,
                notifications: note_rx,
            })
        }
        .boxed()
    }
}

pub fn worker(id: &str, weight: f64) -> Worker {
    Worker::new(id, "pool.test", 3333, "4AdUndXHHZ").with_weight(weight)
}

pub fn options(cpu_units: usize) -> CoordinatorOptions {
    CoordinatorOptions {
        batch_size: 4,
        inventory: DeviceInventory {
            cpu_units,
            accelerator_units: 0,
        },
        reject_threshold: 10,
        connection: ConnectionSettings {
            retry: RetryPolicy {
                initial_delay_ms: 10,
                max_delay_ms: 50,
                multiplier: 2.0,
                max_attempts: None,
            },
            flush_timeout: Duration::from_secs(2),
            ..ConnectionSettings::default()
        },
        hashrate_window: Duration::from_secs(1),
        report_interval: None,
        io_threads: 1,
    }
}

/// Collects events until one matches `done`; panics after 10 s
pub fn events_until(
    rx: &Receiver<MiningEvent>,
    mut done: impl FnMut(&MiningEvent) -> bool,
) -> Vec<MiningEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut seen = Vec::new();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(event) => {
                let finished = done(&event);
                seen.push(event);
                if finished {
                    return seen;
                }
            }
            Err(_) => panic!("timed out; events so far: {:?}", seen),
        }
    }
}

/// Polls `check` until it holds or 10 s pass
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
