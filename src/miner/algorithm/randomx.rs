// src/miner/algorithm/randomx.rs
//! RandomX algorithm binding
//!
//! Datasets (contexts) are keyed by the seed hash the pool sends with each
//! job. The backend is shared by every worker, and pools switch seeds at
//! slightly different times, so the last [`KEPT_DATASETS`] datasets stay
//! built and every hash uses the dataset of its own job's seed. Each lane
//! thread keeps its own hasher for the context it used last.

use crate::miner::algorithm::Algorithm;
use crate::miner::job::MiningJob;
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use arc_swap::ArcSwap;
use rust_randomx::{Context, Hasher};
use std::cell::RefCell;
use std::sync::{Arc, Mutex};

/// Datasets kept at once (current seed and the one before)
pub const KEPT_DATASETS: usize = 2;

/// Dataset built for one seed hash
struct Keyed {
    seed: Vec<u8>,
    context: Arc<Context>,
}

thread_local! {
    /// Per-thread hasher plus the address of the context it was built for
    static HASHER: RefCell<Option<(usize, Hasher)>> = const { RefCell::new(None) };
}

/// RandomX algorithm implementation
pub struct RandomX {
    /// Full dataset (fast) or cache-only (light) mode
    fast: bool,
    /// Built datasets, newest first
    datasets: ArcSwap<Vec<Arc<Keyed>>>,
    /// Serialises dataset builds so two workers don't build the same seed twice
    reseed: Mutex<()>,
}

impl RandomX {
    /// Creates an unseeded RandomX backend
    ///
    /// Hashing fails until [`Algorithm::prepare`] has seen a job with a seed.
    ///
    /// # Performance Notes
    /// - Dataset initialisation takes seconds
    /// - Fast mode requires ~2080MB RAM vs ~256MB in light mode, per kept
    ///   dataset
    pub fn new(fast: bool) -> Self {
        RandomX {
            fast,
            datasets: ArcSwap::from_pointee(Vec::new()),
            reseed: Mutex::new(()),
        }
    }

    /// Seed hashes of the built datasets, newest first
    pub fn seeds(&self) -> Vec<Vec<u8>> {
        self.datasets.load().iter().map(|k| k.seed.clone()).collect()
    }

    fn lookup(&self, seed: &[u8]) -> Option<Arc<Keyed>> {
        self.datasets.load().iter().find(|k| k.seed == seed).cloned()
    }

    /// Dataset for `seed`, building it (and evicting the oldest) if needed
    fn dataset(&self, seed: &[u8]) -> Result<Arc<Keyed>, MinerError> {
        if let Some(keyed) = self.lookup(seed) {
            return Ok(keyed);
        }

        let _guard = self
            .reseed
            .lock()
            .map_err(|_| MinerError::AlgorithmError("RandomX reseed lock poisoned".into()))?;
        if let Some(keyed) = self.lookup(seed) {
            return Ok(keyed);
        }

        log::info!(
            "Initialising RandomX dataset for seed {} ({} mode)",
            hex::encode(seed),
            if self.fast { "fast" } else { "light" }
        );
        let keyed = Arc::new(Keyed {
            seed: seed.to_vec(),
            context: Arc::new(Context::new(seed, self.fast)),
        });

        let current = self.datasets.load_full();
        let mut next = Vec::with_capacity(KEPT_DATASETS);
        next.push(Arc::clone(&keyed));
        next.extend(current.iter().take(KEPT_DATASETS - 1).cloned());
        if let Some(evicted) = current.get(KEPT_DATASETS - 1) {
            log::debug!("Dropping RandomX dataset for seed {}", hex::encode(&evicted.seed));
        }
        self.datasets.store(Arc::new(next));
        Ok(keyed)
    }

    fn hash_with(keyed: &Keyed, blob: &[u8]) -> Result<[u8; 32], MinerError> {
        let key = Arc::as_ptr(&keyed.context) as usize;

        HASHER.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.as_ref().map(|(k, _)| *k) != Some(key) {
                *slot = Some((key, Hasher::new(Arc::clone(&keyed.context))));
            }
            let (_, hasher) = slot
                .as_ref()
                .ok_or_else(|| MinerError::AlgorithmError("RandomX hasher missing".into()))?;
            let output = hasher.hash(blob);
            output.as_ref().try_into().map_err(|_| {
                MinerError::AlgorithmError("RandomX returned a malformed hash".into())
            })
        })
    }
}

fn seed_of(job: &MiningJob) -> Result<&[u8], MinerError> {
    job.seed_hash.as_deref().ok_or_else(|| {
        MinerError::ProtocolError(format!("RandomX job {} has no seed_hash", job.job_id))
    })
}

impl Algorithm for RandomX {
    /// Hashes with the newest dataset
    fn hash(&self, blob: &[u8]) -> Result<[u8; 32], MinerError> {
        let datasets = self.datasets.load();
        let keyed = datasets.first().ok_or_else(|| {
            MinerError::AlgorithmError("RandomX dataset not initialised".into())
        })?;
        Self::hash_with(keyed, blob)
    }

    /// Hashes with the dataset of the job's seed, rebuilding it if it was
    /// evicted
    fn hash_job(&self, job: &MiningJob, blob: &[u8]) -> Result<[u8; 32], MinerError> {
        let keyed = self.dataset(seed_of(job)?)?;
        Self::hash_with(&keyed, blob)
    }

    fn prepare(&self, job: &MiningJob) -> Result<(), MinerError> {
        self.dataset(seed_of(job)?).map(|_| ())
    }

    fn algorithm_type(&self) -> AlgorithmType {
        AlgorithmType::RandomX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(id: &str, seed: u8) -> MiningJob {
        let mut job = MiningJob::new(id, vec![0; 76], u64::MAX).unwrap();
        job.seed_hash = Some(vec![seed; 32]);
        job
    }

    #[test]
    fn hashing_before_seed_fails() {
        let rx = RandomX::new(false);
        assert!(matches!(rx.hash(&[0u8; 76]), Err(MinerError::AlgorithmError(_))));
        assert!(rx.seeds().is_empty());
    }

    #[test]
    fn job_without_seed_is_rejected() {
        let rx = RandomX::new(false);
        let job = MiningJob::new("j", vec![0; 76], u64::MAX).unwrap();
        assert!(matches!(rx.prepare(&job), Err(MinerError::ProtocolError(_))));
        assert!(matches!(
            rx.hash_job(&job, &[0u8; 76]),
            Err(MinerError::ProtocolError(_))
        ));
    }

    #[test]
    fn jobs_keep_their_dataset_when_another_seed_arrives() {
        let rx = RandomX::new(false);
        let old = seeded("old", 1);
        let new = seeded("new", 2);
        let blob = [7u8; 76];

        rx.prepare(&old).unwrap();
        let before = rx.hash_job(&old, &blob).unwrap();

        // Another worker's pool moves to the next seed
        rx.prepare(&new).unwrap();
        assert_eq!(rx.hash_job(&old, &blob).unwrap(), before);
        assert_ne!(rx.hash_job(&new, &blob).unwrap(), before);
        assert_eq!(rx.seeds(), vec![vec![2u8; 32], vec![1u8; 32]]);

        // Preparing a kept seed again builds nothing
        rx.prepare(&old).unwrap();
        assert_eq!(rx.seeds(), vec![vec![2u8; 32], vec![1u8; 32]]);
    }
}
