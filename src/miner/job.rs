// src/miner/job.rs
//! Pool jobs and the shares found against them
//!
//! Monero hashing blobs carry a 4-byte little-endian nonce at offset 39. Pools
//! send targets either as a compact 4-byte value or a full 8-byte value; both
//! are normalised to a 64-bit target compared against the last 8 bytes of the
//! hash.

use crate::types::AlgorithmType;
use crate::utils::error::MinerError;

/// Byte offset of the nonce inside a hashing blob
pub const NONCE_OFFSET: usize = 39;

/// Width of the nonce in bytes
pub const NONCE_SIZE: usize = 4;

/// Represents a mining job received from the pool
#[derive(Debug, Clone, PartialEq)]
pub struct MiningJob {
    /// Unique identifier for the job
    pub job_id: String,
    /// Hashing blob with the pool's nonce bytes in place
    pub blob: Vec<u8>,
    /// 64-bit share target
    pub target: u64,
    /// RandomX key (seed hash), when the pool sends one
    pub seed_hash: Option<Vec<u8>>,
    /// Algorithm the pool announced, if any
    pub algorithm: Option<AlgorithmType>,
    /// Block height, if announced
    pub height: Option<u64>,
}

impl MiningJob {
    /// Builds a job and checks the blob can hold a nonce
    ///
    /// # Errors
    /// `MinerError::ProtocolError` if the blob is too short or the target is 0
    pub fn new(job_id: impl Into<String>, blob: Vec<u8>, target: u64) -> Result<Self, MinerError> {
        if blob.len() < NONCE_OFFSET + NONCE_SIZE {
            return Err(MinerError::ProtocolError(format!(
                "Job blob is {} bytes, need at least {}",
                blob.len(),
                NONCE_OFFSET + NONCE_SIZE
            )));
        }
        if target == 0 {
            return Err(MinerError::ProtocolError("Job target is zero".into()));
        }
        Ok(MiningJob {
            job_id: job_id.into(),
            blob,
            target,
            seed_hash: None,
            algorithm: None,
            height: None,
        })
    }

    /// Share difficulty implied by the target
    pub fn difficulty(&self) -> u64 {
        difficulty_for_target(self.target)
    }

    /// Maps a sequential counter onto the nonce space of this job
    ///
    /// With NiceHash the pool owns the most significant nonce byte, so only the
    /// low 24 bits come from the counter.
    pub fn nonce_for(&self, counter: u32, nicehash: bool) -> u32 {
        if nicehash {
            let reserved = self.blob[NONCE_OFFSET + NONCE_SIZE - 1] as u32;
            (reserved << 24) | (counter & 0x00FF_FFFF)
        } else {
            counter
        }
    }

    /// Writes `nonce` into a copy of the blob held in `buf`
    pub fn write_nonce(buf: &mut [u8], nonce: u32) {
        buf[NONCE_OFFSET..NONCE_OFFSET + NONCE_SIZE].copy_from_slice(&nonce.to_le_bytes());
    }
}

/// Represents a valid share found by a lane
#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    /// Worker the share belongs to
    pub worker_id: String,
    /// Job ID this share belongs to
    pub job_id: String,
    /// Nonce that produced the valid hash
    pub nonce: u32,
    /// Resulting hash that meets the target
    pub result: [u8; 32],
}

impl Share {
    /// Nonce as the pool expects it: the 4 blob bytes in hex
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce.to_le_bytes())
    }

    /// Hash in hex
    pub fn result_hex(&self) -> String {
        hex::encode(self.result)
    }
}

/// Parses a pool target string into a 64-bit target
///
/// 8 hex chars are the compact form, 16 hex chars the full form; both are
/// little-endian.
pub fn parse_target(target_hex: &str) -> Result<u64, MinerError> {
    let bytes = hex::decode(target_hex)?;
    match bytes.len() {
        4 => {
            let compact = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64;
            if compact == 0 {
                return Err(MinerError::ProtocolError("Target is zero".into()));
            }
            Ok(u64::MAX / (u32::MAX as u64 / compact))
        }
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes);
            match u64::from_le_bytes(raw) {
                0 => Err(MinerError::ProtocolError("Target is zero".into())),
                target => Ok(target),
            }
        }
        n => Err(MinerError::ProtocolError(format!(
            "Target must be 4 or 8 bytes, got {}",
            n
        ))),
    }
}

/// Difficulty for a 64-bit target
pub fn difficulty_for_target(target: u64) -> u64 {
    if target == 0 { u64::MAX } else { u64::MAX / target }
}

/// True when the hash value is below the target
pub fn meets_target(hash: &[u8; 32], target: u64) -> bool {
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&hash[24..32]);
    u64::from_le_bytes(tail) < target
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn blob() -> Vec<u8> {
        (0..76u8).collect()
    }

    #[test]
    fn compact_target_difficulty() {
        // Difficulty 10000 in the compact form pools send
        let target = parse_target("b88d0600").unwrap();
        assert_eq!(difficulty_for_target(target), 10000);
    }

    #[test]
    fn full_target_is_little_endian() {
        let target = parse_target("0000000000000001").unwrap();
        assert_eq!(target, 1u64 << 56);
        assert_eq!(difficulty_for_target(target), 255);
    }

    #[test]
    fn bad_targets_are_protocol_errors() {
        for input in ["", "00000000", "abcd", "zzzzzzzz", "000000000000000000"] {
            assert!(
                matches!(parse_target(input), Err(MinerError::ProtocolError(_))),
                "{input}"
            );
        }
    }

    #[test]
    fn short_blobs_are_rejected() {
        assert!(MiningJob::new("j", vec![0; 42], 1).is_err());
        assert!(MiningJob::new("j", vec![0; 43], 1).is_ok());
        assert!(MiningJob::new("j", blob(), 0).is_err());
    }

    #[test]
    fn nonce_is_written_little_endian_at_offset() {
        let mut buf = blob();
        MiningJob::write_nonce(&mut buf, 0x0403_0201);
        assert_eq!(&buf[39..43], &[1, 2, 3, 4]);
        assert_eq!(buf[38], 38);
        assert_eq!(buf[43], 43);
    }

    #[test]
    fn nicehash_keeps_pool_byte() {
        let mut raw = blob();
        raw[42] = 0xAB;
        let job = MiningJob::new("j", raw, u64::MAX).unwrap();
        assert_eq!(job.nonce_for(0x1234_5678, true), 0xAB34_5678);
        assert_eq!(job.nonce_for(0x1234_5678, false), 0x1234_5678);
    }

    #[test]
    fn target_comparison_uses_hash_tail() {
        let mut hash = [0xFFu8; 32];
        hash[24..32].copy_from_slice(&5u64.to_le_bytes());
        assert!(meets_target(&hash, 6));
        assert!(!meets_target(&hash, 5));
    }

    #[test]
    fn hash_tail_against_compact_target() {
        // Tail 0x000005cf_47e1a2b3 against difficulty 10000 (~0x0006_8db8_bac7_10cb)
        let hash = hex!("3f6a0c8d21e4b5a7c9d8e7f60112233445566778899aabbc b3a2e147cf050000");
        let target = parse_target("b88d0600").unwrap();
        assert!(meets_target(&hash, target));
        let mut miss = hash;
        miss[30] = 0x07;
        assert!(!meets_target(&miss, target));
    }

    #[test]
    fn share_hex_encoding() {
        let share = Share {
            worker_id: "w".into(),
            job_id: "j".into(),
            nonce: 0x0403_0201,
            result: [0xAA; 32],
        };
        assert_eq!(share.nonce_hex(), "01020304");
        assert_eq!(share.result_hex().len(), 64);
    }
}
