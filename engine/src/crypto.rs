//! Commit-hash recomputation and ECDSA signer recovery, the two
//! cryptographic primitives the validators need.
//!
//! Hashing is done with `ethers::utils::keccak256`; signature recovery uses
//! the `secp256k1` crate's `recovery` feature.

use ethers::types::{Address, U256};
use secp256k1::{
	ecdsa::{RecoverableSignature, RecoveryId},
	Message, Secp256k1,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
	#[error("invalid recovery id derived from v={0}")]
	InvalidRecoveryId(u64),
	#[error("malformed signature: {0}")]
	MalformedSignature(String),
	#[error("signature did not recover to a valid public key: {0}")]
	RecoveryFailed(String),
}

/// Recomputes the FTSO commit hash a voter's `submit1` should have carried:
/// `keccak256(submit_address || voting_epoch_id(32, BE) || round(32, BE) ||
/// feed_v)`.
pub fn compute_ftso_commit_hash(
	submit_address: Address,
	voting_epoch_id: u32,
	round: U256,
	feed_v: &[u8],
) -> [u8; 32] {
	let mut buf = Vec::with_capacity(20 + 32 + 32 + feed_v.len());
	buf.extend_from_slice(submit_address.as_bytes());
	buf.extend_from_slice(&u256_be(U256::from(voting_epoch_id)));
	buf.extend_from_slice(&u256_be(round));
	buf.extend_from_slice(feed_v);
	ethers::utils::keccak256(buf)
}

fn u256_be(value: U256) -> [u8; 32] {
	let mut out = [0u8; 32];
	value.to_big_endian(&mut out);
	out
}

/// Maps a transaction-encoded `v` (legacy 27/28, or EIP-155
/// `chain_id*2+35`/`+36`) to the 0/1 recovery id `secp256k1` expects.
pub fn normalize_recovery_id(v: u64) -> Result<RecoveryId, CryptoError> {
	let id = match v {
		0 | 1 => v,
		27 | 28 => v - 27,
		v if v >= 35 => (v - 35) % 2,
		other => return Err(CryptoError::InvalidRecoveryId(other)),
	};
	RecoveryId::from_i32(id as i32).map_err(|_| CryptoError::InvalidRecoveryId(v))
}

/// Recovers the signer address from a 32-byte message hash and an
/// `(v, r, s)` ECDSA signature.
pub fn recover_signer(
	message_hash: [u8; 32],
	v: u64,
	r: &[u8; 32],
	s: &[u8; 32],
) -> Result<Address, CryptoError> {
	let recovery_id = normalize_recovery_id(v)?;

	let mut sig_bytes = [0u8; 64];
	sig_bytes[..32].copy_from_slice(r);
	sig_bytes[32..].copy_from_slice(s);

	let signature = RecoverableSignature::from_compact(&sig_bytes, recovery_id)
		.map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;

	let message = Message::from_slice(&message_hash)
		.map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;

	let secp = Secp256k1::verification_only();
	let public_key = secp
		.recover_ecdsa(&message, &signature)
		.map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;

	let uncompressed = public_key.serialize_uncompressed();
	let hash = ethers::utils::keccak256(&uncompressed[1..]);
	Ok(Address::from_slice(&hash[12..]))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn commit_hash_is_deterministic_and_sensitive_to_inputs() {
		let addr = Address::from_low_u64_be(1);
		let a = compute_ftso_commit_hash(addr, 7, U256::from(42u64), b"feeds");
		let b = compute_ftso_commit_hash(addr, 7, U256::from(42u64), b"feeds");
		assert_eq!(a, b);

		let c = compute_ftso_commit_hash(addr, 8, U256::from(42u64), b"feeds");
		assert_ne!(a, c);

		let d = compute_ftso_commit_hash(addr, 7, U256::from(43u64), b"feeds");
		assert_ne!(a, d);
	}

	#[test]
	fn normalizes_legacy_and_eip155_v() {
		assert_eq!(normalize_recovery_id(27).unwrap(), RecoveryId::from_i32(0).unwrap());
		assert_eq!(normalize_recovery_id(28).unwrap(), RecoveryId::from_i32(1).unwrap());
		assert_eq!(normalize_recovery_id(0).unwrap(), RecoveryId::from_i32(0).unwrap());
		// chain id 19 (Songbird): 19*2+35 = 73 (even recovery id), +36 = 74 (odd)
		assert_eq!(normalize_recovery_id(73).unwrap(), RecoveryId::from_i32(0).unwrap());
		assert_eq!(normalize_recovery_id(74).unwrap(), RecoveryId::from_i32(1).unwrap());
	}

	#[test]
	fn rejects_out_of_range_v() {
		assert!(normalize_recovery_id(2).is_err());
	}
}
