//! FDC (protocol 200) bitvote consensus validator.
//!
//! FDC has no commit phase — a missing `submit1` is expected and never an
//! issue. `submit2` carries a bitvote over the round's attestation requests;
//! the round-wide consensus bitvote is inflated once from the most commonly
//! signed `unsigned_message` tallied in `consensus_bitvote`, then the
//! monitored identity's own bitvote is checked against it index by index.

use ethers::types::Address;
use thiserror::Error;

use crate::{
	constants::{FDC_PROTOCOL_ID, SUBMIT_SIGNATURES_DEADLINE_OFFSET_SECONDS},
	crypto::recover_signer,
	entity::Entity,
	epoch::VotingEpoch,
	message::{Message, MessageLevel},
	voting_round::VotingRound,
};

use super::ValidationReport;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FdcValidationError {
	#[error("Invalid payload length.")]
	InvalidPayloadLength,
}

/// Parses a `consensus_bitvote` key as `(n_requests: u16, remainder)` and
/// inflates `remainder` into a boolean array of length `n_requests`,
/// walking `remainder` in reverse byte order : a set bit whose
/// derived index falls below zero means the encoded length doesn't actually
/// match `n_requests`, which can only happen with corrupt on-chain data.
fn inflate_consensus_bitvote(key: &[u8]) -> Result<(u16, Vec<bool>), FdcValidationError> {
	if key.len() < 2 {
		return Err(FdcValidationError::InvalidPayloadLength);
	}
	let n_requests = u16::from_be_bytes([key[0], key[1]]);
	let remainder = &key[2..];
	let mut bits = vec![false; n_requests as usize];

	for (j, byte) in remainder.iter().rev().enumerate() {
		for shift in 0..8i64 {
			let i = n_requests as i64 - 1 - (j as i64) * 8 - shift;
			let bit_set = (byte >> shift) & 1 == 1;
			if i < 0 {
				if bit_set {
					return Err(FdcValidationError::InvalidPayloadLength);
				}
			} else {
				bits[i as usize] = bit_set;
			}
		}
	}

	Ok((n_requests, bits))
}

pub fn validate_fdc_round(
	round: &VotingRound,
	identity: &Entity,
	voting_epoch: VotingEpoch,
) -> Result<ValidationReport, FdcValidationError> {
	let mut report = Vec::new();
	let e = voting_epoch;
	let n = e.next();

	let submit_2 = round.fdc.submit_2.extract_latest(&identity.identity, n.start_s(), n.reveal_deadline());

	let sig_grace_start = n.reveal_deadline();
	let sig_grace_end = (n.start_s() + SUBMIT_SIGNATURES_DEADLINE_OFFSET_SECONDS)
		.max(round.fdc.finalization.as_ref().map(|f| f.timestamp + 1).unwrap_or(0));
	let submit_signatures =
		round.fdc.submit_signatures.extract_latest(&identity.identity, sig_grace_start, sig_grace_end);
	let submit_signatures_deadline =
		round.fdc.submit_signatures.extract_latest(&identity.identity, sig_grace_start, n.end_s());

	let sorted_requests = round.fdc.requests.sorted();
	let consensus = round
		.fdc
		.consensus_bitvote
		.iter()
		.max_by_key(|(_, count)| **count)
		.map(|(key, _)| inflate_consensus_bitvote(key))
		.transpose()?;

	if let Some((n_requests, _)) = &consensus {
		if sorted_requests.len() != *n_requests as usize {
			return Err(FdcValidationError::InvalidPayloadLength);
		}
	}

	// submit_1 absent -> no issue (expected in FDC).

	if submit_2.is_none() {
		report.push(
			Message::builder(MessageLevel::Error, FDC_PROTOCOL_ID, e)
				.entity(identity.identity)
				.text("no submit2 transaction")
				.build(),
		);
	}

	let mut expected_signatures = true;

	if let Some(s2) = submit_2 {
		if s2.payload.number_of_requests as usize != sorted_requests.len() {
			report.push(
				Message::builder(MessageLevel::Error, FDC_PROTOCOL_ID, e)
					.entity(identity.identity)
					.text("submit 2 length didn't match number of requests in round")
					.build(),
			);
			expected_signatures = false;
		} else if let Some((_, consensus_bits)) = &consensus {
			let n_requests = sorted_requests.len();
			for (i, request) in sorted_requests.iter().enumerate() {
				let idx = n_requests - 1 - i;
				let confirmed = s2.payload.bit_vector.get(i).copied().unwrap_or(false);
				if consensus_bits[i] && !confirmed {
					report.push(
						Message::builder(MessageLevel::Error, FDC_PROTOCOL_ID, e)
							.entity(identity.identity)
							.text(format!(
								"submit2 didn't confirm request that was part of consensus {}/{} at index {idx}",
								request.attestation_type_representation(),
								request.source_id_representation()
							))
							.build(),
					);
					expected_signatures = false;
				}
			}
		}
	}

	if submit_2.is_some() && expected_signatures && submit_signatures_deadline.is_none() {
		report.push(
			Message::builder(MessageLevel::Critical, FDC_PROTOCOL_ID, e)
				.entity(identity.identity)
				.text("no submit signatures transaction, causing reveal offence")
				.build(),
		);
	}

	if submit_2.is_some() && submit_signatures_deadline.is_some() && submit_signatures.is_none() {
		report.push(
			Message::builder(MessageLevel::Error, FDC_PROTOCOL_ID, e)
				.entity(identity.identity)
				.text("no submit signatures transaction during grace period, causing loss of rewards")
				.build(),
		);
	}

	if submit_2.is_none() && submit_signatures.is_none() {
		report.push(
			Message::builder(MessageLevel::Error, FDC_PROTOCOL_ID, e)
				.entity(identity.identity)
				.text("no submit signatures transaction")
				.build(),
		);
	}

	if let (Some(finalization), Some(sig)) = (&round.fdc.finalization, submit_signatures) {
		if check_signature_recovers(finalization.to_message(), &sig.payload.signature, identity.signing_policy).is_err()
		{
			report.push(
				Message::builder(MessageLevel::Error, FDC_PROTOCOL_ID, e)
					.entity(identity.identity)
					.text("submit signatures signature doesn't match finalization")
					.build(),
			);
		}
	}

	Ok(report)
}

fn check_signature_recovers(
	message_hash: [u8; 32],
	signature: &crate::parsers::SubmissionSignature,
	expected_signer: Address,
) -> Result<(), String> {
	let v = u64::from_str_radix(signature.v.trim_start_matches("0x"), 16)
		.map_err(|e| format!("malformed v: {e}"))?;
	let r = decode_32(&signature.r)?;
	let s = decode_32(&signature.s)?;

	let recovered =
		recover_signer(message_hash, v, &r, &s).map_err(|e| format!("recovery failed: {e}"))?;

	if recovered != expected_signer {
		return Err(format!("recovered {recovered:?}, expected {expected_signer:?}"));
	}
	Ok(())
}

fn decode_32(hex_str: &str) -> Result<[u8; 32], String> {
	let bytes = hex::decode(hex_str.trim_start_matches("0x")).map_err(|e| e.to_string())?;
	if bytes.len() != 32 {
		return Err(format!("expected 32 bytes, got {}", bytes.len()));
	}
	let mut out = [0u8; 32];
	out.copy_from_slice(&bytes);
	Ok(out)
}

#[cfg(test)]
mod tests {
	use ethers::types::{Address, Bytes};

	use super::*;
	use crate::{
		entity::Entity,
		epoch::VotingEpochFactory,
		events::AttestationRequest,
		parsers::{FdcSubmit2, SubmitSignatures},
		payload::WTxData,
	};

	fn epoch(id: u32) -> VotingEpoch {
		VotingEpochFactory::default_mainnet().epoch(id)
	}

	fn test_entity() -> Entity {
		Entity {
			identity: Address::from_low_u64_be(1),
			submit: Address::from_low_u64_be(2),
			submit_signatures: Address::from_low_u64_be(3),
			signing_policy: Address::from_low_u64_be(4),
			delegation: Address::from_low_u64_be(5),
			public_key: "0xabc".into(),
			nodes: vec![],
			delegation_fee_bips: 0,
			w_nat_weight: 0,
			w_nat_capped_weight: 0,
			registration_weight: 0,
			normalized_weight: 1,
		}
	}

	fn tx(timestamp: i64, from: Address, voting_epoch_id: VotingEpoch) -> WTxData {
		WTxData { block: 1, tx_index: 0, timestamp, from, voting_epoch_id }
	}

	/// Packs a `consensus_bitvote` key the way `inflate_consensus_bitvote`
	/// expects to unpack it: `n_requests` big-endian, then the bit vector
	/// little-endian-packed and byte-reversed.
	fn pack_consensus_key(n_requests: u16, bits: &[bool]) -> Vec<u8> {
		let mut packed = vec![0u8; bits.len().div_ceil(8)];
		for (i, bit) in bits.iter().enumerate() {
			if *bit {
				packed[i / 8] |= 1 << (i % 8);
			}
		}
		packed.reverse();
		let mut key = n_requests.to_be_bytes().to_vec();
		key.extend(packed);
		key
	}

	#[test]
	fn missing_submit2_is_an_error_with_no_requests_in_round() {
		let round = VotingRound::new(Bytes::default());
		let identity = test_entity();
		let report = validate_fdc_round(&round, &identity, epoch(1)).unwrap();

		assert!(report.iter().any(|m| m.level == MessageLevel::Error && m.text == "no submit2 transaction"));
		assert!(report.iter().any(|m| m.text == "no submit signatures transaction"));
	}

	#[test]
	fn non_confirming_bitvote_cites_attestation_type_and_source_id_at_index() {
		let mut round = VotingRound::new(Bytes::default());
		let identity = test_entity();
		let e = epoch(1);
		let n = e.next();

		let mut data = vec![0u8; 64];
		data[0..4].copy_from_slice(b"EVM\0");
		data[32..36].copy_from_slice(b"src\0");
		round.fdc.requests.insert(AttestationRequest {
			data: Bytes::from(data),
			block: 1,
			log_index: 0,
			voting_epoch_id: e,
		});

		round.fdc.consensus_bitvote.insert(pack_consensus_key(1, &[true]), 3);

		round.fdc.submit_2.insert(
			tx(n.start_s() + 1, identity.identity, n),
			FdcSubmit2 { number_of_requests: 1, bit_vector: vec![false] },
		);

		let report = validate_fdc_round(&round, &identity, e).unwrap();
		assert!(report.iter().any(|m| {
			m.level == MessageLevel::Error
				&& m.text.contains("submit2 didn't confirm request")
				&& m.text.contains("EVM/src")
				&& m.text.contains("at index 0")
		}));
	}

	#[test]
	fn confirming_bitvote_produces_no_consensus_mismatch() {
		let mut round = VotingRound::new(Bytes::default());
		let identity = test_entity();
		let e = epoch(1);
		let n = e.next();

		round.fdc.requests.insert(AttestationRequest {
			data: Bytes::from(vec![0u8; 64]),
			block: 1,
			log_index: 0,
			voting_epoch_id: e,
		});
		round.fdc.consensus_bitvote.insert(pack_consensus_key(1, &[true]), 3);
		round.fdc.submit_2.insert(
			tx(n.start_s() + 1, identity.identity, n),
			FdcSubmit2 { number_of_requests: 1, bit_vector: vec![true] },
		);

		let report = validate_fdc_round(&round, &identity, e).unwrap();
		assert!(!report.iter().any(|m| m.text.contains("didn't confirm")));
	}

	#[test]
	fn mismatched_submit2_length_is_flagged_and_skips_signature_requirement() {
		let mut round = VotingRound::new(Bytes::default());
		let identity = test_entity();
		let e = epoch(1);
		let n = e.next();

		round.fdc.requests.insert(AttestationRequest {
			data: Bytes::from(vec![0u8; 64]),
			block: 1,
			log_index: 0,
			voting_epoch_id: e,
		});
		round.fdc.requests.insert(AttestationRequest {
			data: Bytes::from(vec![1u8; 64]),
			block: 2,
			log_index: 0,
			voting_epoch_id: e,
		});
		round.fdc.submit_2.insert(
			tx(n.start_s() + 1, identity.identity, n),
			FdcSubmit2 { number_of_requests: 1, bit_vector: vec![true] },
		);

		let report = validate_fdc_round(&round, &identity, e).unwrap();
		assert!(report
			.iter()
			.any(|m| m.text == "submit 2 length didn't match number of requests in round"));
		assert!(!report.iter().any(|m| m.text.contains("causing reveal offence")));
	}

	#[test]
	fn signatures_present_without_finalization_raises_no_issue() {
		let mut round = VotingRound::new(Bytes::default());
		let identity = test_entity();
		let e = epoch(1);
		let n = e.next();

		round.fdc.submit_signatures.insert(
			tx(n.reveal_deadline() + 1, identity.identity, n),
			SubmitSignatures {
				signature: crate::parsers::SubmissionSignature {
					v: "0x1b".into(),
					r: format!("0x{}", hex::encode([0xaa; 32])),
					s: format!("0x{}", hex::encode([0xbb; 32])),
				},
			},
		);

		let report = validate_fdc_round(&round, &identity, e).unwrap();
		assert!(!report.iter().any(|m| m.text.contains("doesn't match finalization")));
	}
}
