//! FTSO (protocol 100) commit-reveal-sign validator.
//!
//! Runs once per finalized voting round against the single configured
//! identity: a missing `submit1` is merely informational (nothing obliges a
//! voter to participate in every round), but a missing `submit2` after a
//! committed `submit1`, or a reveal that doesn't match its own commitment, is
//! a reveal offence (CRITICAL). A missing or non-recovering
//! `submitSignatures` is graded ERROR — it costs the voter its signing
//! reward but isn't itself a protocol violation the way a bad reveal is.

use crate::{
	constants::{FTSO_PROTOCOL_ID, SUBMIT_SIGNATURES_DEADLINE_OFFSET_SECONDS},
	crypto::{compute_ftso_commit_hash, recover_signer},
	entity::Entity,
	epoch::VotingEpoch,
	message::{Message, MessageLevel},
	voting_round::VotingRound,
};

use super::ValidationReport;

pub fn validate_ftso_round(round: &VotingRound, identity: &Entity, voting_epoch: VotingEpoch) -> ValidationReport {
	let mut report = Vec::new();
	let e = voting_epoch;
	let n = e.next();

	let submit_1 = round.ftso.submit_1.extract_latest(&identity.identity, e.start_s(), e.end_s());
	let submit_2 = round.ftso.submit_2.extract_latest(&identity.identity, n.start_s(), n.reveal_deadline());

	let sig_window_start = n.reveal_deadline();
	let sig_window_end = (n.start_s() + SUBMIT_SIGNATURES_DEADLINE_OFFSET_SECONDS)
		.max(round.ftso.finalization.as_ref().map(|f| f.timestamp + 1).unwrap_or(0));
	let submit_signatures =
		round.ftso.submit_signatures.extract_latest(&identity.identity, sig_window_start, sig_window_end);

	if submit_1.is_none() {
		report.push(
			Message::builder(MessageLevel::Info, FTSO_PROTOCOL_ID, e)
				.entity(identity.identity)
				.text("no submit1 transaction")
				.build(),
		);
	}

	if submit_1.is_some() && submit_2.is_none() {
		report.push(
			Message::builder(MessageLevel::Critical, FTSO_PROTOCOL_ID, e)
				.entity(identity.identity)
				.text("no submit2 transaction, causing reveal offence")
				.build(),
		);
	}

	if let Some(s2) = submit_2 {
		let unset_indices: Vec<String> = s2
			.payload
			.values
			.iter()
			.enumerate()
			.filter(|(_, v)| v.is_none())
			.map(|(i, _)| i.to_string())
			.collect();

		if !unset_indices.is_empty() {
			report.push(
				Message::builder(MessageLevel::Warning, FTSO_PROTOCOL_ID, e)
					.entity(identity.identity)
					.text(format!("submit 2 had 'None' on indices {}", unset_indices.join(",")))
					.build(),
			);
		}
	}

	if let (Some(s1), Some(s2)) = (submit_1, submit_2) {
		let expected = compute_ftso_commit_hash(identity.submit, e.id, s2.payload.round, &s2.payload.feed_v);
		if expected != s1.payload.commit_hash {
			report.push(
				Message::builder(MessageLevel::Critical, FTSO_PROTOCOL_ID, e)
					.entity(identity.identity)
					.text("commit hash and reveal didn't match, causing reveal offence")
					.build(),
			);
		}
	}

	if submit_signatures.is_none() {
		report.push(
			Message::builder(MessageLevel::Error, FTSO_PROTOCOL_ID, e)
				.entity(identity.identity)
				.text("no submit signatures transaction")
				.build(),
		);
	}

	if let (Some(finalization), Some(sig)) = (&round.ftso.finalization, submit_signatures) {
		if check_signature_recovers(finalization.to_message(), &sig.payload.signature, identity.signing_policy).is_err()
		{
			report.push(
				Message::builder(MessageLevel::Error, FTSO_PROTOCOL_ID, e)
					.entity(identity.identity)
					.text("submit signatures signature doesn't match finalization")
					.build(),
			);
		}
	}

	report
}

fn check_signature_recovers(
	message_hash: [u8; 32],
	signature: &crate::parsers::SubmissionSignature,
	expected_signer: ethers::types::Address,
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
