//! Submission calldata parsing.
//!
//! `submit1`/`submit2`/`submitSignatures` calldata (after the 4-byte function
//! selector, stripped by the caller) is a sequence of zero or more
//! `protocol_id(1) | voting_round_id(4,BE) | length(2,BE) | payload(length)`
//! segments: keep draining the buffer until it's empty, dispatching each
//! segment by `protocol_id`.

use ethers::types::{Bytes, U256};
use thiserror::Error;

use crate::{
	bytes::{ByteParser, ByteParserError},
	constants::{FDC_PROTOCOL_ID, FTSO_PROTOCOL_ID},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error(transparent)]
	ByteParser(#[from] ByteParserError),
	#[error("unrecognized protocol id {0}")]
	UnknownProtocol(u8),
	#[error("bitvote length {got} does not cover {expected} requests")]
	BitvoteLengthInvalid { expected: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
	pub protocol_id: u8,
	pub voting_round_id: u32,
	pub payload: Vec<u8>,
}

/// Splits a `submit*` transaction body into its per-protocol segments.
pub fn parse_segments(body: &[u8]) -> Result<Vec<Segment>, ParseError> {
	let mut p = ByteParser::new(body);
	let mut segments = Vec::new();

	while !p.is_empty() {
		let protocol_id = p.u8()?;
		let voting_round_id = p.u32()?;
		let length = p.u16()? as usize;
		let payload = p.bytes(length)?.to_vec();
		segments.push(Segment { protocol_id, voting_round_id, payload });
	}

	Ok(segments)
}

pub fn ftso_segment(segments: &[Segment]) -> Option<&Segment> {
	segments.iter().find(|s| s.protocol_id == FTSO_PROTOCOL_ID)
}

pub fn fdc_segment(segments: &[Segment]) -> Option<&Segment> {
	segments.iter().find(|s| s.protocol_id == FDC_PROTOCOL_ID)
}

/// `submit1` FTSO payload: just the round's commit hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FtsoSubmit1 {
	pub commit_hash: [u8; 32],
}

pub fn parse_ftso_submit1(payload: &[u8]) -> Result<FtsoSubmit1, ParseError> {
	let mut p = ByteParser::new(payload);
	Ok(FtsoSubmit1 { commit_hash: p.bytes32()? })
}

/// Width, in bytes, of one feed value within a `submit2` FTSO payload.
pub const FEED_VALUE_WIDTH: usize = 4;
/// Sentinel marking a feed the voter chose not to reveal a value for.
pub const FEED_VALUE_UNSET: [u8; FEED_VALUE_WIDTH] = [0x80, 0x00, 0x00, 0x00];

/// `submit2` FTSO payload: a leading `round`, then the revealed feed values — the remaining bytes after
/// `round` doubling as `feed_v` when recomputing the commit hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtsoSubmit2 {
	pub round: U256,
	pub feed_v: Bytes,
	pub values: Vec<Option<[u8; FEED_VALUE_WIDTH]>>,
}

pub fn parse_ftso_submit2(payload: &[u8]) -> Result<FtsoSubmit2, ParseError> {
	let mut p = ByteParser::new(payload);
	let round = U256::from_big_endian(&p.bytes32()?);
	let feed_v = p.drain();

	let values = feed_v
		.chunks_exact(FEED_VALUE_WIDTH)
		.map(|chunk| {
			let mut value = [0u8; FEED_VALUE_WIDTH];
			value.copy_from_slice(chunk);
			if value == FEED_VALUE_UNSET {
				None
			} else {
				Some(value)
			}
		})
		.collect();

	Ok(FtsoSubmit2 { round, feed_v: Bytes::from(feed_v.to_vec()), values })
}

/// `submit2` FDC payload: the bitvote over the round's attestation requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdcSubmit2 {
	pub number_of_requests: u16,
	pub bit_vector: Vec<bool>,
}

pub fn parse_fdc_submit2(payload: &[u8]) -> Result<FdcSubmit2, ParseError> {
	let mut p = ByteParser::new(payload);
	let number_of_requests = p.u16()?;

	let expected_bytes = (number_of_requests as usize).div_ceil(8);
	let packed = p.drain();
	if packed.len() < expected_bytes {
		return Err(ParseError::BitvoteLengthInvalid {
			expected: number_of_requests as usize,
			got: packed.len() * 8,
		});
	}

	let bit_vector = (0..number_of_requests as usize)
		.map(|i| (packed[i / 8] >> (i % 8)) & 1 == 1)
		.collect();

	Ok(FdcSubmit2 { number_of_requests, bit_vector })
}

/// An ECDSA signature as carried in `submitSignatures` calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSignature {
	pub v: String,
	pub r: String,
	pub s: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSignatures {
	pub signature: SubmissionSignature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdcSubmitSignatures {
	pub signature: SubmissionSignature,
	pub unsigned_message: Vec<u8>,
}

fn parse_signature(p: &mut ByteParser) -> Result<SubmissionSignature, ParseError> {
	let v = p.u8()?;
	let r = p.bytes32()?;
	let s = p.bytes32()?;
	Ok(SubmissionSignature {
		v: format!("0x{}", hex::encode([v])),
		r: format!("0x{}", hex::encode(r)),
		s: format!("0x{}", hex::encode(s)),
	})
}

pub fn parse_submit_signatures(payload: &[u8]) -> Result<SubmitSignatures, ParseError> {
	let mut p = ByteParser::new(payload);
	Ok(SubmitSignatures { signature: parse_signature(&mut p)? })
}

pub fn parse_fdc_submit_signatures(payload: &[u8]) -> Result<FdcSubmitSignatures, ParseError> {
	let mut p = ByteParser::new(payload);
	let signature = parse_signature(&mut p)?;
	let unsigned_message = p.drain().to_vec();
	Ok(FdcSubmitSignatures { signature, unsigned_message })
}
