//! # BLS Verification (BLS12-381)
//!
//! Ethereum consensus flavour of BLS: public keys on G1 (48 bytes compressed),
//! signatures on G2 (96 bytes compressed). This uses blst's `min_pk` variant.
//!
//! ## Batch Verification
//!
//! A batch check multiplies every set by a random 64-bit scalar before the
//! combined pairing check, so one invalid signature cannot be cancelled out
//! by another crafted one.
//!
//! ## Same-Message Verification
//!
//! Many signers of one message collapse into a single pairing check: every
//! key and signature is multiplied by the same random 64-bit weight, the
//! weighted keys and signatures are summed, and the sums are verified once.

use super::entities::{BlsPublicKey, PublicKeySignaturePair, ResolvedSignatureSet, SigningRoot};
use super::errors::CryptoError;
use crate::ports::outbound::BlsCrypto;
use blst::min_pk::{AggregatePublicKey, PublicKey, Signature};
use blst::{
    blst_p1, blst_p1_add_or_double, blst_p1_affine, blst_p1_compress, blst_p1_from_affine,
    blst_p1_mult, blst_p1_uncompress, blst_p2, blst_p2_add_or_double, blst_p2_affine,
    blst_p2_compress, blst_p2_from_affine, blst_p2_mult, blst_p2_uncompress, blst_scalar,
    BLST_ERROR,
};
use rand::Rng;

/// Domain Separation Tag for Ethereum consensus signatures (proof of possession)
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Bits of randomness per set in a batch check
const RAND_BITS: usize = 64;

/// Verify a single BLS signature.
///
/// Undecodable keys or signatures are invalid, not errors.
pub fn verify_bls(set: &ResolvedSignatureSet) -> bool {
    let Ok(sig) = Signature::from_bytes(&set.signature.bytes) else {
        return false;
    };
    let Ok(pk) = PublicKey::from_bytes(&set.public_key.bytes) else {
        return false;
    };

    sig.verify(true, &set.message, DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS
}

/// Verify many signature sets with one randomised multi-pairing check.
///
/// True iff every set is valid.
pub fn verify_bls_batch(sets: &[ResolvedSignatureSet]) -> Result<bool, CryptoError> {
    if sets.is_empty() {
        return Err(CryptoError::MalformedBatch("no sets to verify".to_string()));
    }

    let mut pks = Vec::with_capacity(sets.len());
    let mut sigs = Vec::with_capacity(sets.len());
    for set in sets {
        let Ok(pk) = PublicKey::from_bytes(&set.public_key.bytes) else {
            return Ok(false);
        };
        let Ok(sig) = Signature::from_bytes(&set.signature.bytes) else {
            return Ok(false);
        };
        pks.push(pk);
        sigs.push(sig);
    }

    let msgs: Vec<&[u8]> = sets.iter().map(|s| s.message.as_slice()).collect();
    let pk_refs: Vec<&PublicKey> = pks.iter().collect();
    let sig_refs: Vec<&Signature> = sigs.iter().collect();
    let rands = random_scalars(sets.len());

    let result = Signature::verify_multiple_aggregate_signatures(
        &msgs, DST, &pk_refs, true, &sig_refs, true, &rands, RAND_BITS,
    );
    Ok(result == BLST_ERROR::BLST_SUCCESS)
}

/// Aggregate participant public keys into one key.
///
/// # Errors
/// * `EmptyAggregation` if the input list is empty
/// * `InvalidFormat` if any public key cannot be parsed
pub fn aggregate_bls_public_keys(
    public_keys: &[BlsPublicKey],
) -> Result<BlsPublicKey, CryptoError> {
    if public_keys.is_empty() {
        return Err(CryptoError::EmptyAggregation);
    }

    let pks = public_keys
        .iter()
        .map(|pk| {
            PublicKey::from_bytes(&pk.bytes)
                .map_err(|e| CryptoError::InvalidFormat(format!("{e:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let pk_refs: Vec<&PublicKey> = pks.iter().collect();

    let aggregate = AggregatePublicKey::aggregate(&pk_refs, true)
        .map_err(|e| CryptoError::InvalidFormat(format!("{e:?}")))?;

    Ok(BlsPublicKey::from_bytes(aggregate.to_public_key().to_bytes()))
}

/// Verify many signers of one message with a single pairing check.
///
/// Computes `sum(r_i * pk_i)` and `sum(r_i * sig_i)` with random non-zero
/// 64-bit weights `r_i` and verifies the weighted aggregate signature against
/// the weighted aggregate key. True iff every pair is valid, except with
/// negligible probability.
pub fn verify_bls_same_message(
    message: &SigningRoot,
    pairs: &[PublicKeySignaturePair],
) -> Result<bool, CryptoError> {
    if pairs.is_empty() {
        return Err(CryptoError::MalformedBatch("no pairs to verify".to_string()));
    }

    let mut aggregate_pk: Option<blst_p1> = None;
    let mut aggregate_sig: Option<blst_p2> = None;
    for (pair, weight) in pairs.iter().zip(random_scalars(pairs.len())) {
        let (Some(pk), Some(sig)) = (
            decode_public_key(&pair.public_key),
            decode_signature(&pair.signature.bytes),
        ) else {
            return Ok(false);
        };

        let mut weighted_pk = blst_p1::default();
        let mut weighted_sig = blst_p2::default();
        // SAFETY: every pointer refers to a live, initialized point or to the
        // 32-byte scalar, of which only the low RAND_BITS bits are read.
        unsafe {
            blst_p1_mult(&mut weighted_pk, &pk, weight.b.as_ptr(), RAND_BITS);
            blst_p2_mult(&mut weighted_sig, &sig, weight.b.as_ptr(), RAND_BITS);
        }

        aggregate_pk = Some(match aggregate_pk {
            None => weighted_pk,
            Some(mut sum) => {
                let acc: *mut blst_p1 = &mut sum;
                // SAFETY: blst allows the output to alias an input.
                unsafe { blst_p1_add_or_double(acc, acc, &weighted_pk) };
                sum
            }
        });
        aggregate_sig = Some(match aggregate_sig {
            None => weighted_sig,
            Some(mut sum) => {
                let acc: *mut blst_p2 = &mut sum;
                // SAFETY: blst allows the output to alias an input.
                unsafe { blst_p2_add_or_double(acc, acc, &weighted_sig) };
                sum
            }
        });
    }

    let (Some(aggregate_pk), Some(aggregate_sig)) = (aggregate_pk, aggregate_sig) else {
        return Ok(false);
    };

    let mut pk_bytes = [0u8; 48];
    let mut sig_bytes = [0u8; 96];
    // SAFETY: the output buffers have the compressed sizes of G1 and G2.
    unsafe {
        blst_p1_compress(pk_bytes.as_mut_ptr(), &aggregate_pk);
        blst_p2_compress(sig_bytes.as_mut_ptr(), &aggregate_sig);
    }

    let (Ok(pk), Ok(sig)) = (
        PublicKey::from_bytes(&pk_bytes),
        Signature::from_bytes(&sig_bytes),
    ) else {
        return Ok(false);
    };

    // Inputs were group checked one by one above.
    Ok(sig.verify(false, message, DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS)
}

/// Group-checked, non-infinity public key as a projective point.
fn decode_public_key(public_key: &BlsPublicKey) -> Option<blst_p1> {
    PublicKey::key_validate(&public_key.bytes).ok()?;

    let mut affine = blst_p1_affine::default();
    let mut point = blst_p1::default();
    // SAFETY: `bytes` holds exactly one compressed G1 point.
    unsafe {
        let err = blst_p1_uncompress(&mut affine, public_key.bytes.as_ptr());
        if err != BLST_ERROR::BLST_SUCCESS {
            return None;
        }
        blst_p1_from_affine(&mut point, &affine);
    }
    Some(point)
}

/// Group-checked, non-infinity signature as a projective point.
fn decode_signature(bytes: &[u8; 96]) -> Option<blst_p2> {
    Signature::sig_validate(bytes, true).ok()?;

    let mut affine = blst_p2_affine::default();
    let mut point = blst_p2::default();
    // SAFETY: `bytes` holds exactly one compressed G2 point.
    unsafe {
        if blst_p2_uncompress(&mut affine, bytes.as_ptr()) != BLST_ERROR::BLST_SUCCESS {
            return None;
        }
        blst_p2_from_affine(&mut point, &affine);
    }
    Some(point)
}

// Nonzero scalars only: a zero weight would drop its set from the check.
fn random_scalars(count: usize) -> Vec<blst_scalar> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let weight: u64 = rng.gen_range(1..=u64::MAX);
            let mut b = [0u8; 32];
            b[..8].copy_from_slice(&weight.to_le_bytes());
            blst_scalar { b }
        })
        .collect()
}

/// [`BlsCrypto`] backed by blst.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlstCrypto;

impl BlstCrypto {
    pub fn new() -> Self {
        Self
    }
}

impl BlsCrypto for BlstCrypto {
    fn verify_single(&self, set: &ResolvedSignatureSet) -> Result<bool, CryptoError> {
        Ok(verify_bls(set))
    }

    fn verify_batch(&self, sets: &[ResolvedSignatureSet]) -> Result<bool, CryptoError> {
        verify_bls_batch(sets)
    }

    fn aggregate_public_keys(&self, keys: &[BlsPublicKey]) -> Result<BlsPublicKey, CryptoError> {
        aggregate_bls_public_keys(keys)
    }

    fn verify_same_message(
        &self,
        message: &SigningRoot,
        pairs: &[PublicKeySignaturePair],
    ) -> Result<bool, CryptoError> {
        verify_bls_same_message(message, pairs)
    }
}
