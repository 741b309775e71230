use super::{encode_point, KeyShare};
use crate::{exception::*, party::Party, secret::SecretHex};
use k256::{elliptic_curve::PrimeField, FieldBytes, ProjectivePoint, Scalar};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

pub const SEED_CHAIN_LEN: usize = 64;

/// 2-of-3 Shamir sharing over secp256k1.
///
/// The 64-byte seed chain is split into a 32-byte seed and a 32-byte chain
/// code. The party secret `u` and the polynomial coefficient `a` are the two
/// halves of SHA-512(seed), so a fixed seed chain reproduces the whole share.
#[derive(Clone, Copy, Debug, Default)]
pub struct Secp256k1ShareGenerator;

impl Secp256k1ShareGenerator {
    pub fn generate_from_seed(
        &self,
        owner: Party,
        seed_chain: &[u8; SEED_CHAIN_LEN],
    ) -> Outcome<KeyShare> {
        let (seed, chain_code) = seed_chain.split_at(32);
        let digest = Zeroizing::new(Sha512::digest(seed).to_vec());
        let u = scalar_from_digest(&digest[..32])?;
        let a = scalar_from_digest(&digest[32..])?;

        let public_component = encode_point(&(ProjectivePoint::GENERATOR * u))?;

        // f(x) = u + a·x, evaluated at each recipient's index.
        let mut sub_shares: [SecretHex; 3] = Default::default();
        for recipient in [Party::User, Party::Backup, Party::Platform] {
            let x = Scalar::from(recipient.index() as u64);
            let share = u + a * x;
            let slot = owner.recipient_slot(recipient);
            sub_shares[slot.position()] = SecretHex::from_bytes(&share.to_bytes());
        }

        KeyShare::new(
            owner,
            public_component,
            sub_shares,
            hex::encode(chain_code),
            Some(SecretHex::from_bytes(seed)),
        )
    }
}

impl super::ShareGenerator for Secp256k1ShareGenerator {
    fn generate(&self, owner: Party) -> Outcome<KeyShare> {
        let mut seed_chain = Zeroizing::new([0u8; SEED_CHAIN_LEN]);
        OsRng.fill_bytes(&mut seed_chain[..]);
        self.generate_from_seed(owner, &seed_chain)
    }
}

/// Interprets 32 digest bytes as a non-zero scalar, re-hashing in the
/// (negligible) case they fall outside the group order.
fn scalar_from_digest(bytes: &[u8]) -> Outcome<Scalar> {
    let mut candidate = Zeroizing::new(bytes.to_vec());
    for _ in 0..16 {
        let repr = FieldBytes::clone_from_slice(&candidate[..32]);
        let scalar: Option<Scalar> = Scalar::from_repr(repr).into();
        match scalar {
            Some(s) if !bool::from(s.is_zero()) => return Ok(s),
            _ => candidate = Zeroizing::new(Sha512::digest(candidate.as_slice()).to_vec()),
        }
    }
    Err(KeychainError::Internal(
        "could not derive a scalar from the seed".to_owned(),
    ))
}
