use ring::hmac;

use super::Algorithm;
use crate::error::Result;

/// The cryptographic provider behind code computation. Importing the key
/// and signing are separate steps so a provider may hold the imported key
/// in whatever form it needs.
///
/// Both steps are synchronous, unlike the promise based WebCrypto
/// `importKey`/`sign` pair. A provider backed by a slow device should be
/// driven from a worker thread; an `Otp` can be shared with it freely.
pub trait HmacProvider {
    type Key;

    fn import_key(&self, algorithm: Algorithm, raw: &[u8]) -> Result<Self::Key>;

    fn sign(&self, key: &Self::Key, message: &[u8]) -> Result<Vec<u8>>;
}

/// HMAC through `ring`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ring;

impl From<Algorithm> for hmac::Algorithm {
    fn from(algorithm: Algorithm) -> hmac::Algorithm {
        match algorithm {
            Algorithm::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Algorithm::Sha256 => hmac::HMAC_SHA256,
            Algorithm::Sha512 => hmac::HMAC_SHA512,
        }
    }
}

impl HmacProvider for Ring {
    type Key = hmac::Key;

    fn import_key(&self, algorithm: Algorithm, raw: &[u8]) -> Result<hmac::Key> {
        Ok(hmac::Key::new(algorithm.into(), raw))
    }

    fn sign(&self, key: &hmac::Key, message: &[u8]) -> Result<Vec<u8>> {
        Ok(hmac::sign(key, message).as_ref().to_vec())
    }
}
