// ── pwsafe3 / keyschedule ────────────────────────────────────────────────────
//
// Passphrase -> stretched key, verifier, and the TwoFish-ECB wrap of the
// per-file body (K) and authentication (L) keys (§4.5). This is a plain
// iterated SHA-256, *not* PBKDF2 — preserved exactly as the format defines
// it, however quaint that looks next to a modern KDF.

use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Error, Result};

/// Minimum iteration count honored on write; reads preserve whatever value
/// is stored in the file, even if it is lower (§4.4 step 10, §6.1).
pub const MIN_ITERATIONS: u32 = 2048;

type TwofishEcbEnc = ecb::Encryptor<Twofish>;
type TwofishEcbDec = ecb::Decryptor<Twofish>;

/// `h0 = SHA256(passphrase || salt); h_{i+1} = SHA256(h_i); stretched = h_iter`.
pub fn stretch_key(passphrase: &[u8], salt: &[u8; 32], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(passphrase);
    hasher.update(salt);
    let mut h: [u8; 32] = hasher.finalize().into();
    for _ in 0..iterations {
        h = Sha256::digest(h).into();
    }
    Zeroizing::new(h)
}

/// The verifier stored in the file header: `SHA256(stretched)`.
pub fn verifier(stretched: &[u8; 32]) -> [u8; 32] {
    Sha256::digest(stretched).into()
}

/// Confirms `verifier(stretched) == expected` in constant time.
pub fn check_verifier(stretched: &[u8; 32], expected: &[u8; 32]) -> Result<()> {
    let computed = verifier(stretched);
    if computed.ct_eq(expected).into() {
        Ok(())
    } else {
        Err(Error::Crypto(CryptoError::PasswordMismatch))
    }
}

/// Unwraps a 32-byte key (K or L) via TwoFish-256-ECB decryption under the
/// stretched key, independently of the other key.
pub fn unwrap_key(stretched: &[u8; 32], wrapped: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut buf = *wrapped;
    let cipher = TwofishEcbDec::new(stretched.into());
    cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .expect("32-byte input is exactly two 16-byte blocks");
    Zeroizing::new(buf)
}

/// Wraps a 32-byte key (K or L) via TwoFish-256-ECB encryption under the
/// stretched key.
pub fn wrap_key(stretched: &[u8; 32], key: &[u8; 32]) -> [u8; 32] {
    let mut buf = *key;
    let cipher = TwofishEcbEnc::new(stretched.into());
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, 32)
        .expect("32-byte input is exactly two 16-byte blocks");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_round_trips_through_wrap() {
        let salt = [7u8; 32];
        let stretched = stretch_key(b"hunter2", &salt, MIN_ITERATIONS);
        let v = verifier(&stretched);
        assert!(check_verifier(&stretched, &v).is_ok());
    }

    #[test]
    fn wrong_passphrase_fails_verifier() {
        let salt = [7u8; 32];
        let stretched = stretch_key(b"hunter2", &salt, MIN_ITERATIONS);
        let v = verifier(&stretched);
        let other = stretch_key(b"wrong", &salt, MIN_ITERATIONS);
        assert!(matches!(
            check_verifier(&other, &v),
            Err(Error::Crypto(CryptoError::PasswordMismatch))
        ));
    }

    #[test]
    fn key_wrap_round_trips() {
        let stretched = [3u8; 32];
        let key = [9u8; 32];
        let wrapped = wrap_key(&stretched, &key);
        assert_ne!(wrapped, key);
        let unwrapped = unwrap_key(&stretched, &wrapped);
        assert_eq!(*unwrapped, key);
    }
}
