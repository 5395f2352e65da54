use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroizing;

const MAGIC: &[u8; 4] = b"MTV1";
const PARAMS_LEN: usize = 12;
const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + PARAMS_LEN + SALT_LEN + NONCE_LEN;
/// Prepended to the plaintext before sealing; a wrong passphrase that
/// somehow authenticates still fails this check.
const VERIFY_TAG: &[u8] = b"MOONTHREAD";
/// Envelopes asking for more memory than this are rejected unread.
const MAX_MEMORY_KIB: u32 = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("decryption failed: wrong passphrase or corrupted data")]
    Decryption,
    #[error("invalid vault format")]
    InvalidFormat,
}

/// Argon2id cost parameters. Stored in every envelope so a vault stays
/// readable after the defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    fn encode(&self) -> [u8; PARAMS_LEN] {
        let mut out = [0u8; PARAMS_LEN];
        out[..4].copy_from_slice(&self.memory_kib.to_le_bytes());
        out[4..8].copy_from_slice(&self.iterations.to_le_bytes());
        out[8..].copy_from_slice(&self.parallelism.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        let word = |i: usize| -> Result<u32, CryptoError> {
            bytes
                .get(i * 4..i * 4 + 4)
                .and_then(|b| b.try_into().ok())
                .map(u32::from_le_bytes)
                .ok_or(CryptoError::InvalidFormat)
        };
        let params = Self::new(word(0)?, word(1)?, word(2)?);
        if params.memory_kib > MAX_MEMORY_KIB {
            return Err(CryptoError::InvalidFormat);
        }
        Ok(params)
    }
}

/// Derive a 256-bit key from a passphrase and salt using Argon2id.
fn derive_key(
    passphrase: &str,
    salt: &[u8],
    kdf: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(KEY_LEN))
        .map_err(|_| CryptoError::KeyDerivation)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|_| CryptoError::KeyDerivation)?;

    Ok(key)
}

/// Encrypt `plaintext` under `passphrase`.
///
/// Layout: `MTV1 || kdf params (3 x u32 LE) || salt (32) || nonce (12) || ciphertext`
pub fn seal(passphrase: &str, plaintext: &[u8], kdf: &KdfParams) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let key = derive_key(passphrase, &salt, kdf)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Encryption)?;

    let mut payload = Zeroizing::new(Vec::with_capacity(VERIFY_TAG.len() + plaintext.len()));
    payload.extend_from_slice(VERIFY_TAG);
    payload.extend_from_slice(plaintext);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), payload.as_slice())
        .map_err(|_| CryptoError::Encryption)?;

    let mut output = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.extend_from_slice(&kdf.encode());
    output.extend_from_slice(&salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Decrypt an envelope produced by [`seal`].
pub fn open(passphrase: &str, envelope: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if envelope.len() < HEADER_LEN || &envelope[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::InvalidFormat);
    }

    let (params, rest) = envelope[MAGIC.len()..].split_at(PARAMS_LEN);
    let (salt, rest) = rest.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
    let kdf = KdfParams::decode(params)?;

    let key = derive_key(passphrase, salt, &kdf)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Decryption)?;

    let decrypted = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decryption)?,
    );

    match decrypted.strip_prefix(VERIFY_TAG) {
        Some(plaintext) => Ok(Zeroizing::new(plaintext.to_vec())),
        None => Err(CryptoError::Decryption),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> KdfParams {
        KdfParams::new(8, 1, 1)
    }

    #[test]
    fn seal_then_open() {
        let sealed = seal("test-passphrase-123", b"period log", &cheap()).unwrap();
        assert_eq!(&sealed[..4], MAGIC);

        let opened = open("test-passphrase-123", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"period log");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = seal("correct", b"secret data", &cheap()).unwrap();
        assert!(matches!(open("wrong", &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn truncated_or_foreign_data_is_a_format_error() {
        assert!(matches!(open("any", &[0u8; 10]), Err(CryptoError::InvalidFormat)));

        let mut sealed = seal("pass", b"data", &cheap()).unwrap();
        sealed[0] = b'X';
        assert!(matches!(open("pass", &sealed), Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut sealed = seal("pass", b"data", &cheap()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(open("pass", &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn params_travel_with_the_envelope() {
        let kdf = KdfParams::new(16, 2, 1);
        let sealed = seal("pass", b"data", &kdf).unwrap();
        assert_eq!(KdfParams::decode(&sealed[4..16]).unwrap(), kdf);
    }

    #[test]
    fn oversized_memory_cost_is_rejected() {
        let mut sealed = seal("pass", b"data", &cheap()).unwrap();
        sealed[4..8].copy_from_slice(&(MAX_MEMORY_KIB + 1).to_le_bytes());
        assert!(matches!(open("pass", &sealed), Err(CryptoError::InvalidFormat)));
    }
}
