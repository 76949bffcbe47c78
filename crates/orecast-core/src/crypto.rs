//! Credential vault: symmetric encryption of secrets at rest and in transit.
//!
//! Storage access keys are held encrypted in discovery records and user
//! passwords are encrypted before they leave the frontend. Both go through
//! [`CredentialVault`].
//!
//! The key is derived from the configured passphrase with HKDF-SHA256, using
//! a per-cipher info label so the same passphrase never yields the same key
//! for two ciphers. The ciphertext is hex of `nonce (12 bytes) || ciphertext
//! || tag (16 bytes)`. A fresh random nonce is drawn for every encryption, so
//! encrypting the same plaintext twice gives different output.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aead::Nonce;
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// HKDF salt shared by every vault key.
const KDF_SALT: &[u8] = b"orecast-credential-vault";

/// AES-GCM authentication tag length.
const TAG_LEN: usize = 16;

/// Ciphers the vault can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    /// AES-256-GCM. Selected by `aes`, `aes-gcm`, `aes256` and `aes-256-gcm`.
    Aes256Gcm,
    /// AES-128-GCM. Selected by `aes128` and `aes-128-gcm`.
    Aes128Gcm,
}

impl Cipher {
    fn key_len(self) -> usize {
        match self {
            Self::Aes256Gcm => 32,
            Self::Aes128Gcm => 16,
        }
    }

    fn kdf_info(self) -> &'static [u8] {
        match self {
            Self::Aes256Gcm => b"orecast-vault-aes-256-gcm",
            Self::Aes128Gcm => b"orecast-vault-aes-128-gcm",
        }
    }

    /// Canonical name, as shown in logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::Aes128Gcm => "aes-128-gcm",
        }
    }
}

impl FromStr for Cipher {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes" | "aes-gcm" | "aes256" | "aes-256-gcm" => Ok(Self::Aes256Gcm),
            "aes128" | "aes-128-gcm" => Ok(Self::Aes128Gcm),
            _ => Err(CryptoError::UnsupportedCipher {
                cipher: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Passphrase plus cipher, validated once at startup.
///
/// The passphrase is zeroized on drop and never appears in `Debug` output.
pub struct CredentialVault {
    passphrase: Zeroizing<Vec<u8>>,
    cipher: Cipher,
}

impl CredentialVault {
    /// Build a vault, rejecting unknown cipher names up front.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedCipher`] if `cipher` is not known.
    pub fn new(passphrase: &str, cipher: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            passphrase: Zeroizing::new(passphrase.as_bytes().to_vec()),
            cipher: cipher.parse()?,
        })
    }

    /// The cipher this vault encrypts with.
    #[must_use]
    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    /// Encrypt `plaintext` and return the hex encoding of the sealed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let key = derive_key(&self.passphrase, self.cipher)?;
        let sealed = match self.cipher {
            Cipher::Aes256Gcm => seal::<Aes256Gcm>(&key, plaintext.as_bytes())?,
            Cipher::Aes128Gcm => seal::<Aes128Gcm>(&key, plaintext.as_bytes())?,
        };
        Ok(hex::encode(sealed))
    }

    /// Decrypt the hex produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] if the input is not hex, is too
    /// short, has been tampered with, was sealed under another passphrase or
    /// cipher, or does not decrypt to UTF-8.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let sealed = hex::decode(ciphertext.trim()).map_err(|e| CryptoError::Decryption {
            reason: format!("ciphertext is not valid hex: {e}"),
        })?;
        let key = derive_key(&self.passphrase, self.cipher)?;
        let plaintext = match self.cipher {
            Cipher::Aes256Gcm => open::<Aes256Gcm>(&key, &sealed)?,
            Cipher::Aes128Gcm => open::<Aes128Gcm>(&key, &sealed)?,
        };
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption {
            reason: "plaintext is not valid UTF-8".to_owned(),
        })
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("passphrase", &"[REDACTED]")
            .field("cipher", &self.cipher)
            .finish()
    }
}

/// Encrypt with a one-off vault.
///
/// # Errors
///
/// Returns [`CryptoError::UnsupportedCipher`] or [`CryptoError::Encryption`].
pub fn encrypt(plaintext: &str, passphrase: &str, cipher: &str) -> Result<String, CryptoError> {
    CredentialVault::new(passphrase, cipher)?.encrypt(plaintext)
}

/// Decrypt with a one-off vault.
///
/// # Errors
///
/// Every failure, including an unknown cipher name, is reported as
/// [`CryptoError::Decryption`].
pub fn decrypt(ciphertext: &str, passphrase: &str, cipher: &str) -> Result<String, CryptoError> {
    let vault = CredentialVault::new(passphrase, cipher).map_err(|e| CryptoError::Decryption {
        reason: e.to_string(),
    })?;
    vault.decrypt(ciphertext)
}

fn derive_key(passphrase: &[u8], cipher: Cipher) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), passphrase);
    let mut key = Zeroizing::new(vec![0u8; cipher.key_len()]);
    hk.expand(cipher.kdf_info(), &mut key)
        .map_err(|e| CryptoError::Encryption {
            reason: format!("key derivation failed: {e}"),
        })?;
    Ok(key)
}

fn seal<C>(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|e| CryptoError::Encryption {
        reason: e.to_string(),
    })?;
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut sealed = Vec::with_capacity(nonce.len() + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open<C>(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: Aead + AeadCore + KeyInit,
{
    let nonce_len = C::NonceSize::USIZE;
    if sealed.len() < nonce_len + TAG_LEN {
        return Err(CryptoError::Decryption {
            reason: format!(
                "ciphertext too short: {} bytes, need at least {}",
                sealed.len(),
                nonce_len + TAG_LEN
            ),
        });
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(nonce_len);
    let cipher = C::new_from_slice(key).map_err(|e| CryptoError::Decryption {
        reason: e.to_string(),
    })?;
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Decryption {
            reason: "authentication failed".to_owned(),
        })
}
