//! Sealed cookie-store file: the serialized jar is encrypted at rest with a
//! key derived from the portal system id, so a copied file alone does not
//! leak the session. Layout: magic | scrypt salt | AEAD nonce | ciphertext.

use std::fs;
use std::path::Path;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use scrypt::Params;

use crate::error::{AppError, Result};

const MAGIC: &[u8; 8] = b"SLRJAR01";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// scrypt cost 2^14: derivation happens once per run, not per request.
const SCRYPT_LOG_N: u8 = 14;

/// A derived key together with the salt it was derived from; kept around so
/// a save after a successful open does not re-run the KDF.
#[derive(Clone)]
pub struct SealedKey {
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

impl SealedKey {
    fn derive(passphrase: &[u8], salt: [u8; SALT_LEN]) -> Result<Self> {
        let params = Params::new(SCRYPT_LOG_N, 8, 1, KEY_LEN)
            .map_err(|e| AppError::CookieStore(format!("scrypt params: {e}")))?;
        let mut key = [0u8; KEY_LEN];
        scrypt::scrypt(passphrase, &salt, &params, &mut key)
            .map_err(|e| AppError::CookieStore(format!("scrypt: {e}")))?;
        Ok(Self { salt, key })
    }

    fn mint(passphrase: &[u8]) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        getrandom::fill(&mut salt)
            .map_err(|e| AppError::CookieStore(format!("random salt: {e}")))?;
        Self::derive(passphrase, salt)
    }
}

/// Read and unseal the store file. Any failure (missing file, bad magic,
/// wrong passphrase) is an error; the session layer treats it as "start
/// with an empty jar".
pub fn open(path: &Path, passphrase: &[u8]) -> Result<(SealedKey, Vec<u8>)> {
    let data = fs::read(path)?;
    if data.len() < MAGIC.len() + SALT_LEN + NONCE_LEN {
        return Err(AppError::CookieStore(format!(
            "{}: too short to be a sealed cookie store",
            path.display()
        )));
    }
    let (magic, rest) = data.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(AppError::CookieStore(format!(
            "{}: not a sealed cookie store",
            path.display()
        )));
    }
    let (salt, rest) = rest.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let mut salt_arr = [0u8; SALT_LEN];
    salt_arr.copy_from_slice(salt);
    let key = SealedKey::derive(passphrase, salt_arr)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            AppError::CookieStore(format!("{}: cannot decrypt cookie store", path.display()))
        })?;
    Ok((key, plaintext))
}

/// Seal and write the store file. Reuses `key` when the caller opened an
/// existing store, otherwise mints a fresh salt/key.
pub fn save(
    path: &Path,
    passphrase: &[u8],
    key: Option<&SealedKey>,
    plaintext: &[u8],
) -> Result<SealedKey> {
    let key = match key {
        Some(k) => k.clone(),
        None => SealedKey::mint(passphrase)?,
    };
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::fill(&mut nonce)
        .map_err(|e| AppError::CookieStore(format!("random nonce: {e}")))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| AppError::CookieStore("cannot encrypt cookie store".into()))?;

    let mut out = Vec::with_capacity(MAGIC.len() + SALT_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&key.salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    fs::write(path, &out)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jar.sealed");
        let key = save(&path, b"SYS-1", None, b"cookie json here").unwrap();

        let (reopened, plaintext) = open(&path, b"SYS-1").unwrap();
        assert_eq!(plaintext, b"cookie json here");
        assert_eq!(reopened.salt, key.salt);

        // a save with the opened key stays readable
        save(&path, b"SYS-1", Some(&reopened), b"updated").unwrap();
        let (_, plaintext) = open(&path, b"SYS-1").unwrap();
        assert_eq!(plaintext, b"updated");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jar.sealed");
        save(&path, b"SYS-1", None, b"secret").unwrap();
        assert!(open(&path, b"SYS-2").is_err());
    }

    #[test]
    fn rejects_garbage_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jar.sealed");
        std::fs::write(&path, b"short").unwrap();
        assert!(open(&path, b"SYS-1").is_err());

        std::fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(open(&path, b"SYS-1").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open(&dir.path().join("absent"), b"SYS-1").is_err());
    }
}
