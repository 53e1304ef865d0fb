use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::AppError;

const NONCE_SIZE: usize = 24;

/// Server-managed symmetric encryption of message bodies at rest.
///
/// Per-group keys are derived from a process-wide master key with
/// HKDF-SHA256. XChaCha20-Poly1305 with a fresh random nonce per call makes
/// encryption non-deterministic, and the authentication tag means tampered
/// or mismatched ciphertext fails loudly instead of decrypting to garbage.
///
/// Ciphertext wire format: base64(nonce || aead_ciphertext).
#[derive(Clone)]
pub struct MessageCipher {
    master_key: [u8; 32],
}

impl MessageCipher {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    fn derive_group_key(&self, group_id: Uuid) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(None, &self.master_key);
        let mut key = [0u8; 32];
        hk.expand(group_id.as_bytes(), &mut key)
            .expect("HKDF expand must succeed for 32 byte output");
        key
    }

    pub fn encrypt(&self, group_id: Uuid, plaintext: &str) -> Result<String, AppError> {
        let key = self.derive_group_key(group_id);
        let cipher = XChaCha20Poly1305::new((&key).into());

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| AppError::Cipher("encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, group_id: Uuid, ciphertext: &str) -> Result<String, AppError> {
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|_| AppError::Cipher("malformed ciphertext".into()))?;
        if raw.len() < NONCE_SIZE {
            return Err(AppError::Cipher("ciphertext too short".into()));
        }
        let (nonce, body) = raw.split_at(NONCE_SIZE);

        let key = self.derive_group_key(group_id);
        let cipher = XChaCha20Poly1305::new((&key).into());

        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), body)
            .map_err(|_| AppError::Cipher("authentication failed".into()))?;
        String::from_utf8(plaintext).map_err(|_| AppError::Cipher("invalid utf8".into()))
    }
}
