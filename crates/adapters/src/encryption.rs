//! Optional AES-256-CBC pass-through filter for chunk content.

use aes::Aes256;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use codeatlas_shared::{ErrorCode, ErrorEnvelope, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_LEN: usize = 16;

/// Symmetric cipher applied to chunk content before insert and after
/// retrieval. Ciphertext format is `base64(ivHex:cipherHex)`; decrypt is the
/// exact inverse.
#[derive(Clone)]
pub struct ContentCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for ContentCipher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ContentCipher").finish_non_exhaustive()
    }
}

impl ContentCipher {
    /// Build a cipher from arbitrary key material; the key is hashed to the
    /// 32 bytes AES-256 needs.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "encryption key must be non-empty",
            ));
        }
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Ok(Self { key })
    }

    /// Encrypt a UTF-8 string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &iv).map_err(|error| {
            ErrorEnvelope::invariant(
                ErrorCode::new("crypto", "cipher_init_failed"),
                format!("failed to initialize cipher: {error}"),
            )
        })?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let packed = format!("{}:{}", hex_encode(&iv), hex_encode(&ciphertext));
        Ok(BASE64.encode(packed.as_bytes()))
    }

    /// Decrypt a string produced by `encrypt`.
    pub fn decrypt(&self, payload: &str) -> Result<String> {
        let packed = BASE64
            .decode(payload.trim())
            .map_err(|error| decode_error(format!("invalid base64 payload: {error}")))?;
        let packed = String::from_utf8(packed)
            .map_err(|error| decode_error(format!("payload is not UTF-8: {error}")))?;

        let (iv_hex, cipher_hex) = packed
            .split_once(':')
            .ok_or_else(|| decode_error("payload is missing the iv separator"))?;
        let iv = hex_decode(iv_hex)?;
        let ciphertext = hex_decode(cipher_hex)?;
        if iv.len() != IV_LEN {
            return Err(decode_error(format!("iv must be {IV_LEN} bytes")));
        }

        let cipher = Aes256CbcDec::new_from_slices(&self.key, &iv).map_err(|error| {
            ErrorEnvelope::invariant(
                ErrorCode::new("crypto", "cipher_init_failed"),
                format!("failed to initialize cipher: {error}"),
            )
        })?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| decode_error("decryption failed (wrong key or corrupt payload)"))?;

        String::from_utf8(plaintext)
            .map_err(|error| decode_error(format!("decrypted payload is not UTF-8: {error}")))
    }
}

impl codeatlas_ports::ContentCipherPort for ContentCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        Self::encrypt(self, plaintext)
    }

    fn decrypt(&self, payload: &str) -> Result<String> {
        Self::decrypt(self, payload)
    }
}

fn decode_error(message: impl Into<String>) -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::new("crypto", "decrypt_failed"), message)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn hex_decode(input: &str) -> Result<Vec<u8>> {
    if input.len() % 2 != 0 {
        return Err(decode_error("hex payload has odd length"));
    }
    let mut out = Vec::with_capacity(input.len() / 2);
    let bytes = input.as_bytes();
    for pair in bytes.chunks(2) {
        let high = hex_value(pair[0])?;
        let low = hex_value(pair[1])?;
        out.push((high << 4) | low);
    }
    Ok(out)
}

fn hex_value(byte: u8) -> Result<u8> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(decode_error("invalid hex digit")),
    }
}
