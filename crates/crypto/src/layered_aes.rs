//! AES-CBC primitives used by the tunnel layer: per-hop layered
//! re-encryption of tunnel data (with IV mixing) and straight CBC
//! encrypt/decrypt of build records under a hop's reply key.

use crate::error::{CryptoError, Result};
use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

pub const KEY_SIZE: usize = 32;
pub const IV_SIZE: usize = 16;
/// Tunnel data message body size after the 4-byte tunnel ID and 16-byte IV.
pub const BODY_SIZE: usize = 1008;

type CbcEnc = cbc::Encryptor<Aes256>;
type CbcDec = cbc::Decryptor<Aes256>;

/// In-place AES-CBC encrypt of a buffer whose length is an exact multiple
/// of the AES block size (16 bytes) — every buffer this router encrypts
/// under a fixed-size key is pre-sized this way, so no padding is added.
pub fn cbc_encrypt(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], data: &mut [u8]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(CryptoError::AesFailure("buffer not a multiple of the block size".into()));
    }
    let enc = CbcEnc::new(key.into(), iv.into());
    enc.encrypt_padded_mut::<NoPadding>(data, data.len())
        .map_err(|e| CryptoError::AesFailure(e.to_string()))?;
    Ok(())
}

pub fn cbc_decrypt(key: &[u8; KEY_SIZE], iv: &[u8; IV_SIZE], data: &mut [u8]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(CryptoError::AesFailure("buffer not a multiple of the block size".into()));
    }
    let dec = CbcDec::new(key.into(), iv.into());
    dec.decrypt_padded_mut::<NoPadding>(data)
        .map_err(|e| CryptoError::AesFailure(e.to_string()))?;
    Ok(())
}

/// Encrypt a single 16-byte block under `iv_key` with a zero IV — used to
/// mix the tunnel data message's IV before and after the body is
/// re-encrypted, per the layered-encryption scheme.
fn mix_iv(iv_key: &[u8; KEY_SIZE], block: &[u8; IV_SIZE]) -> [u8; IV_SIZE] {
    let mut buf = *block;
    cbc_encrypt(iv_key, &[0u8; IV_SIZE], &mut buf).expect("single block is block-size aligned");
    buf
}

fn unmix_iv(iv_key: &[u8; KEY_SIZE], block: &[u8; IV_SIZE]) -> [u8; IV_SIZE] {
    let mut buf = *block;
    cbc_decrypt(iv_key, &[0u8; IV_SIZE], &mut buf).expect("single block is block-size aligned");
    buf
}

/// Forward (participant/gateway-side) layered encryption: mix the IV,
/// CBC-encrypt the body under the freshly mixed IV, then mix the IV a
/// second time before it goes out on the wire.
pub fn encrypt_layer(
    layer_key: &[u8; KEY_SIZE],
    iv_key: &[u8; KEY_SIZE],
    iv: &mut [u8; IV_SIZE],
    body: &mut [u8; BODY_SIZE],
) -> Result<()> {
    let mixed_once = mix_iv(iv_key, iv);
    cbc_encrypt(layer_key, &mixed_once, body)?;
    *iv = mix_iv(iv_key, &mixed_once);
    Ok(())
}

/// Inverse of [`encrypt_layer`]: un-mix the wire IV, CBC-decrypt the body
/// under the intermediate IV, then un-mix once more to recover the
/// original IV.
pub fn decrypt_layer(
    layer_key: &[u8; KEY_SIZE],
    iv_key: &[u8; KEY_SIZE],
    iv: &mut [u8; IV_SIZE],
    body: &mut [u8; BODY_SIZE],
) -> Result<()> {
    let mixed_once = unmix_iv(iv_key, iv);
    cbc_decrypt(layer_key, &mixed_once, body)?;
    *iv = unmix_iv(iv_key, &mixed_once);
    Ok(())
}
