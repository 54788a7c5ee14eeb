//! Client-side encryption for stages that require it.
//!
//! Each file gets a fresh random key the size of the stage master key.
//! The content is AES-CBC encrypted with that key, and the key itself is
//! wrapped with AES-ECB under the master key. The wrapped key, the IV and a
//! material description travel as object metadata.
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::errors::{SnowflakeError, SnowflakeResult};
use crate::response::EncryptionMaterial;

const IV_LEN: usize = 16;

/// What a reader needs to decrypt an uploaded file, all base64 or JSON text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionMetadata {
    pub wrapped_key: String,
    pub iv: String,
    pub matdesc: String,
}

impl EncryptionMetadata {
    /// The `encryptiondata` document Azure and GCS stages expect
    pub fn encryption_data(&self) -> String {
        serde_json::json!({
            "EncryptionMode": "FullBlob",
            "WrappedContentKey": {
                "KeyId": "symmKey1",
                "EncryptedKey": self.wrapped_key,
                "Algorithm": "AES_CBC_256",
            },
            "EncryptionAgent": {
                "Protocol": "1.0",
                "EncryptionAlgorithm": "AES_CBC_128",
            },
            "ContentEncryptionIV": self.iv,
            "KeyWrappingMetadata": {
                "EncryptionLibrary": "Java 5.3.0",
            },
        })
        .to_string()
    }
}

/// Encrypt `plain` for the stage described by `material`
pub fn encrypt(
    material: &EncryptionMaterial,
    plain: &[u8],
) -> SnowflakeResult<(Vec<u8>, EncryptionMetadata)> {
    let master_key = BASE64.decode(&material.query_stage_master_key)?;
    let mut file_key = vec![0u8; master_key.len()];
    rand::fill(file_key.as_mut_slice());
    let iv: [u8; IV_LEN] = rand::random();

    let content = cbc_encrypt(&file_key, &iv, plain)?;
    let wrapped_key = ecb_encrypt(&master_key, &file_key)?;
    let matdesc = serde_json::json!({
        "queryId": material.query_id,
        "smkId": material.smk_id.to_string(),
        "keySize": (master_key.len() * 8).to_string(),
    })
    .to_string();

    Ok((
        content,
        EncryptionMetadata {
            wrapped_key: BASE64.encode(wrapped_key),
            iv: BASE64.encode(iv),
            matdesc,
        },
    ))
}

fn cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> SnowflakeResult<Vec<u8>> {
    let invalid = |_| SnowflakeError::EncryptionKey(key.len());
    Ok(match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        other => return Err(SnowflakeError::EncryptionKey(other)),
    })
}

fn ecb_encrypt(key: &[u8], data: &[u8]) -> SnowflakeResult<Vec<u8>> {
    let invalid = |_| SnowflakeError::EncryptionKey(key.len());
    Ok(match key.len() {
        16 => ecb::Encryptor::<Aes128>::new_from_slice(key)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        24 => ecb::Encryptor::<Aes192>::new_from_slice(key)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        32 => ecb::Encryptor::<Aes256>::new_from_slice(key)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        other => return Err(SnowflakeError::EncryptionKey(other)),
    })
}
