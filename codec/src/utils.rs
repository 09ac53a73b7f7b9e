// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use aws_lc_rs::cipher::{
    AES_256, DecryptionContext, EncryptionContext, PaddedBlockDecryptingKey,
    PaddedBlockEncryptingKey, UnboundCipherKey,
};
use aws_lc_rs::error::Unspecified;
use aws_lc_rs::iv::FixedLength;
use data_encoding::{BASE64, HEXLOWER_PERMISSIVE};

use crate::constants::{IV_LEN, KEY_LEN};

#[inline]
pub fn base64_decode(input: &str) -> Option<Vec<u8>> {
    BASE64.decode(input.trim().as_bytes()).ok()
}

#[inline]
pub fn hex_decode(input: &str) -> Option<Vec<u8>> {
    HEXLOWER_PERMISSIVE.decode(input.as_bytes()).ok()
}

/// Fills an array from the system CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], Unspecified> {
    let mut buf = [0u8; N];
    aws_lc_rs::rand::fill(&mut buf)?;
    Ok(buf)
}

/// AES-256-CBC with PKCS7 padding using a caller supplied iv.
pub fn aes_cbc_encrypt(
    key: &[u8; KEY_LEN],
    iv: [u8; IV_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, Unspecified> {
    let key = UnboundCipherKey::new(&AES_256, key)?;
    let encrypting_key = PaddedBlockEncryptingKey::cbc_pkcs7(key)?;

    let mut in_out = plaintext.to_vec();
    encrypting_key.less_safe_encrypt(&mut in_out, EncryptionContext::Iv128(FixedLength::from(iv)))?;

    Ok(in_out)
}

pub fn aes_cbc_decrypt(
    key: &[u8; KEY_LEN],
    iv: [u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Unspecified> {
    let key = UnboundCipherKey::new(&AES_256, key)?;
    let decrypting_key = PaddedBlockDecryptingKey::cbc_pkcs7(key)?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = decrypting_key.decrypt(&mut in_out, DecryptionContext::Iv128(FixedLength::from(iv)))?;

    Ok(plaintext.to_vec())
}
