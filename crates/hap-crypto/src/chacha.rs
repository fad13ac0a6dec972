//! ChaCha20-Poly1305 AEAD for pairing sub-TLVs and the session channel.

use hap_core::error::CryptoError;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use zeroize::ZeroizeOnDrop;

/// Largest plaintext carried by one session frame.
pub const MAX_FRAME_LEN: usize = 0x400;

/// Authentication tag length.
pub const TAG_LEN: usize = 16;

/// Session channel cipher with auto-incrementing nonces.
///
/// Each frame is `[u16_le len][ciphertext][16-byte tag]`; the two length
/// bytes are the AAD and the nonce is a 64-bit little-endian counter,
/// independent per direction.
#[derive(ZeroizeOnDrop)]
pub struct ControlCipher {
    write_key: [u8; 32],
    read_key: [u8; 32],
    #[zeroize(skip)]
    write_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    read_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    encrypt_counter: u64,
    #[zeroize(skip)]
    decrypt_counter: u64,
}

impl ControlCipher {
    /// Create cipher with separate write/read keys.
    pub fn new(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        let write_cipher = ChaCha20Poly1305::new(&write_key.into());
        let read_cipher = ChaCha20Poly1305::new(&read_key.into());
        Self {
            write_key,
            read_key,
            write_cipher,
            read_cipher,
            encrypt_counter: 0,
            decrypt_counter: 0,
        }
    }

    /// Encrypt plaintext into one or more frames.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.is_empty() {
            return Err(CryptoError::Encryption("Empty plaintext".to_string()));
        }

        let mut out = Vec::with_capacity(
            plaintext.len() + (plaintext.len() / MAX_FRAME_LEN + 1) * (2 + TAG_LEN),
        );
        for block in plaintext.chunks(MAX_FRAME_LEN) {
            let aad = (block.len() as u16).to_le_bytes();
            let nonce = build_nonce_from_counter(self.encrypt_counter);
            let payload = Payload { msg: block, aad: &aad };

            let ciphertext_with_tag = self
                .write_cipher
                .encrypt(Nonce::from_slice(&nonce), payload)
                .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))?;

            out.extend_from_slice(&aad);
            out.extend_from_slice(&ciphertext_with_tag);
            self.encrypt_counter += 1;
        }

        Ok(out)
    }

    /// Decrypt a single frame body (ciphertext + tag).
    pub fn decrypt_block(
        &mut self,
        ciphertext_with_tag: &[u8],
        block_len: u16,
    ) -> Result<Vec<u8>, CryptoError> {
        if block_len as usize > MAX_FRAME_LEN {
            return Err(CryptoError::Decryption(format!(
                "Frame length {} exceeds {}",
                block_len, MAX_FRAME_LEN
            )));
        }
        if ciphertext_with_tag.len() != block_len as usize + TAG_LEN {
            return Err(CryptoError::Decryption(
                "Ciphertext block length mismatch".to_string(),
            ));
        }

        let aad = block_len.to_le_bytes();
        let nonce = build_nonce_from_counter(self.decrypt_counter);
        let payload = Payload {
            msg: ciphertext_with_tag,
            aad: &aad,
        };

        let plaintext = self
            .read_cipher
            .decrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|_| CryptoError::Decryption("Decryption/authentication failed".to_string()))?;

        self.decrypt_counter += 1;
        Ok(plaintext)
    }

    /// Decrypt a buffer made entirely of complete frames.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buf = data.to_vec();
        let plaintext = self.decrypt_available(&mut buf)?;
        if !buf.is_empty() {
            return Err(CryptoError::Decryption(
                "Incomplete ciphertext block".to_string(),
            ));
        }
        Ok(plaintext)
    }

    /// Decrypt every complete frame at the front of `buf`.
    ///
    /// Consumed bytes are drained; a trailing partial frame stays in the
    /// buffer for the next read. Returns an empty vector when no complete
    /// frame is available yet.
    pub fn decrypt_available(&mut self, buf: &mut Vec<u8>) -> Result<Vec<u8>, CryptoError> {
        let mut out = Vec::new();
        let mut offset = 0;

        while buf.len() - offset >= 2 {
            let block_len = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            if block_len as usize > MAX_FRAME_LEN {
                return Err(CryptoError::Decryption(format!(
                    "Frame length {} exceeds {}",
                    block_len, MAX_FRAME_LEN
                )));
            }
            let block_end = offset + 2 + block_len as usize + TAG_LEN;
            if block_end > buf.len() {
                break;
            }
            let plaintext = self.decrypt_block(&buf[offset + 2..block_end], block_len)?;
            out.extend_from_slice(&plaintext);
            offset = block_end;
        }

        buf.drain(..offset);
        Ok(out)
    }

    /// Get current encryption nonce counter.
    pub fn encrypt_counter(&self) -> u64 {
        self.encrypt_counter
    }

    /// Get current decryption nonce counter.
    pub fn decrypt_counter(&self) -> u64 {
        self.decrypt_counter
    }
}

/// Build 12-byte nonce from counter.
fn build_nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Encrypt with explicit 12-byte nonce (for pairing protocols).
///
/// Returns ciphertext with 16-byte auth tag appended.
pub fn encrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))
}

/// Decrypt with explicit 12-byte nonce (for pairing protocols).
///
/// Expects ciphertext with 16-byte auth tag appended.
pub fn decrypt_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::Decryption(
            "Ciphertext too short (missing tag)".to_string(),
        ));
    }

    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption("Decryption/authentication failed".to_string()))
}

/// Create a 12-byte nonce from a label, right-aligned and zero-padded.
///
/// "PV-Msg02" becomes `\x00\x00\x00\x00PV-Msg02`.
pub fn nonce_from_string(s: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let len = s.len().min(12);
    nonce[12 - len..].copy_from_slice(&s[..len]);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (ControlCipher, ControlCipher) {
        let a = [0x11u8; 32];
        let b = [0x22u8; 32];
        (ControlCipher::new(a, b), ControlCipher::new(b, a))
    }

    mod control_cipher {
        use super::*;

        #[test]
        fn new_starts_counters_at_zero() {
            let (c, _) = pair();
            assert_eq!(c.encrypt_counter(), 0);
            assert_eq!(c.decrypt_counter(), 0);
        }

        #[test]
        fn encrypt_produces_framed_output() {
            let (mut tx, _) = pair();
            let out = tx.encrypt(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
            assert_eq!(&out[..2], &19u16.to_le_bytes());
            assert_eq!(out.len(), 2 + 19 + TAG_LEN);
            assert_eq!(tx.encrypt_counter(), 1);
        }

        #[test]
        fn empty_plaintext_is_rejected() {
            let (mut tx, _) = pair();
            assert!(tx.encrypt(&[]).is_err());
        }

        #[test]
        fn long_plaintext_splits_at_1024() {
            let (mut tx, mut rx) = pair();
            let data = vec![0x5Au8; 2500];
            let out = tx.encrypt(&data).unwrap();
            assert_eq!(tx.encrypt_counter(), 3);
            assert_eq!(out.len(), 2500 + 3 * (2 + TAG_LEN));
            assert_eq!(&out[..2], &0x0400u16.to_le_bytes());
            assert_eq!(rx.decrypt(&out).unwrap(), data);
            assert_eq!(rx.decrypt_counter(), 3);
        }

        #[test]
        fn counters_advance_per_frame() {
            let (mut tx, mut rx) = pair();
            let first = tx.encrypt(b"same").unwrap();
            let second = tx.encrypt(b"same").unwrap();
            assert_ne!(first, second);
            assert_eq!(rx.decrypt(&first).unwrap(), b"same");
            assert_eq!(rx.decrypt(&second).unwrap(), b"same");
        }

        #[test]
        fn out_of_order_frames_fail() {
            let (mut tx, mut rx) = pair();
            let _first = tx.encrypt(b"one").unwrap();
            let second = tx.encrypt(b"two").unwrap();
            assert!(rx.decrypt(&second).is_err());
        }

        #[test]
        fn tampered_tag_fails() {
            let (mut tx, mut rx) = pair();
            let mut out = tx.encrypt(b"payload").unwrap();
            let last = out.len() - 1;
            out[last] ^= 0xFF;
            assert!(rx.decrypt(&out).is_err());
        }

        #[test]
        fn tampered_length_fails() {
            let (mut tx, mut rx) = pair();
            let mut out = tx.encrypt(b"payload!").unwrap();
            out[0] = 7;
            out.remove(2);
            assert!(rx.decrypt(&out).is_err());
        }

        #[test]
        fn oversized_length_prefix_is_rejected() {
            let (_, mut rx) = pair();
            let mut buf = 0x0401u16.to_le_bytes().to_vec();
            buf.extend(vec![0u8; 0x0401 + TAG_LEN]);
            assert!(rx.decrypt_available(&mut buf).is_err());
        }
    }

    mod incremental {
        use super::*;

        #[test]
        fn partial_frame_is_kept_for_later() {
            let (mut tx, mut rx) = pair();
            let out = tx.encrypt(b"GET /accessories HTTP/1.1\r\n\r\n").unwrap();

            let mut buf = out[..10].to_vec();
            assert!(rx.decrypt_available(&mut buf).unwrap().is_empty());
            assert_eq!(buf.len(), 10);
            assert_eq!(rx.decrypt_counter(), 0);

            buf.extend_from_slice(&out[10..]);
            let plain = rx.decrypt_available(&mut buf).unwrap();
            assert_eq!(plain, b"GET /accessories HTTP/1.1\r\n\r\n");
            assert!(buf.is_empty());
        }

        #[test]
        fn complete_frames_are_drained_and_tail_remains() {
            let (mut tx, mut rx) = pair();
            let mut buf = tx.encrypt(b"first").unwrap();
            let second = tx.encrypt(b"second").unwrap();
            buf.extend_from_slice(&second[..5]);

            assert_eq!(rx.decrypt_available(&mut buf).unwrap(), b"first");
            assert_eq!(buf, &second[..5]);
        }

        #[test]
        fn single_byte_buffer_waits() {
            let (_, mut rx) = pair();
            let mut buf = vec![0x05];
            assert!(rx.decrypt_available(&mut buf).unwrap().is_empty());
            assert_eq!(buf, vec![0x05]);
        }
    }

    mod nonce_construction {
        use super::*;

        #[test]
        fn counter_is_little_endian_in_bytes_4_to_11() {
            let nonce = build_nonce_from_counter(0x0102030405060708);
            assert_eq!(nonce[..4], [0, 0, 0, 0]);
            assert_eq!(nonce[4..], [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        }

        #[test]
        fn nonce_from_string_right_aligned() {
            let nonce = nonce_from_string(b"PV-Msg02");
            assert_eq!(&nonce[..4], &[0, 0, 0, 0]);
            assert_eq!(&nonce[4..], b"PV-Msg02");
            assert_eq!(&nonce_from_string(b"PS-Msg05")[4..], b"PS-Msg05");
        }
    }

    mod pairing_aead {
        use super::*;

        #[test]
        fn explicit_nonce_roundtrip() {
            let key = [0x33u8; 32];
            let nonce = nonce_from_string(b"PS-Msg06");
            let ct = encrypt_with_nonce(&key, &nonce, b"sub-tlv").unwrap();
            assert_eq!(ct.len(), 7 + TAG_LEN);
            assert_eq!(decrypt_with_nonce(&key, &nonce, &ct).unwrap(), b"sub-tlv");
        }

        #[test]
        fn wrong_nonce_fails() {
            let key = [0x33u8; 32];
            let ct = encrypt_with_nonce(&key, &nonce_from_string(b"PS-Msg05"), b"x").unwrap();
            assert!(decrypt_with_nonce(&key, &nonce_from_string(b"PS-Msg06"), &ct).is_err());
        }

        #[test]
        fn short_ciphertext_fails() {
            assert!(decrypt_with_nonce(&[0u8; 32], &[0u8; 12], &[0u8; 15]).is_err());
        }
    }

    mod known_vectors {
        use super::*;

        #[test]
        fn rfc8439_aead_test_vector() {
            // RFC 8439 Section 2.8.2
            let key =
                hex::decode("808182838485868788898a8b8c8d8e8f909192939495969798999a9b9c9d9e9f")
                    .unwrap();
            let nonce = hex::decode("070000004041424344454647").unwrap();
            let aad = hex::decode("50515253c0c1c2c3c4c5c6c7").unwrap();
            let plaintext = b"Ladies and Gentlemen of the class of '99: If I could offer you only one tip for the future, sunscreen would be it.";

            let expected_ciphertext = hex::decode(
                "d31a8d34648e60db7b86afbc53ef7ec2a4aded51296e08fea9e2b5a736ee62d63dbea45e8ca9671282fafb69da92728b1a71de0a9e060b2905d6a5b67ecd3b3692ddbd7f2d778b8c9803aee328091b58fab324e4fad675945585808b4831d7bc3ff4def08e4b7a9de576d26586cec64b6116",
            ).unwrap();
            let expected_tag = hex::decode("1ae10b594f09e26a7e902ecbd0600691").unwrap();

            let cipher = ChaCha20Poly1305::new_from_slice(&key).unwrap();
            let payload = Payload {
                msg: plaintext.as_slice(),
                aad: &aad,
            };
            let result = cipher.encrypt(Nonce::from_slice(&nonce), payload).unwrap();

            assert_eq!(&result[..result.len() - 16], expected_ciphertext.as_slice());
            assert_eq!(&result[result.len() - 16..], expected_tag.as_slice());
        }
    }
}
