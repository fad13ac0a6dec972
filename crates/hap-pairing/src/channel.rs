//! Encrypted session framing used after pair-verify.
//!
//! ```text
//! +----------------+------------------+----------+
//! | Length (2 LE)  | Ciphertext (N)   | Tag (16) |
//! +----------------+------------------+----------+
//! ```
//!
//! N is at most 1024; the length bytes are the AAD. Each direction keeps
//! its own nonce counter starting at zero.

use hap_core::error::{Error, Result};
use hap_crypto::chacha::ControlCipher;
use hap_crypto::keys::SessionKeys;

/// Both directions of an encrypted HAP session.
pub struct EncryptedChannel {
    cipher: ControlCipher,
}

impl EncryptedChannel {
    /// Channel for the end that owns `keys`.
    pub fn new(keys: &SessionKeys) -> Self {
        Self::with_keys(*keys.write_key.as_bytes(), *keys.read_key.as_bytes())
    }

    pub fn with_keys(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        Self {
            cipher: ControlCipher::new(write_key, read_key),
        }
    }

    /// Encrypt an outgoing message into one or more frames.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher.encrypt(plaintext).map_err(Error::Crypto)
    }

    /// Decrypt every complete frame at the front of `buf`.
    ///
    /// A trailing partial frame stays in `buf` for the next read. An
    /// authentication failure is fatal for the session.
    pub fn decrypt(&mut self, buf: &mut Vec<u8>) -> Result<Vec<u8>> {
        self.cipher.decrypt_available(buf).map_err(Error::Crypto)
    }

    /// Frames sent so far.
    pub fn write_nonce(&self) -> u64 {
        self.cipher.encrypt_counter()
    }

    /// Frames received so far.
    pub fn read_nonce(&self) -> u64 {
        self.cipher.decrypt_counter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys() -> ([u8; 32], [u8; 32]) {
        let mut write_key = [0u8; 32];
        let mut read_key = [0u8; 32];
        for i in 0..32 {
            write_key[i] = i as u8 + 1;
            read_key[i] = i as u8 + 0x21;
        }
        (write_key, read_key)
    }

    fn pair() -> (EncryptedChannel, EncryptedChannel) {
        let (write_key, read_key) = test_keys();
        (
            EncryptedChannel::with_keys(write_key, read_key),
            EncryptedChannel::with_keys(read_key, write_key),
        )
    }

    #[test]
    fn frames_round_trip_between_peers() {
        let (mut accessory, mut controller) = pair();
        let mut wire = accessory.encrypt(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        assert_eq!(
            controller.decrypt(&mut wire).unwrap(),
            b"HTTP/1.1 204 No Content\r\n\r\n"
        );
        assert!(wire.is_empty());
        assert_eq!(accessory.write_nonce(), 1);
        assert_eq!(controller.read_nonce(), 1);
    }

    #[test]
    fn length_prefix_is_little_endian() {
        let (mut accessory, _) = pair();
        let wire = accessory.encrypt(&[0u8; 300]).unwrap();
        assert_eq!(&wire[..2], &300u16.to_le_bytes());
        assert_eq!(wire.len(), 2 + 300 + 16);
    }

    #[test]
    fn large_messages_split_into_1024_byte_frames() {
        let (mut accessory, mut controller) = pair();
        let body = vec![0x5Au8; 2500];
        let mut wire = accessory.encrypt(&body).unwrap();
        assert_eq!(wire.len(), 3 * (2 + 16) + 2500);
        assert_eq!(accessory.write_nonce(), 3);
        assert_eq!(controller.decrypt(&mut wire).unwrap(), body);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let (mut accessory, mut controller) = pair();
        let wire = accessory.encrypt(b"GET /accessories HTTP/1.1\r\n\r\n").unwrap();

        let mut buf = wire[..10].to_vec();
        assert!(controller.decrypt(&mut buf).unwrap().is_empty());
        assert_eq!(buf.len(), 10);

        buf.extend_from_slice(&wire[10..]);
        assert_eq!(
            controller.decrypt(&mut buf).unwrap(),
            b"GET /accessories HTTP/1.1\r\n\r\n"
        );
    }

    #[test]
    fn tampered_frame_is_rejected() {
        let (mut accessory, mut controller) = pair();
        let mut wire = accessory.encrypt(b"secret").unwrap();
        wire[4] ^= 0x01;
        assert!(controller.decrypt(&mut wire).is_err());
    }

    #[test]
    fn replayed_frame_is_rejected() {
        let (mut accessory, mut controller) = pair();
        let wire = accessory.encrypt(b"once").unwrap();
        let mut first = wire.clone();
        controller.decrypt(&mut first).unwrap();
        let mut replay = wire;
        assert!(controller.decrypt(&mut replay).is_err());
    }
}
