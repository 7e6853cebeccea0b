// An in-process AES-128-CBC padding oracle with a fixed key.
use crate::{
    block::{pad, unpad},
    oracle::Decision,
    Error, Oracle, Result,
};

use aes::{
    cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit},
    Aes128, Block,
};
use rand::{rngs::OsRng, RngCore};

pub const AES_BLOCK_SIZE: usize = 16;

#[derive(Clone)]
pub struct LocalOracle {
    cipher: Aes128,
}

impl LocalOracle {
    pub fn new(key: [u8; 16]) -> Self {
        Self {
            cipher: Aes128::new(&key.into()),
        }
    }

    pub fn with_random_key() -> Self {
        let mut key = [0u8; 16];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Pads and encrypts `plaintext`, returning `iv || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8], iv: &[u8; AES_BLOCK_SIZE]) -> Vec<u8> {
        let padded = pad(plaintext, AES_BLOCK_SIZE);
        let mut out = Vec::with_capacity(padded.len() + AES_BLOCK_SIZE);
        out.extend_from_slice(iv);

        let mut last_block = *iv;
        for plaintext_block in padded.chunks(AES_BLOCK_SIZE) {
            let mut buf: Block = GenericArray::clone_from_slice(plaintext_block);
            buf.iter_mut().zip(last_block).for_each(|(b, c)| *b ^= c);
            self.cipher.encrypt_block(&mut buf);
            last_block.copy_from_slice(&buf);
            out.extend_from_slice(&buf);
        }
        out
    }

    /// Decrypts `iv || ciphertext` and strips the padding.
    pub fn decrypt(&self, sample: &[u8]) -> Result<Vec<u8>> {
        if sample.len() % AES_BLOCK_SIZE != 0 || sample.len() < 2 * AES_BLOCK_SIZE {
            return Err(Error::config(format!(
                "Sample of {} bytes is not IV plus whole AES blocks",
                sample.len()
            )));
        }

        let mut message = Vec::with_capacity(sample.len() - AES_BLOCK_SIZE);
        for pair in sample.windows(2 * AES_BLOCK_SIZE).step_by(AES_BLOCK_SIZE) {
            let (iv, block) = pair.split_at(AES_BLOCK_SIZE);
            let mut buf: Block = GenericArray::clone_from_slice(block);
            self.cipher.decrypt_block(&mut buf);
            message.extend(buf.iter().zip(iv).map(|(b, v)| b ^ v));
        }
        Ok(unpad(&message, AES_BLOCK_SIZE)?.to_vec())
    }

    pub fn padding_valid(&self, iv: &[u8], ciphertext: &[u8]) -> bool {
        if iv.len() != AES_BLOCK_SIZE {
            return false;
        }
        self.decrypt(&[iv, ciphertext].concat()).is_ok()
    }
}

impl Oracle for LocalOracle {
    async fn test(&self, iv: &[u8], block: &[u8]) -> Result<Decision> {
        Ok(Decision::new(self.padding_valid(iv, block)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_reverses_encrypt() {
        let oracle = LocalOracle::with_random_key();
        let iv = [3u8; 16];

        let sample = oracle.encrypt(b"I'm back and I'm ringin' the bell", &iv);

        assert_eq!(sample.len(), 16 * 4);
        assert_eq!(&sample[..16], &iv);
        assert_eq!(
            oracle.decrypt(&sample).unwrap(),
            b"I'm back and I'm ringin' the bell"
        );
    }

    #[test]
    fn encrypt_matches_known_aes_128_cbc_vector() {
        // NIST SP 800-38A, F.2.1 CBC-AES128.Encrypt, first block. Only the
        // first block is compared since our encrypt appends padding.
        let key: [u8; 16] = hex::decode("2b7e151628aed2a6abf7158809cf4f3c")
            .unwrap()
            .try_into()
            .unwrap();
        let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f")
            .unwrap()
            .try_into()
            .unwrap();
        let plaintext = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let oracle = LocalOracle::new(key);

        let sample = oracle.encrypt(&plaintext, &iv);

        assert_eq!(
            hex::encode(&sample[16..32]),
            "7649abac8119b246cee98e9b12e9197d"
        );
    }

    #[tokio::test]
    async fn oracle_reports_padding_validity() {
        let oracle = LocalOracle::new(*b"YELLOW SUBMARINE");
        let sample = oracle.encrypt(b"hello", &[0u8; 16]);
        let (iv, block) = sample.split_at(16);
        let mut tampered = iv.to_vec();
        tampered[15] ^= 0x01;

        assert!(oracle.test(iv, block).await.unwrap().valid);
        assert!(!oracle.test(&tampered, block).await.unwrap().valid);
        assert!(!oracle.test(&iv[..8], block).await.unwrap().valid);
    }
}
