// Decrypting a CBC ciphertext block by block.
//
//                      P_i = D(C_i) ⊕ C_{i-1}
//
// The cracker gives us D(C_i) for any block, so each plaintext block only
// needs its own ciphertext block and the one before it.
use crate::{
    block::{check_block_size, make_blocks, unpad, xor_bytes},
    Cracker, Error, Logger, Oracle, Result,
};

use futures::future::try_join_all;

pub struct Decrypter<O> {
    cracker: Cracker<O>,
    log: Logger,
}

impl<O: Oracle> Decrypter<O> {
    pub fn new(cracker: Cracker<O>) -> Self {
        Self {
            cracker,
            log: Logger::default(),
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn block_size(&self) -> usize {
        self.cracker.block_size()
    }

    /// Decrypts `iv || ciphertext` one block at a time and strips the padding.
    pub async fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let blocks = self.split(data)?;
        let n_blocks = blocks.len() - 1;

        let mut result = Vec::with_capacity(data.len() - self.block_size());
        for i in 1..blocks.len() {
            let (iv, ciphertext) = (blocks[i - 1], blocks[i]);

            self.log.info(format_args!("Processing block {}/{}", i, n_blocks));
            self.log.info(format_args!(" CipherText: {}", hex::encode(ciphertext)));
            self.log.info(format_args!("         IV: {}", hex::encode(iv)));

            let (plain, intermediate) = self
                .decrypt_block(iv, ciphertext)
                .await
                .map_err(|e| e.at_block(i))?;
            self.log_block_result(i, &plain, &intermediate);
            result.extend_from_slice(&plain);
        }

        Ok(unpad(&result, self.block_size())?.to_vec())
    }

    /// Like `decrypt` but cracks every block at once. Each block only depends
    /// on its predecessor in the ciphertext, which we already have.
    pub async fn decrypt_parallel(&self, data: &[u8]) -> Result<Vec<u8>> {
        let blocks = self.split(data)?;
        self.log.info(format_args!(
            "Processing {} blocks concurrently",
            blocks.len() - 1
        ));

        let tasks = blocks.windows(2).enumerate().map(|(i, pair)| async move {
            self.decrypt_block(pair[0], pair[1])
                .await
                .map_err(|e| e.at_block(i + 1))
        });
        let decrypted = try_join_all(tasks).await?;

        let mut result = Vec::with_capacity(data.len() - self.block_size());
        for (i, (plain, intermediate)) in decrypted.iter().enumerate() {
            self.log_block_result(i + 1, plain, intermediate);
            result.extend_from_slice(plain);
        }

        Ok(unpad(&result, self.block_size())?.to_vec())
    }

    /// Returns the plaintext block and the intermediate value of `ciphertext`.
    pub async fn decrypt_block(&self, iv: &[u8], ciphertext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let intermediate = self.cracker.crack(ciphertext).await?;
        let plain = xor_bytes(iv, &intermediate)?;
        Ok((plain, intermediate))
    }

    fn split<'a>(&self, data: &'a [u8]) -> Result<Vec<&'a [u8]>> {
        let block_size = self.block_size();
        check_block_size(block_size)?;
        if data.len() % block_size != 0 {
            return Err(Error::config(
                "Encrypted sample is not a multiple of the block size",
            ));
        }
        if data.len() < 2 * block_size {
            return Err(Error::config(
                "Encrypted sample must contain an IV and at least one block",
            ));
        }
        Ok(make_blocks(data, block_size))
    }

    fn log_block_result(&self, i: usize, plain: &[u8], intermediate: &[u8]) {
        self.log.info(format_args!("Block {} results:", i));
        self.log.info(format_args!(" Intermediate: {}", hex::encode(intermediate)));
        self.log.info(format_args!("    Decrypted: {}", hex::encode(plain)));
        self.log.info(format_args!("    PlainText: {}", String::from_utf8_lossy(plain)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        oracle::tests::{NeverValid, RecordingOracle, XorOracle},
        LocalOracle,
    };

    use rstest::rstest;

    const KEY: [u8; 16] = *b"YELLOW SUBMARINE";

    #[tokio::test]
    async fn decrypt_recovers_single_block_message() {
        let oracle = LocalOracle::new(KEY);
        let iv = *b"\x00\x01\x02\x03\x04\x05\x06\x07\x08\x09\x0a\x0b\x0c\x0d\x0e\x0f";
        let sample = oracle.encrypt(b"ICE ICE BABY", &iv);
        assert_eq!(sample.len(), 32);
        let decrypter = Decrypter::new(Cracker::new(oracle, 16).verify_last_byte(true));

        let plaintext = decrypter.decrypt(&sample).await.unwrap();

        assert_eq!(plaintext, b"ICE ICE BABY");
    }

    #[tokio::test]
    async fn decrypt_recovers_multi_block_message() {
        let oracle = LocalOracle::new(KEY);
        let message = b"000005I go crazy when I hear a cymbal";
        let sample = oracle.encrypt(message, &[0x42; 16]);
        let decrypter = Decrypter::new(Cracker::new(oracle, 16).verify_last_byte(true));

        let plaintext = decrypter.decrypt(&sample).await.unwrap();

        assert_eq!(plaintext, message);
    }

    #[rstest]
    #[case(8)]
    #[case(16)]
    #[case(32)]
    #[tokio::test]
    async fn decrypt_parallel_matches_sequential(#[case] block_size: usize) {
        let key: Vec<u8> = (0..block_size as u8).map(|b| b.wrapping_mul(37) | 0x40).collect();
        let oracle = XorOracle::new(&key);
        let iv = vec![0x5a; block_size];
        let sample = oracle.encrypt_cbc(b"Play that funky music, white boy", &iv);
        let decrypter = Decrypter::new(Cracker::new(oracle, block_size).verify_last_byte(true));

        let sequential = decrypter.decrypt(&sample).await.unwrap();
        let parallel = decrypter.decrypt_parallel(&sample).await.unwrap();

        assert_eq!(sequential, b"Play that funky music, white boy");
        assert_eq!(parallel, sequential);
    }

    #[rstest]
    #[case(15)]
    #[case(16)]
    #[case(24)]
    #[tokio::test]
    async fn decrypt_rejects_malformed_samples(#[case] len: usize) {
        let decrypter = Decrypter::new(Cracker::new(RecordingOracle::new(NeverValid), 16));

        let result = decrypter.decrypt(&vec![0u8; len]).await;

        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(decrypter.cracker.oracle().requests(), 0);
    }

    #[tokio::test]
    async fn decrypt_reports_block_where_cracking_failed() {
        let decrypter = Decrypter::new(Cracker::new(NeverValid, 16));

        let err = decrypter.decrypt(&[0u8; 48]).await.unwrap_err();

        assert!(matches!(err, Error::Block { block: 1, .. }));
        assert!(matches!(err.root(), Error::OracleExhausted { index: 15 }));
    }

    #[tokio::test]
    async fn decrypt_rejects_invalid_final_padding() {
        // Decrypting with the wrong IV block leaves garbage where the padding
        // should be. Here the final plaintext byte becomes 0x00.
        let oracle = XorOracle::new(&KEY);
        let sample = oracle.encrypt_cbc(b"YELLOW SUBMARINE", &[0u8; 16]);
        let mut tampered = sample.clone();
        tampered[31] ^= 0x10;
        let decrypter = Decrypter::new(Cracker::new(oracle, 16).verify_last_byte(true));

        let result = decrypter.decrypt(&tampered).await;

        assert!(matches!(result, Err(Error::InvalidPadding)));
    }
}
