use crate::Result;

use std::future::Future;

/// The answer to one padding query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub valid: bool,
    pub debug_info: Option<String>,
}

impl Decision {
    pub fn new(valid: bool) -> Self {
        Self {
            valid,
            debug_info: None,
        }
    }

    pub fn with_debug_info(mut self, info: impl Into<String>) -> Self {
        self.debug_info = Some(info.into());
        self
    }
}

/// Something that reveals whether `iv || block` decrypts to validly padded
/// plaintext.
///
/// Implementations own their retry policy. An `Err` means the query could not
/// be answered after retrying; the cracker counts it as an invalid decision.
/// Queries are issued concurrently from spawned tasks.
pub trait Oracle: Send + Sync + 'static {
    fn test(&self, iv: &[u8], block: &[u8]) -> impl Future<Output = Result<Decision>> + Send;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::{block::unpad, Error};

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    /// A toy "block cipher" whose decryption is a XOR with the key. Works for
    /// any block size, which AES does not.
    pub(crate) struct XorOracle {
        key: Vec<u8>,
    }

    impl XorOracle {
        pub(crate) fn new(key: &[u8]) -> Self {
            Self { key: key.to_vec() }
        }

        pub(crate) fn block_size(&self) -> usize {
            self.key.len()
        }

        /// Raw decryption of `block`, i.e. its intermediate value.
        pub(crate) fn intermediate(&self, block: &[u8]) -> Vec<u8> {
            block.iter().zip(&self.key).map(|(b, k)| b ^ k).collect()
        }

        pub(crate) fn encrypt_cbc(&self, plaintext: &[u8], iv: &[u8]) -> Vec<u8> {
            let padded = crate::block::pad(plaintext, self.block_size());
            let mut out = iv.to_vec();
            let mut previous = iv.to_vec();
            for block in padded.chunks(self.block_size()) {
                let mixed: Vec<u8> = block.iter().zip(&previous).map(|(p, c)| p ^ c).collect();
                previous = self.intermediate(&mixed);
                out.extend_from_slice(&previous);
            }
            out
        }
    }

    impl Oracle for XorOracle {
        async fn test(&self, iv: &[u8], block: &[u8]) -> Result<Decision> {
            let plain: Vec<u8> = self
                .intermediate(block)
                .iter()
                .zip(iv)
                .map(|(i, v)| i ^ v)
                .collect();
            Ok(Decision::new(unpad(&plain, self.block_size()).is_ok()))
        }
    }

    /// Counts queries and remembers every IV in arrival order.
    pub(crate) struct RecordingOracle<O> {
        inner: O,
        pub(crate) requests: AtomicUsize,
        pub(crate) ivs: Mutex<Vec<Vec<u8>>>,
    }

    impl<O> RecordingOracle<O> {
        pub(crate) fn new(inner: O) -> Self {
            Self {
                inner,
                requests: AtomicUsize::new(0),
                ivs: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl<O: Oracle> Oracle for RecordingOracle<O> {
        async fn test(&self, iv: &[u8], block: &[u8]) -> Result<Decision> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.ivs.lock().unwrap().push(iv.to_vec());
            self.inner.test(iv, block).await
        }
    }

    pub(crate) struct NeverValid;

    impl Oracle for NeverValid {
        async fn test(&self, _: &[u8], _: &[u8]) -> Result<Decision> {
            Ok(Decision::new(false).with_debug_info("500 Internal Server Error"))
        }
    }

    /// Fails every query whose guessed byte at `index` is `byte`.
    pub(crate) struct FlakyOracle<O> {
        pub(crate) inner: O,
        pub(crate) index: usize,
        pub(crate) byte: u8,
    }

    impl<O: Oracle> Oracle for FlakyOracle<O> {
        async fn test(&self, iv: &[u8], block: &[u8]) -> Result<Decision> {
            if iv[self.index] == self.byte {
                return Err(Error::OracleTransport("connection reset".to_string()));
            }
            self.inner.test(iv, block).await
        }
    }

    #[tokio::test]
    async fn xor_oracle_accepts_only_valid_padding() {
        let oracle = XorOracle::new(b"YELLOW SUBMARINE");
        let ciphertext = oracle.encrypt_cbc(b"ICE ICE BABY", &[0u8; 16]);
        let (iv, block) = ciphertext.split_at(16);

        let valid = oracle.test(iv, block).await.unwrap();
        let mut bad_iv = iv.to_vec();
        bad_iv[15] ^= 0x07;
        let invalid = oracle.test(&bad_iv, block).await.unwrap();

        assert!(valid.valid);
        assert!(!invalid.valid);
    }
}
