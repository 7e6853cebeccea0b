// Forging a CBC ciphertext for a chosen plaintext.
//
// Decryption gives P_i = D(C_i) ⊕ C_{i-1}. Pick any block for C_n and crack
// D(C_n). Choosing
//
//                      C_{n-1} = D(C_n) ⊕ P_n
//
// makes C_n decrypt to P_n. C_{n-1} is now a block we need to crack in turn,
// so the chain is built backwards from the last plaintext block, and the final
// block we compute serves as the IV.
use crate::{
    block::{check_block_size, make_blocks, pad, random_block, xor_bytes},
    Cracker, Error, Logger, Oracle, Result,
};

/// Where the backwards chain starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Resume {
    /// Start from a random block.
    #[default]
    Random,
    /// Start from this ciphertext block. It still has to be cracked.
    Anchor(Vec<u8>),
    /// A ciphertext block whose intermediate value is already known, e.g. from
    /// an earlier interrupted run. The last plaintext block costs no queries.
    Known {
        ciphertext: Vec<u8>,
        intermediate: Vec<u8>,
    },
}

pub struct Encrypter<O> {
    cracker: Cracker<O>,
    resume: Resume,
    log: Logger,
}

impl<O: Oracle> Encrypter<O> {
    pub fn new(cracker: Cracker<O>) -> Self {
        Self {
            cracker,
            resume: Resume::Random,
            log: Logger::default(),
        }
    }

    pub fn with_resume(mut self, resume: Resume) -> Result<Self> {
        let block_size = self.block_size();
        let check = |name: &str, value: &[u8]| {
            if value.len() == block_size {
                Ok(())
            } else {
                Err(Error::config(format!(
                    "Size of {} parameter must match block size",
                    name
                )))
            }
        };
        match &resume {
            Resume::Random => {}
            Resume::Anchor(ciphertext) => check("ciphertext", ciphertext.as_slice())?,
            Resume::Known {
                ciphertext,
                intermediate,
            } => {
                check("ciphertext", ciphertext.as_slice())?;
                check("intermediate", intermediate.as_slice())?;
            }
        }
        self.resume = resume;
        Ok(self)
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn block_size(&self) -> usize {
        self.cracker.block_size()
    }

    /// Returns `iv || ciphertext` that decrypts to `data` under the target's
    /// key.
    pub async fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let block_size = self.block_size();
        check_block_size(block_size)?;

        let padded = pad(data, block_size);
        let mut blocks = make_blocks(&padded, block_size);
        // Output blocks, last first.
        let mut chain: Vec<Vec<u8>> = Vec::with_capacity(blocks.len() + 1);

        let mut iv = match &self.resume {
            Resume::Known {
                ciphertext,
                intermediate,
            } => match blocks.pop() {
                Some(plain) => {
                    let n = blocks.len() + 1;
                    self.log.info(format_args!("Processing block {}", n));
                    self.log.info(format_args!(
                        "       Note: using pre-computed CipherText and Intermediate values"
                    ));
                    self.log_plaintext(plain);
                    self.log.info(format_args!(" CipherText: {}", hex::encode(ciphertext)));

                    let iv = xor_bytes(plain, intermediate)?;
                    self.log_block_result(n, intermediate, &iv);
                    chain.push(ciphertext.clone());
                    iv
                }
                None => ciphertext.clone(),
            },
            Resume::Anchor(ciphertext) => ciphertext.clone(),
            Resume::Random => random_block(block_size),
        };

        while let Some(plain) = blocks.pop() {
            let n = blocks.len() + 1;
            let ciphertext = iv;

            self.log.info(format_args!("Processing block {}", n));
            self.log_plaintext(plain);
            self.log.info(format_args!(" CipherText: {}", hex::encode(&ciphertext)));

            let (next_iv, intermediate) = self
                .encrypt_block(plain, &ciphertext)
                .await
                .map_err(|e| e.at_block(n))?;
            self.log_block_result(n, &intermediate, &next_iv);

            chain.push(ciphertext);
            iv = next_iv;
        }

        chain.push(iv);
        chain.reverse();
        Ok(chain.concat())
    }

    /// Returns the block that, placed before `ciphertext`, makes it decrypt to
    /// `plain`, along with the intermediate value of `ciphertext`.
    pub async fn encrypt_block(&self, plain: &[u8], ciphertext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let intermediate = self.cracker.crack(ciphertext).await?;
        let iv = xor_bytes(plain, &intermediate)?;
        Ok((iv, intermediate))
    }

    fn log_plaintext(&self, plain: &[u8]) {
        self.log.info(format_args!(
            "  PlainText: {} | {}",
            hex::encode(plain),
            String::from_utf8_lossy(plain)
        ));
    }

    fn log_block_result(&self, n: usize, intermediate: &[u8], iv: &[u8]) {
        self.log.info(format_args!("Block {} results:", n));
        self.log.info(format_args!(" Intermediate: {}", hex::encode(intermediate)));
        self.log.info(format_args!("           IV: {}", hex::encode(iv)));
    }
}
