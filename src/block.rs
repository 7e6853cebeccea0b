// Block helpers shared by the cracker and the CBC drivers.
use crate::{Error, Result};

use rand::{rngs::OsRng, RngCore};

const MIN_BLOCK_SIZE: usize = 4;
const MAX_BLOCK_SIZE: usize = 64;

/// Padding bytes hold the pad length, so a block can be at most 255 bytes.
pub fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size > u8::MAX as usize {
        return Err(Error::config(format!("Unsupported block size {}", block_size)));
    }
    Ok(())
}

pub fn make_blocks(data: &[u8], block_size: usize) -> Vec<&[u8]> {
    data.chunks(block_size).collect()
}

pub fn xor_bytes(buf_a: &[u8], buf_b: &[u8]) -> Result<Vec<u8>> {
    if buf_a.len() != buf_b.len() {
        return Err(Error::config(format!(
            "cannot xor buffers of different lengths ({} and {})",
            buf_a.len(),
            buf_b.len()
        )));
    }
    Ok(buf_a.iter().zip(buf_b.iter()).map(|(a, b)| a ^ b).collect())
}

/// Pad to a multiple of `block_size` by appending N bytes of value N. An
/// aligned input gets a whole extra block.
pub fn pad(bytes: &[u8], block_size: usize) -> Vec<u8> {
    let n_pad = block_size - (bytes.len() % block_size);
    let mut out = Vec::with_capacity(bytes.len() + n_pad);
    out.extend_from_slice(bytes);
    out.resize(bytes.len() + n_pad, n_pad as u8);
    out
}

pub fn unpad(bytes: &[u8], block_size: usize) -> Result<&[u8]> {
    let n_pad = match bytes.last() {
        Some(&n) => n as usize,
        None => return Err(Error::InvalidPadding),
    };
    if n_pad == 0 || n_pad > block_size || n_pad > bytes.len() {
        return Err(Error::InvalidPadding);
    }
    let (data, padding) = bytes.split_at(bytes.len() - n_pad);
    if padding.iter().any(|&b| b as usize != n_pad) {
        return Err(Error::InvalidPadding);
    }
    Ok(data)
}

/// Largest power of two in [4, 64] dividing `sample_len`.
pub fn detect_block_size(sample_len: usize) -> Result<usize> {
    if sample_len == 0 || sample_len % MIN_BLOCK_SIZE != 0 {
        return Err(Error::config(
            "Encrypted sample is not a multiple of the minimum block size",
        ));
    }
    let mut block_size = MIN_BLOCK_SIZE;
    while block_size < MAX_BLOCK_SIZE && sample_len % (block_size * 2) == 0 {
        block_size *= 2;
    }
    Ok(block_size)
}

pub fn random_block(block_size: usize) -> Vec<u8> {
    let mut block = vec![0u8; block_size];
    OsRng.fill_bytes(&mut block);
    block
}
