mod block;
mod crack;
mod decrypt;
mod encoding;
mod encrypt;
mod error;
mod http;
mod local;
mod logger;
mod oracle;
mod server;

pub use block::{detect_block_size, make_blocks, pad, random_block, unpad, xor_bytes};
pub use crack::{Cracker, DEFAULT_CONCURRENCY};
pub use decrypt::Decrypter;
pub use encoding::{url_decode, url_encode, Encoding};
pub use encrypt::{Encrypter, Resume};
pub use error::{Error, Result};
pub use http::{HttpOracle, HttpOracleConfig, DEFAULT_RETRY_COUNT};
pub use local::{LocalOracle, AES_BLOCK_SIZE};
pub use logger::{ConsoleLog, Logger};
pub use oracle::{Decision, Oracle};
pub use server::{spawn_server, TargetServer};
