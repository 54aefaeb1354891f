use std::convert::TryFrom;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use data_encoding::HEXLOWER;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

use otp_engine::otp::{Clock, FixedClock, Ring, SystemClock};
use otp_engine::{is_secret, make_url, parse_url, qrcode, Digits, Otp};

#[derive(Parser, Debug)]
#[command(name = "otp", version, about = "One-time passcodes from otpauth:// urls")]
struct Cli {
    /// Log parsing and computation details
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Compute codes at this unix time in milliseconds instead of now
    #[arg(long, global = true, value_name = "MILLIS")]
    at: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current code for a provisioning url
    Code { url: String },

    /// Read a provisioning url from a QR code image and print its code
    Scan { image: PathBuf },

    /// Show what a provisioning url contains
    Inspect { url: String },

    /// Build a TOTP provisioning url from a bare base32 secret
    Url {
        secret: String,
        #[arg(long)]
        period: Option<u32>,
        #[arg(long)]
        digits: Option<u8>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose)?;

    match cli.command {
        Commands::Code { url } => {
            let otp = parse_url(&url).context("invalid provisioning url")?;
            print_code(&otp, cli.at)?;
        }
        Commands::Scan { image } => {
            let url = qrcode::read_url(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            info!("found url in {}", image.display());
            let otp = parse_url(&url).context("QR code holds an invalid provisioning url")?;
            print_code(&otp, cli.at)?;
        }
        Commands::Inspect { url } => {
            let otp = parse_url(&url).context("invalid provisioning url")?;
            inspect(&otp);
        }
        Commands::Url {
            secret,
            period,
            digits,
        } => {
            if !is_secret(&secret) {
                return Err(anyhow!("not a base32 secret: {}", secret));
            }
            let digits = digits.map(Digits::try_from).transpose()?;
            println!("{}", make_url(&secret, period, digits));
        }
    }

    Ok(())
}

fn init_logger(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .map_err(|e| anyhow!("failed to set up logging: {}", e))
}

fn print_code(otp: &Otp, at: Option<u64>) -> Result<()> {
    let code = match at {
        Some(ms) => compute(otp, &FixedClock(ms))?,
        None => compute(otp, &SystemClock)?,
    };
    match code.time_left {
        Some(ms) => println!("{} ({}s left)", code.passcode, (ms + 999) / 1000),
        None => println!("{}", code.passcode),
    }
    Ok(())
}

fn compute<C: Clock>(otp: &Otp, clock: &C) -> Result<otp_engine::Code> {
    otp.next_with(clock, &Ring)
        .context("failed to compute the code")
}

fn inspect(otp: &Otp) {
    println!("type:      {}", otp.otp_type());
    println!("issuer:    {}", otp.issuer().unwrap_or("-"));
    println!("account:   {}", otp.account().unwrap_or("-"));
    println!("algorithm: {}", otp.algorithm());
    if otp.is_steam() {
        println!("digits:    5 (steam)");
    } else {
        println!("digits:    {}", otp.digits());
    }
    match otp.counter() {
        Some(counter) => println!("counter:   {}", counter),
        None => println!("period:    {}s", otp.period()),
    }
    println!("key:       {}", HEXLOWER.encode(otp.key()));
}
