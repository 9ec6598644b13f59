//! Classify and buckets commands.

use tracing::error;

use opcount::config::parse_address;
use opcount_isa::decode::describe;
use opcount_isa::{Bucket, ClassifyPolicy, Probe, classify};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let digits: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Handle the `classify` command.
pub fn cmd_classify(hex: &str, addr: &str, policy: ClassifyPolicy) -> i32 {
    let Some(bytes) = decode_hex(hex) else {
        error!(input = hex, "invalid hex bytes");
        return EXIT_FAILURE;
    };
    let address = match parse_address(addr) {
        Ok(address) => address,
        Err(e) => {
            error!(error = %e, "invalid address");
            return EXIT_FAILURE;
        }
    };
    let desc = match describe(&bytes, address) {
        Ok(desc) => desc,
        Err(e) => {
            error!(error = %e, "decode failed");
            return EXIT_FAILURE;
        }
    };

    match classify(&desc, &policy) {
        Some(Probe::Count(bucket)) => println!("{}: {bucket}", desc.family.mnemonic()),
        Some(Probe::Lanes { bucket, lanes }) => {
            println!("{}: {bucket} ({lanes} lanes)", desc.family.mnemonic());
        }
        None => println!("{}: not counted", desc.family.mnemonic()),
    }
    EXIT_SUCCESS
}

/// Handle the `buckets` command.
pub fn cmd_buckets() -> i32 {
    for bucket in Bucket::all() {
        println!("{:>2}  {bucket}", bucket.index());
    }
    EXIT_SUCCESS
}
