//! ERC-20 call encoding and token unit conversion.
//!
//! The call layout is fixed by the Solidity ABI: a 4-byte selector followed
//! by 32-byte words. Only the two calls the extension needs are encoded here.

use ethereum_types::{Address, U256};
use sha3::{Digest, Keccak256};

use crate::error::{Error, Result};

/// `transfer(address,uint256)`
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
/// `balanceOf(address)`
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

pub const WORD: usize = 32;
pub const TRANSFER_CALL_LEN: usize = 4 + WORD + WORD;

/// First four bytes of keccak256 over a canonical function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Parse a `0x`-prefixed (or bare) 20-byte hex address
pub fn parse_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != 40 {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    let bytes = hex::decode(digits).map_err(|_| Error::InvalidAddress(input.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

/// Lowercase `0x` + 40 hex digits (`Display` on `H160` abbreviates)
pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 20..].copy_from_slice(address.as_bytes());
    word
}

fn uint_word(value: U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    value.to_big_endian(&mut word);
    word
}

/// selector ++ pad32(recipient) ++ pad32(amount)
pub fn encode_transfer(recipient: &Address, amount: U256) -> Vec<u8> {
    let mut data = Vec::with_capacity(TRANSFER_CALL_LEN);
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&address_word(recipient));
    data.extend_from_slice(&uint_word(amount));
    data
}

pub fn encode_balance_of(owner: &Address) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + WORD);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&address_word(owner));
    data
}

pub fn to_hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

pub fn to_hex_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

/// Decode a hex quantity or a single ABI word returned by `eth_call`
pub fn decode_uint256(input: &str) -> Result<U256> {
    let digits = input.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16).map_err(|_| Error::Malformed(format!("not a uint256: {}", input)))
}

/// Split an unsigned decimal ("12.5", ".5", "+3") into integer and fraction digits
fn split_decimal(amount: &str) -> Option<(&str, &str)> {
    let trimmed = amount.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return None;
    }
    Some((int_part, frac_part))
}

/// Unsigned decimal with at least one non-zero digit
pub fn is_positive_decimal(amount: &str) -> bool {
    split_decimal(amount)
        .map(|(i, f)| i.bytes().chain(f.bytes()).any(|b| b != b'0'))
        .unwrap_or(false)
}

/// Scale a decimal amount into integer base units, truncating extra
/// fractional digits. Zero, negative and non-decimal input is rejected.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256> {
    let invalid = || Error::InvalidAmount(amount.to_string());
    let (int_part, frac_part) = split_decimal(amount).ok_or_else(invalid)?;

    let decimals = decimals as usize;
    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(if int_part.is_empty() { "0" } else { int_part });
    let kept = &frac_part[..frac_part.len().min(decimals)];
    digits.push_str(kept);
    digits.extend(std::iter::repeat('0').take(decimals - kept.len()));

    let units = U256::from_dec_str(&digits).map_err(|_| invalid())?;
    if units.is_zero() {
        return Err(invalid());
    }
    Ok(units)
}

/// Render base units as a human decimal string ("2500000", 6 -> "2.5")
pub fn format_units(value: U256, decimals: u8) -> String {
    let scale = U256::exp10(decimals as usize);
    let whole = value / scale;
    let frac = value % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
