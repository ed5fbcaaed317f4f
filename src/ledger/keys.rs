//! Tron key and address handling
//!
//! An address is base58check over `0x41 || keccak256(pubkey)[12..]`, where
//! `pubkey` is the 64-byte uncompressed point without its `0x04` prefix.
//! Transactions are signed by producing a recoverable ECDSA signature over
//! the 32-byte txID, serialized as `r || s || v` with `v = 27 + recid`.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use super::{Keypair, LedgerError, LedgerResult};

/// Mainnet address prefix byte
pub const ADDRESS_PREFIX: u8 = 0x41;

/// Raw address length including the prefix
pub const ADDRESS_LEN: usize = 21;

/// Generate a random keypair
pub fn generate_keypair() -> Keypair {
    let secret = SecretKey::new(&mut rand::thread_rng());
    let public = PublicKey::from_secret_key_global(&secret);

    Keypair {
        address: address_from_public_key(&public),
        private_key: hex::encode(secret.secret_bytes()),
    }
}

/// Derive the base58 address for a public key
pub fn address_from_public_key(public: &PublicKey) -> String {
    let uncompressed = public.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);

    let mut raw = Vec::with_capacity(ADDRESS_LEN);
    raw.push(ADDRESS_PREFIX);
    raw.extend_from_slice(&hash[12..]);

    bs58::encode(raw).with_check().into_string()
}

/// Derive the base58 address for a hex secret key
pub fn address_from_private_key(private_key: &str) -> LedgerResult<String> {
    let secret = parse_secret_key(private_key)?;
    Ok(address_from_public_key(&PublicKey::from_secret_key_global(
        &secret,
    )))
}

fn parse_secret_key(private_key: &str) -> LedgerResult<SecretKey> {
    let bytes = hex::decode(private_key.trim_start_matches("0x"))
        .map_err(|e| LedgerError::InvalidKey(e.to_string()))?;
    SecretKey::from_slice(&bytes).map_err(|e| LedgerError::InvalidKey(e.to_string()))
}

/// `41...` hex to base58
pub fn hex_to_base58(hex_address: &str) -> LedgerResult<String> {
    let raw = hex::decode(hex_address)
        .map_err(|e| LedgerError::InvalidAddress(format!("{}: {}", hex_address, e)))?;

    if raw.len() != ADDRESS_LEN || raw[0] != ADDRESS_PREFIX {
        return Err(LedgerError::InvalidAddress(hex_address.to_string()));
    }

    Ok(bs58::encode(raw).with_check().into_string())
}

/// base58 to `41...` hex
pub fn base58_to_hex(address: &str) -> LedgerResult<String> {
    let raw = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| LedgerError::InvalidAddress(format!("{}: {}", address, e)))?;

    if raw.len() != ADDRESS_LEN || raw[0] != ADDRESS_PREFIX {
        return Err(LedgerError::InvalidAddress(address.to_string()));
    }

    Ok(hex::encode(raw))
}

/// Whether `address` is a well-formed base58 Tron address
pub fn is_valid_address(address: &str) -> bool {
    base58_to_hex(address).is_ok()
}

/// The txID of a transaction is sha256 of its serialized raw data
pub fn txid_matches(raw_data_hex: &str, txid: &str) -> bool {
    match hex::decode(raw_data_hex) {
        Ok(raw) => hex::encode(Sha256::digest(raw)).eq_ignore_ascii_case(txid),
        Err(_) => false,
    }
}

/// Sign a txID, returning the 65-byte signature as hex
pub fn sign_txid(txid: &str, private_key: &str) -> LedgerResult<String> {
    let secret = parse_secret_key(private_key)?;
    let digest = hex::decode(txid).map_err(|e| LedgerError::Parse(format!("txID: {}", e)))?;
    let message =
        Message::from_digest_slice(&digest).map_err(|e| LedgerError::Parse(format!("txID: {}", e)))?;

    let signature = SECP256K1.sign_ecdsa_recoverable(&message, &secret);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut bytes = Vec::with_capacity(65);
    bytes.extend_from_slice(&compact);
    bytes.push(27 + recovery_id.to_i32() as u8);

    Ok(hex::encode(bytes))
}

/// Recover the signer's address from a signature produced by [`sign_txid`]
pub fn recover_signer(txid: &str, signature: &str) -> LedgerResult<String> {
    let digest = hex::decode(txid).map_err(|e| LedgerError::Parse(format!("txID: {}", e)))?;
    let message =
        Message::from_digest_slice(&digest).map_err(|e| LedgerError::Parse(format!("txID: {}", e)))?;

    let bytes =
        hex::decode(signature).map_err(|e| LedgerError::Parse(format!("signature: {}", e)))?;
    if bytes.len() != 65 || bytes[64] < 27 {
        return Err(LedgerError::Parse("signature must be 65 bytes".to_string()));
    }

    let recovery_id = RecoveryId::from_i32(i32::from(bytes[64] - 27))
        .map_err(|e| LedgerError::Parse(e.to_string()))?;
    let recoverable = RecoverableSignature::from_compact(&bytes[..64], recovery_id)
        .map_err(|e| LedgerError::Parse(e.to_string()))?;
    let public = SECP256K1
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| LedgerError::Parse(e.to_string()))?;

    Ok(address_from_public_key(&public))
}
