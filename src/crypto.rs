//! Checksum and key-negotiation primitives.
//!
//! The provisioning dialogue is protected by a classic finite-field
//! Diffie-Hellman exchange over a fixed 1024-bit group, after which inbound
//! payloads marked encrypted are AES-CFB128 under the MD5 digest of the
//! shared secret. MD5 here is the protocol's key-derivation step, not an
//! integrity mechanism, and the exchange itself is unauthenticated; both are
//! kept as-is for interoperability.
//!
//! Frame integrity uses a CCITT CRC16 (polynomial 0x1021, MSB first) with a
//! complement-seeded register and complemented output, so the checksum of an
//! empty input is 0x0000 and the checksum of `b"123456789"` is the
//! complement of the familiar CCITT-false check value 0x29B1.

use aes::Aes128;
use cipher::{AsyncStreamCipher, KeyIvInit};
use crc::{Algorithm, Crc};
use md5::{Digest, Md5};
use num_bigint::BigUint;
use rand_core::RngCore;

type Aes128CfbEncryptor = cfb_mode::Encryptor<Aes128>;
type Aes128CfbDecryptor = cfb_mode::Decryptor<Aes128>;

/// Fixed width of the Diffie-Hellman private, public and secret keys.
pub const DH_KEY_LEN: usize = 128;

/// The 1024-bit group prime, hexadecimal. Peers ship the same value inside
/// their negotiation message; this constant is what the device computes
/// against and must not change.
pub const DH_PRIME_HEX: &str = "cf5cf5c38419a724957ff5dd323b9c45c3cdd261eb740f69aa94b8bb1a5c96409153bd76b24222d03274e4725a5406092e9e82e9135c643cae98132b0d95f7d65347c68afc1e677da90e51bbab5f5cf429c291b4ba39c6b2dc5e8c7231e46aa7728e87664532cdf547be20c9a3fa8342be6e34371a27c06f7dc0edddd2f86373";

/// The group generator.
pub const DH_GENERATOR: u32 = 2;

// The `check` value is the checksum of b"123456789" under this convention:
// the complement of CCITT-false's 0x29B1.
const CRC_16_BLUFI: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0xFFFF,
    refin: false,
    refout: false,
    xorout: 0xFFFF,
    check: 0xD64E,
    residue: 0x0000,
};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_BLUFI);

/// Raw checksum of a byte string.
pub fn checksum(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Checksum of one frame: the digest runs over the sequence number, the
/// payload-region length and the payload-region bytes, in that order.
///
/// `data` excludes the total-content-length prefix; its own length is what
/// enters the digest, which on fragmented frames differs from the header
/// `data_length` field.
pub fn frame_checksum(sequence_number: u8, data: &[u8]) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(&[sequence_number, data.len() as u8]);
    digest.update(data);
    digest.finalize()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// The prime string did not parse as hexadecimal.
    InvalidPrime,
}

/// A generated Diffie-Hellman key pair, fixed-width big-endian.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: [u8; DH_KEY_LEN],
    pub public_key: [u8; DH_KEY_LEN],
}

/// Generate a key pair over the group `(prime_hex, generator)`.
///
/// The private key is drawn as [`DH_KEY_LEN`] random bytes and redrawn until
/// its value lies below the prime; the public key is `g^x mod p`. The caller
/// supplies the randomness source, so entropy quality (and test determinism)
/// are its concern.
pub fn generate_key_pair(
    prime_hex: &str,
    generator: u32,
    rng: &mut impl RngCore,
) -> Result<KeyPair, CryptoError> {
    let p = parse_prime(prime_hex)?;
    let g = BigUint::from(generator);

    let mut private_key = [0u8; DH_KEY_LEN];
    let x = loop {
        rng.fill_bytes(&mut private_key);
        let x = BigUint::from_bytes_be(&private_key);
        if x < p {
            break x;
        }
    };

    let y = g.modpow(&x, &p);
    Ok(KeyPair {
        private_key,
        public_key: to_fixed_be(&y),
    })
}

/// Shared secret `y_peer^x mod p`, fixed-width big-endian.
///
/// The peer's public key is taken at whatever length it arrived on the wire;
/// the exponentiation reduces it into the group.
pub fn shared_secret(
    prime_hex: &str,
    private_key: &[u8; DH_KEY_LEN],
    peer_public_key: &[u8],
) -> Result<[u8; DH_KEY_LEN], CryptoError> {
    let p = parse_prime(prime_hex)?;
    let x = BigUint::from_bytes_be(private_key);
    let y = BigUint::from_bytes_be(peer_public_key);
    let s = y.modpow(&x, &p);
    Ok(to_fixed_be(&s))
}

/// The AES-128 session key: MD5 of the shared secret.
pub fn derive_session_key(secret_key: &[u8; DH_KEY_LEN]) -> [u8; 16] {
    Md5::digest(secret_key).into()
}

/// The per-frame IV: the frame's sequence number in byte zero, the rest
/// zero. Identical for encrypt and decrypt of the frame with that sequence
/// number.
pub fn frame_iv(sequence_number: u8) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[0] = sequence_number;
    iv
}

/// AES-CFB128 encrypt `data` in place.
pub fn encrypt_in_place(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    Aes128CfbEncryptor::new(key.into(), iv.into()).encrypt(data);
}

/// AES-CFB128 decrypt `data` in place.
pub fn decrypt_in_place(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    Aes128CfbDecryptor::new(key.into(), iv.into()).decrypt(data);
}

fn parse_prime(prime_hex: &str) -> Result<BigUint, CryptoError> {
    BigUint::parse_bytes(prime_hex.as_bytes(), 16).ok_or(CryptoError::InvalidPrime)
}

// Values are reduced mod the 1024-bit prime before they get here, so they
// always fit the fixed width.
fn to_fixed_be(value: &BigUint) -> [u8; DH_KEY_LEN] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; DH_KEY_LEN];
    out[DH_KEY_LEN - bytes.len()..].copy_from_slice(&bytes);
    out
}
