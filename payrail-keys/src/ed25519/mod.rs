//! Self-contained Ed25519 keypair derivation and signing.
//!
//! Custodial Solana keys arrive as raw 32-byte seeds or 64-byte secret keys,
//! and no platform primitive exposes keypair derivation from pure bytes, so
//! the curve arithmetic is implemented here directly: field elements in
//! [`field`], SHA-512 in [`sha512`], and point/scalar operations in this
//! module. Points are held in extended twisted Edwards coordinates
//! `(X, Y, Z, T)`; scalar multiplication is a conditional-swap ladder over
//! all 256 bits.

use self::field::{
    BASE_X, BASE_Y, D2, Fe, GF0, GF1, add, inv25519, mul, pack25519, par25519, sel25519, sub,
};
use self::sha512::sha512;

pub(crate) mod field;
pub mod sha512;

/// Errors from Ed25519 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Ed25519Error {
    /// A seed was not exactly 32 bytes.
    #[error("ed25519 seed must be 32 bytes, got {got}")]
    InvalidSeedLength {
        /// The provided length.
        got: usize,
    },
    /// A secret key was not exactly 64 bytes.
    #[error("ed25519 secret key must be 64 bytes, got {got}")]
    InvalidSecretKeyLength {
        /// The provided length.
        got: usize,
    },
}

/// An Ed25519 keypair in the conventional 32/64-byte layout.
///
/// The secret key is `seed || public`, so the public key is always the
/// trailing 32 bytes of the secret key.
#[derive(Clone, Copy)]
pub struct Keypair {
    /// The 32-byte public key (packed curve point).
    pub public: [u8; 32],
    /// The 64-byte secret key (seed followed by public key).
    pub secret: [u8; 64],
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl Keypair {
    /// Derives a keypair from a 32-byte seed.
    ///
    /// Deterministic: the same seed always yields the same keypair.
    ///
    /// # Errors
    ///
    /// Returns [`Ed25519Error::InvalidSeedLength`] when `seed` is not 32
    /// bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, Ed25519Error> {
        let seed: &[u8; 32] = seed
            .try_into()
            .map_err(|_| Ed25519Error::InvalidSeedLength { got: seed.len() })?;

        let mut digest = sha512(seed);
        clamp(&mut digest);

        let mut point = identity();
        let scalar: [u8; 32] = first_half(&digest);
        scalar_base(&mut point, &scalar);

        let mut public = [0u8; 32];
        pack(&mut public, &point);

        let mut secret = [0u8; 64];
        secret[..32].copy_from_slice(seed);
        secret[32..].copy_from_slice(&public);
        Ok(Self { public, secret })
    }

    /// Reconstructs a keypair from a 64-byte secret key.
    ///
    /// By Ed25519 convention the public key is the trailing 32 bytes of the
    /// secret key; no curve arithmetic is needed.
    ///
    /// # Errors
    ///
    /// Returns [`Ed25519Error::InvalidSecretKeyLength`] when `secret` is not
    /// 64 bytes.
    pub fn from_secret_key(secret: &[u8]) -> Result<Self, Ed25519Error> {
        let secret: &[u8; 64] = secret
            .try_into()
            .map_err(|_| Ed25519Error::InvalidSecretKeyLength { got: secret.len() })?;
        let mut public = [0u8; 32];
        public.copy_from_slice(&secret[32..]);
        Ok(Self {
            public,
            secret: *secret,
        })
    }
}

/// Produces a detached 64-byte Ed25519 signature over `message`.
#[must_use]
pub fn sign(message: &[u8], secret: &[u8; 64]) -> [u8; 64] {
    let mut expanded = sha512(&secret[..32]);
    clamp(&mut expanded);

    // r = H(prefix || message) mod L
    let mut r_input = Vec::with_capacity(32 + message.len());
    r_input.extend_from_slice(&expanded[32..]);
    r_input.extend_from_slice(message);
    let mut r = sha512(&r_input);
    reduce(&mut r);

    let mut signature = [0u8; 64];
    let mut point = identity();
    let r_scalar: [u8; 32] = first_half(&r);
    scalar_base(&mut point, &r_scalar);
    let mut r_packed = [0u8; 32];
    pack(&mut r_packed, &point);
    signature[..32].copy_from_slice(&r_packed);

    // h = H(R || A || message) mod L
    let mut h_input = Vec::with_capacity(64 + message.len());
    h_input.extend_from_slice(&r_packed);
    h_input.extend_from_slice(&secret[32..]);
    h_input.extend_from_slice(message);
    let mut h = sha512(&h_input);
    reduce(&mut h);

    // s = r + h * a mod L
    let mut x = [0i64; 64];
    for i in 0..32 {
        x[i] = i64::from(r[i]);
    }
    for i in 0..32 {
        for j in 0..32 {
            x[i + j] += i64::from(h[i]) * i64::from(expanded[j]);
        }
    }
    let mut s = [0u8; 32];
    mod_l(&mut s, &mut x);
    signature[32..].copy_from_slice(&s);
    signature
}

/// Clamps the low half of an expanded secret: clears the three low bits,
/// clears the top bit, sets bit 254.
fn clamp(expanded: &mut [u8; 64]) {
    expanded[0] &= 248;
    expanded[31] &= 127;
    expanded[31] |= 64;
}

fn first_half(digest: &[u8; 64]) -> [u8; 32] {
    let mut half = [0u8; 32];
    half.copy_from_slice(&digest[..32]);
    half
}

/// A curve point in extended coordinates (X, Y, Z, T), with x = X/Z,
/// y = Y/Z, and T = XY/Z.
#[derive(Clone, Copy)]
struct Point {
    x: Fe,
    y: Fe,
    z: Fe,
    t: Fe,
}

/// The neutral element (0, 1).
fn identity() -> Point {
    Point {
        x: GF0,
        y: GF1,
        z: GF1,
        t: GF0,
    }
}

/// p += q, unified twisted Edwards addition (also used for doubling).
fn point_add(p: &mut Point, q: &Point) {
    let mut a = GF0;
    let mut b = GF0;
    let mut c = GF0;
    let mut d = GF0;
    let mut t = GF0;

    sub(&mut a, &p.y, &p.x);
    sub(&mut t, &q.y, &q.x);
    let a_copy = a;
    mul(&mut a, &a_copy, &t);
    add(&mut b, &p.x, &p.y);
    add(&mut t, &q.x, &q.y);
    let b_copy = b;
    mul(&mut b, &b_copy, &t);
    mul(&mut c, &p.t, &q.t);
    let c_copy = c;
    mul(&mut c, &c_copy, &D2);
    mul(&mut d, &p.z, &q.z);
    let d_copy = d;
    add(&mut d, &d_copy, &d_copy);

    let mut e = GF0;
    let mut f = GF0;
    let mut g = GF0;
    let mut h = GF0;
    sub(&mut e, &b, &a);
    sub(&mut f, &d, &c);
    add(&mut g, &d, &c);
    add(&mut h, &b, &a);

    mul(&mut p.x, &e, &f);
    mul(&mut p.y, &h, &g);
    mul(&mut p.z, &g, &f);
    mul(&mut p.t, &e, &h);
}

/// Conditionally swaps two points when `b` is 1.
fn point_cswap(p: &mut Point, q: &mut Point, b: i64) {
    sel25519(&mut p.x, &mut q.x, b);
    sel25519(&mut p.y, &mut q.y, b);
    sel25519(&mut p.z, &mut q.z, b);
    sel25519(&mut p.t, &mut q.t, b);
}

/// Packs a point into its 32-byte compressed form: the y-coordinate with the
/// x-parity in the top bit.
fn pack(out: &mut [u8; 32], p: &Point) {
    let mut zi = GF0;
    let mut tx = GF0;
    let mut ty = GF0;
    inv25519(&mut zi, &p.z);
    mul(&mut tx, &p.x, &zi);
    mul(&mut ty, &p.y, &zi);
    pack25519(out, &ty);
    out[31] ^= par25519(&tx) << 7;
}

/// p = s * q via a 256-bit conditional-swap ladder.
fn scalar_mult(p: &mut Point, q: &mut Point, scalar: &[u8; 32]) {
    *p = identity();
    for i in (0..256).rev() {
        let bit = i64::from((scalar[i / 8] >> (i & 7)) & 1);
        point_cswap(p, q, bit);
        point_add(q, p);
        let doubled = *p;
        point_add(p, &doubled);
        point_cswap(p, q, bit);
    }
}

/// p = s * B for the Ed25519 base point B.
fn scalar_base(p: &mut Point, scalar: &[u8; 32]) {
    let mut t = GF0;
    mul(&mut t, &BASE_X, &BASE_Y);
    let mut q = Point {
        x: BASE_X,
        y: BASE_Y,
        z: GF1,
        t,
    };
    scalar_mult(p, &mut q, scalar);
}

/// The group order L, little-endian bytes as i64 limbs.
const L: [i64; 32] = [
    0xed, 0xd3, 0xf5, 0x5c, 0x1a, 0x63, 0x12, 0x58, 0xd6, 0x9c, 0xf7, 0xa2, 0xde, 0xf9, 0xde,
    0x14, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10,
];

/// Reduces a 64-limb intermediate mod L into 32 output bytes.
fn mod_l(r: &mut [u8; 32], x: &mut [i64; 64]) {
    for i in (32..64).rev() {
        let mut carry = 0i64;
        for j in (i - 32)..(i - 12) {
            x[j] += carry - 16 * x[i] * L[j - (i - 32)];
            carry = (x[j] + 128) >> 8;
            x[j] -= carry << 8;
        }
        x[i - 12] += carry;
        x[i] = 0;
    }
    let mut carry = 0i64;
    for j in 0..32 {
        x[j] += carry - (x[31] >> 4) * L[j];
        carry = x[j] >> 8;
        x[j] &= 255;
    }
    for j in 0..32 {
        x[j] -= carry * L[j];
    }
    for i in 0..32 {
        x[i + 1] += x[i] >> 8;
        r[i] = (x[i] & 255) as u8;
    }
}

/// Reduces a 64-byte hash output mod L in place; the result occupies the
/// first 32 bytes.
fn reduce(hash: &mut [u8; 64]) {
    let mut x = [0i64; 64];
    for (i, byte) in hash.iter().enumerate() {
        x[i] = i64::from(*byte);
    }
    let mut out = [0u8; 32];
    mod_l(&mut out, &mut x);
    hash[..32].copy_from_slice(&out);
    hash[32..].fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    // RFC 8032 test vector 1: empty message.
    const SEED_1: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const PUBLIC_1: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
    const SIG_1: &str = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155\
                         5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b";

    // RFC 8032 test vector 3: two-byte message.
    const SEED_3: &str = "c5aa8df43f9f837bedb7442f31dcb7b166d38535076f094b85ce3a2e0b4458f7";
    const PUBLIC_3: &str = "fc51cd8e6218a1a38da47ed00230f0580816ed13ba3303ac5deb911548908025";
    const SIG_3: &str = "6291d657deec24024827e69c3abe01a30ce548a284743a445e3680d7db5ac3ac\
                         18ff9b538d16f290ae67f760984dc6594a7c15e9716ed28dc027beceea1ec40a";

    #[test]
    fn derives_rfc8032_public_keys() {
        let pair = Keypair::from_seed(&from_hex(SEED_1)).unwrap();
        assert_eq!(to_hex(&pair.public), PUBLIC_1);

        let pair = Keypair::from_seed(&from_hex(SEED_3)).unwrap();
        assert_eq!(to_hex(&pair.public), PUBLIC_3);
    }

    #[test]
    fn signs_rfc8032_vectors() {
        let pair = Keypair::from_seed(&from_hex(SEED_1)).unwrap();
        assert_eq!(to_hex(&sign(b"", &pair.secret)), SIG_1);

        let pair = Keypair::from_seed(&from_hex(SEED_3)).unwrap();
        assert_eq!(to_hex(&sign(&[0xaf, 0x82], &pair.secret)), SIG_3);
    }

    #[test]
    fn derivation_is_deterministic() {
        let seed = [7u8; 32];
        let a = Keypair::from_seed(&seed).unwrap();
        let b = Keypair::from_seed(&seed).unwrap();
        assert_eq!(a.public, b.public);
        assert_eq!(a.secret, b.secret);
    }

    #[test]
    fn secret_key_round_trips_through_from_secret_key() {
        let pair = Keypair::from_seed(&[42u8; 32]).unwrap();
        let again = Keypair::from_secret_key(&pair.secret).unwrap();
        assert_eq!(again.public, pair.public);
        assert_eq!(&pair.secret[32..], &pair.public);
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert_eq!(
            Keypair::from_seed(&[0u8; 31]).unwrap_err(),
            Ed25519Error::InvalidSeedLength { got: 31 }
        );
        assert_eq!(
            Keypair::from_secret_key(&[0u8; 63]).unwrap_err(),
            Ed25519Error::InvalidSecretKeyLength { got: 63 }
        );
    }

    #[test]
    fn debug_never_prints_secret_bytes() {
        let pair = Keypair::from_seed(&[9u8; 32]).unwrap();
        let debug = format!("{pair:?}");
        assert!(!debug.contains("secret"));
    }
}
