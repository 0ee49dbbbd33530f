// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document key generation.
//
// Keys are fixed-length strings over a lowercase alphanumeric alphabet.
// They are built by accumulating short random chunks and truncating to the
// requested length. The generator makes no uniqueness promise; collisions
// are left to the backend's upsert-by-key semantics and to key length.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Characters a generated key may contain.
pub const KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Default length for generated keys.
pub const DEFAULT_KEY_SIZE: usize = 31;

/// Characters drawn per accumulation step.
const CHUNK_LEN: usize = 5;

/// Produces document keys of an exact length.
pub trait KeyGenerator: Send + Sync {
    /// Return a key of exactly `length` characters from [`KEY_ALPHABET`].
    fn generate(&self, length: usize) -> String;
}

/// Build a key from any random source.
///
/// Shared by every generator so that seeded and unseeded keys have the
/// same shape.
pub fn generate_key<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    let mut key = String::with_capacity(length + CHUNK_LEN);
    while key.len() < length {
        for _ in 0..CHUNK_LEN {
            let idx = rng.gen_range(0..KEY_ALPHABET.len());
            key.push(KEY_ALPHABET[idx] as char);
        }
    }
    key.truncate(length);
    key
}

/// Key generator backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomKeyGenerator;

impl RandomKeyGenerator {
    /// Create a new generator.
    pub fn new() -> Self {
        Self
    }
}

impl KeyGenerator for RandomKeyGenerator {
    fn generate(&self, length: usize) -> String {
        generate_key(&mut rand::thread_rng(), length)
    }
}

/// Deterministic key generator for tests.
///
/// Two generators created with the same seed produce the same key sequence.
#[derive(Debug)]
pub struct SeededKeyGenerator {
    rng: Mutex<StdRng>,
}

impl SeededKeyGenerator {
    /// Create a generator whose output is fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl KeyGenerator for SeededKeyGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = self.rng.lock();
        generate_key(&mut *rng, length)
    }
}
