//! Session token generation.
//!
//! Tokens are short enough to read aloud or type on a phone: eight symbols
//! from digits and uppercase letters, about 41 bits of entropy.

use rand::Rng;
use tracing::debug;

use crate::types::SessionToken;

/// Symbols a token may contain.
pub const TOKEN_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Number of symbols in a token.
pub const TOKEN_LENGTH: usize = 8;

/// Generate a random token from the thread-local CSPRNG.
pub fn generate() -> SessionToken {
    let mut rng = rand::thread_rng();
    let token: String = (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();
    SessionToken::parse(&token)
}

/// Generate tokens until one is not `taken`.
pub fn generate_unique(taken: impl Fn(&SessionToken) -> bool) -> SessionToken {
    loop {
        let candidate = generate();
        if !taken(&candidate) {
            return candidate;
        }
        debug!("session token collision, regenerating");
    }
}
