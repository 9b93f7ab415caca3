//! Log redaction for session tokens.
//!
//! A token is the only credential a viewer or reconnecting sharer needs, so
//! full tokens never go into logs.

/// Keep the first two characters of a token and mask the rest.
pub fn mask_token(token: &str) -> String {
    let mut chars = token.chars();
    let head: String = chars.by_ref().take(2).collect();
    let hidden = chars.count();
    format!("{head}{}", "*".repeat(hidden))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_prefix() {
        assert_eq!(mask_token("AB12CD34"), "AB******");
    }

    #[test]
    fn short_tokens_are_not_padded() {
        assert_eq!(mask_token("A"), "A");
        assert_eq!(mask_token(""), "");
    }
}
