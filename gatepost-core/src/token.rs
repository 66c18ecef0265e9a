// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost-core - CSRF token
//!
//! A single outstanding random 32-bit value.  Rendered into the form as
//! eight uppercase hex characters; submissions are parsed back
//! case-insensitively.  Comparison does not consume the token - only a new
//! page render replaces it.

use core::fmt::Write;

/// Rendered token length in characters.
pub const TOKEN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsrfToken(u32);

impl CsrfToken {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Renders the token for embedding in a hidden form field.
    pub fn render(&self) -> heapless::String<TOKEN_LEN> {
        let mut out = heapless::String::new();
        // Cannot fail: a u32 is at most eight hex digits.
        let _ = write!(out, "{:08X}", self.0);
        out
    }

    /// Checks a submitted hex token against this one.
    pub fn matches(&self, submitted: &str) -> bool {
        match u32::from_str_radix(submitted.trim(), 16) {
            Ok(value) => value == self.0,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_eight_uppercase_hex_chars() {
        assert_eq!(CsrfToken::new(0xA1B2_C3D4).render(), "A1B2C3D4");
        assert_eq!(CsrfToken::new(0x0000_002A).render(), "0000002A");
    }

    #[test]
    fn matches_own_rendering_case_insensitively() {
        let token = CsrfToken::new(0xA1B2_C3D4);
        assert!(token.matches("A1B2C3D4"));
        assert!(token.matches("a1b2c3d4"));
    }

    #[test]
    fn rejects_other_values_and_garbage() {
        let token = CsrfToken::new(0xA1B2_C3D4);
        assert!(!token.matches("FFFFFFFF"));
        assert!(!token.matches(""));
        assert!(!token.matches("not-hex"));
        assert!(!token.matches("A1B2C3D4A1B2C3D4"));
    }

    #[test]
    fn a_new_render_invalidates_the_previous_token() {
        // Two successive page renders: only the latest token is accepted.
        let first = CsrfToken::new(0x1111_1111);
        let second = CsrfToken::new(0x2222_2222);
        let current = second;
        assert!(!current.matches(first.render().as_str()));
        assert!(current.matches(second.render().as_str()));
    }
}
