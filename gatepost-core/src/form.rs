// Copyright (C) 2025 Gatepost Project
//
// MIT License

//! gatepost-core - `application/x-www-form-urlencoded` body parsing
//!
//! [`FormBody`] exposes the body as a key/value mapping.  Field extraction
//! truncates the *raw* (still-encoded) value to the requested capacity
//! before percent-decoding, so a field can never decode to more than `N`
//! bytes and over-long input is cut rather than rejected.

/// A parsed view over a form-encoded request body.
#[derive(Debug, Clone, Copy)]
pub struct FormBody<'a> {
    body: &'a str,
}

impl<'a> FormBody<'a> {
    pub fn new(body: &'a str) -> Self {
        Self { body }
    }

    /// Returns the raw (still-encoded) value of `key`, if the field is
    /// present.  An empty value is still "present".
    pub fn raw(&self, key: &str) -> Option<&'a str> {
        self.body.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then_some(v)
        })
    }

    /// Returns the decoded value of `key`: raw value truncated to `N`
    /// bytes, then percent-decoded (`+` as space).  `None` when the field
    /// is absent or decodes to invalid UTF-8.
    pub fn field<const N: usize>(&self, key: &str) -> Option<heapless::String<N>> {
        self.raw(key).and_then(percent_decode::<N>)
    }
}

/// Percent-decodes `raw` after truncating it to `N` bytes.  Incomplete or
/// non-hex escapes are passed through literally.
pub fn percent_decode<const N: usize>(raw: &str) -> Option<heapless::String<N>> {
    let bytes = raw.as_bytes();
    let bytes = &bytes[..bytes.len().min(N)];

    let mut out = heapless::Vec::<u8, N>::new();
    let mut i = 0;
    while i < bytes.len() {
        let byte = match bytes[i] {
            b'+' => b' ',
            b'%' => match hex_pair(bytes.get(i + 1), bytes.get(i + 2)) {
                Some(decoded) => {
                    i += 2;
                    decoded
                }
                None => b'%',
            },
            other => other,
        };
        // Cannot overflow: output length never exceeds input length.
        out.push(byte).ok()?;
        i += 1;
    }

    let mut result = heapless::String::new();
    result.push_str(core::str::from_utf8(&out).ok()?).ok()?;
    Some(result)
}

fn hex_pair(high: Option<&u8>, low: Option<&u8>) -> Option<u8> {
    let high = (*high? as char).to_digit(16)?;
    let low = (*low? as char).to_digit(16)?;
    Some(((high << 4) | low) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_extracted_from_body() {
        let form = FormBody::new("setup_pwd=AABBCCDD&ssid=HomeNet&password=Secret123&csrf=1234");
        assert_eq!(form.field::<31>("ssid").unwrap(), "HomeNet");
        assert_eq!(form.field::<63>("password").unwrap(), "Secret123");
        assert_eq!(form.raw("csrf"), Some("1234"));
        assert_eq!(form.raw("missing"), None);
    }

    #[test]
    fn key_matching_is_exact() {
        // "ssid" must not match inside "xssid".
        let form = FormBody::new("xssid=Wrong&ssid=Right");
        assert_eq!(form.field::<31>("ssid").unwrap(), "Right");
    }

    #[test]
    fn plus_and_percent_sequences_decode() {
        let form = FormBody::new("ssid=My+Home%20Net&password=p%40ss%2Bword");
        assert_eq!(form.field::<31>("ssid").unwrap(), "My Home Net");
        assert_eq!(form.field::<63>("password").unwrap(), "p@ss+word");
    }

    #[test]
    fn truncation_happens_before_decoding() {
        // Raw value is 9 bytes; cap of 5 keeps "ab%20" which then decodes
        // to 3 bytes.  Decoding first would have kept 5 decoded bytes.
        assert_eq!(percent_decode::<5>("ab%20cdef").unwrap(), "ab ");
    }

    #[test]
    fn truncation_may_split_an_escape() {
        // The cut lands inside "%41"; the dangling "%4" passes through.
        assert_eq!(percent_decode::<4>("ab%41cd").unwrap(), "ab%4");
    }

    #[test]
    fn invalid_escapes_pass_through() {
        assert_eq!(percent_decode::<16>("50%").unwrap(), "50%");
        assert_eq!(percent_decode::<16>("50%zz").unwrap(), "50%zz");
    }

    #[test]
    fn empty_value_is_present() {
        let form = FormBody::new("ssid=&password=x");
        assert_eq!(form.raw("ssid"), Some(""));
        assert_eq!(form.field::<31>("ssid").unwrap(), "");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        assert!(percent_decode::<8>("%FF%FE").is_none());
    }
}
