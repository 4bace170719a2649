//! Fixed-width descriptor strings.
//!
//! `a-characters` allow upper-case letters, digits, and a small punctuation
//! set; `d-characters` allow only upper-case letters, digits, and `_`. Both
//! are space padded. Input is upper-cased first; anything still outside the
//! set is replaced (`?` for a-characters, `_` for d-characters).

const A_PUNCTUATION: &[u8] = b" !\"%&'()*+,-./:;<=>?_";

fn is_d_char(c: u8) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == b'_'
}

fn is_a_char(c: u8) -> bool {
    is_d_char(c) || A_PUNCTUATION.contains(&c)
}

fn encode(s: &str, len: usize, allowed: fn(u8) -> bool, replacement: u8) -> Vec<u8> {
    let mut out: Vec<u8> = s
        .chars()
        .take(len)
        .map(|c| {
            let c = c.to_ascii_uppercase();
            if c.is_ascii() && allowed(c as u8) {
                c as u8
            } else {
                replacement
            }
        })
        .collect();
    out.resize(len, b' ');
    out
}

/// Encode `s` as `len` a-characters.
pub fn str_a(s: &str, len: usize) -> Vec<u8> {
    encode(s, len, is_a_char, b'?')
}

/// Encode `s` as `len` d-characters.
pub fn str_d(s: &str, len: usize) -> Vec<u8> {
    encode(s, len, is_d_char, b'_')
}

/// Decode a padded descriptor string.
pub fn decode(b: &[u8]) -> String {
    String::from_utf8_lossy(b)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_and_uppercases() {
        assert_eq!(str_d("vdisc", 8), b"VDISC   ");
        assert_eq!(str_a("linux", 6), b"LINUX ");
    }

    #[test]
    fn replaces_disallowed() {
        assert_eq!(str_d("a-b.c", 5), b"A_B_C");
        assert_eq!(str_a("a-b.c#é", 7), b"A-B.C??");
    }

    #[test]
    fn truncates() {
        assert_eq!(str_d("ABCDEFGH", 4), b"ABCD");
    }

    #[test]
    fn decode_trims() {
        assert_eq!(decode(b"VDISC   "), "VDISC");
        assert_eq!(decode(b"        "), "");
    }
}
