use crate::exception::*;

/// Decodes `hex`, naming `what` in the error so a bad field can be located.
pub fn bytes_from_hex(what: &str, hex: &str) -> Outcome<Vec<u8>> {
    hex::decode(hex).map_err(|err| KeychainError::Encoding(format!("{what}: {err}")))
}

pub fn array_from_hex<const N: usize>(what: &str, hex: &str) -> Outcome<[u8; N]> {
    let bytes = bytes_from_hex(what, hex)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        KeychainError::Encoding(format!("{what}: expected {N} bytes, provided {len} bytes"))
    })
}

/// True if `hex` is exactly `len` lowercase-or-uppercase hex characters.
pub fn is_hex_of_len(hex: &str, len: usize) -> bool {
    hex.len() == len && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Splits `hex` at `at` characters, failing instead of panicking on short input.
pub fn split_hex<'a>(what: &str, hex: &'a str, at: usize) -> Outcome<(&'a str, &'a str)> {
    if hex.len() < at || !hex.is_char_boundary(at) {
        return Err(KeychainError::Encoding(format!(
            "{what}: expected at least {at} hex characters, provided {}",
            hex.len()
        )));
    }
    Ok(hex.split_at(at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_from_hex_rejects_wrong_length() {
        assert!(array_from_hex::<4>("x", "0011223344").is_err());
        assert_eq!(array_from_hex::<2>("x", "beef").unwrap(), [0xbe, 0xef]);
    }

    #[test]
    fn split_hex_guards_short_input() {
        assert!(split_hex("x", "abc", 4).is_err());
        assert_eq!(split_hex("x", "abcd", 2).unwrap(), ("ab", "cd"));
    }
}
