//! Percent-encoding for physical-key and package URIs.
//!
//! Path segments keep every RFC 3986 `pchar` literal. Query values (version
//! ids) additionally escape `/`, `&`, `=` and `+` so that any version id
//! survives a round trip. Fragment values keep `/` but escape the
//! `&`/`=`/`@`/`+` separators used by package references.

use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, NON_ALPHANUMERIC};

const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const PATH: &AsciiSet = &UNRESERVED
    .remove(b'/')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

const QUERY_VALUE: &AsciiSet = &UNRESERVED
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';')
    .remove(b':')
    .remove(b'@');

const FRAGMENT_VALUE: &AsciiSet = &UNRESERVED
    .remove(b'/')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b';');

/// Encode a `/`-separated path, leaving the separators intact.
pub fn encode_path(path: &str) -> String {
    encode_path_bytes(path.as_bytes())
}

/// Encode raw path bytes; bytes outside ASCII are always escaped.
pub fn encode_path_bytes(path: &[u8]) -> String {
    percent_encode(path, PATH).to_string()
}

/// Encode a query-parameter value.
pub fn encode_query_value(value: &str) -> String {
    percent_encode(value.as_bytes(), QUERY_VALUE).to_string()
}

/// Encode a `key=value` fragment value, leaving `/` intact.
pub fn encode_fragment_value(value: &str) -> String {
    percent_encode(value.as_bytes(), FRAGMENT_VALUE).to_string()
}

/// Decode `%XX` escapes into raw bytes. Fails on truncated escapes.
pub fn decode_bytes(input: &str) -> Result<Vec<u8>, String> {
    let bytes = input.as_bytes();
    for (i, _) in input.match_indices('%') {
        let valid = bytes
            .get(i + 1..i + 3)
            .is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(format!("malformed escape at byte {i}"));
        }
    }
    Ok(percent_decode_str(input).collect())
}

/// Decode `%XX` escapes. Fails on truncated escapes or non-UTF-8 output.
pub fn decode(input: &str) -> Result<String, String> {
    String::from_utf8(decode_bytes(input)?)
        .map_err(|_| "escapes do not decode to UTF-8".to_owned())
}
