//! Node names for string-like keys.
//!
//! A node name may not contain `/`, so string keys are wrapped in single
//! quotes with `\` written as `\\` and `/` as `\x2f`. Bytes keys are
//! written as `b'<hex>'`.

use crate::error::{LoaderError, LoaderResult};

const SLASH_ESCAPE: &str = "\\x2f";

pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str(SLASH_ESCAPE),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

pub(crate) fn unquote(name: &str) -> LoaderResult<String> {
    let inner = name
        .strip_prefix('\'')
        .and_then(|n| n.strip_suffix('\''))
        .ok_or_else(|| LoaderError::Malformed(format!("{name:?} is not a quoted name")))?;
    let mut out = String::with_capacity(inner.len());
    let mut rest = inner;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("\\\\") {
            out.push('\\');
            rest = after;
        } else if let Some(after) = tail.strip_prefix(SLASH_ESCAPE) {
            out.push('/');
            rest = after;
        } else {
            return Err(LoaderError::Malformed(format!(
                "bad escape in quoted name {name:?}"
            )));
        }
    }
    out.push_str(rest);
    Ok(out)
}

pub(crate) fn quote_bytes(b: &[u8]) -> String {
    format!("b'{}'", hex::encode(b))
}

pub(crate) fn unquote_bytes(name: &str) -> LoaderResult<Vec<u8>> {
    let inner = name
        .strip_prefix("b'")
        .and_then(|n| n.strip_suffix('\''))
        .ok_or_else(|| LoaderError::Malformed(format!("{name:?} is not a bytes name")))?;
    hex::decode(inner).map_err(|e| LoaderError::Malformed(format!("bytes name {name:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slashes_and_backslashes_survive() {
        for s in ["", "plain", "a/b", "back\\slash", "\\x2f", "'quoted'", "ünï/cödé"] {
            let name = quote(s);
            assert!(!name.contains('/'), "{name}");
            assert_eq!(unquote(&name).unwrap(), s);
        }
    }

    #[test]
    fn unquote_rejects_garbage() {
        assert!(unquote("bare").is_err());
        assert!(unquote("'").is_err());
        assert!(unquote("'bad\\q'").is_err());
    }

    #[test]
    fn bytes_names_are_hex() {
        assert_eq!(quote_bytes(&[0x00, 0x2f, 0xff]), "b'002fff'");
        assert_eq!(unquote_bytes("b'002fff'").unwrap(), vec![0x00, 0x2f, 0xff]);
        assert!(unquote_bytes("b'zz'").is_err());
        assert!(unquote_bytes("'00'").is_err());
    }
}
