//! Percent-decoding of request pathnames and matched parameter values.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{Error, Result};
use crate::routing::Params;

/// Escapes that pathname decoding leaves intact: `%25` plus the reserved characters
/// `# $ & + , / : ; = ? @`. Compiled routes match these in their encoded form.
static KEPT_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%(?:2[3-6BbCcFf]|3[AaBbDdFf]|40)").expect("kept escape pattern is valid")
});

/// Decodes a request pathname for matching, keeping escapes of reserved characters so that
/// `/a%2Fb` stays a single segment.
pub fn decode_pathname(pathname: &str) -> Result<String> {
    let mut decoded = String::with_capacity(pathname.len());
    let mut last = 0;
    for escape in KEPT_ESCAPE.find_iter(pathname) {
        decoded.push_str(&decode(&pathname[last..escape.start()])?);
        decoded.push_str(escape.as_str());
        last = escape.end();
    }
    decoded.push_str(&decode(&pathname[last..])?);
    Ok(decoded)
}

/// Fully decodes every matched parameter value.
pub fn decode_params(params: Params) -> Result<Params> {
    params
        .into_iter()
        .map(|(name, value)| {
            let value = decode(&value)?.into_owned();
            Ok((name, value))
        })
        .collect()
}

fn decode(text: &str) -> Result<Cow<'_, str>> {
    urlencoding::decode(text).map_err(|_| Error::InvalidEncoding(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pathname_plain() {
        assert_eq!(decode_pathname("/blog/hello%20world").unwrap(), "/blog/hello world");
        assert_eq!(decode_pathname("/caf%C3%A9").unwrap(), "/café");
        assert_eq!(decode_pathname("/no-escapes").unwrap(), "/no-escapes");
    }

    #[test]
    fn test_decode_pathname_keeps_reserved_escapes() {
        assert_eq!(decode_pathname("/a%2Fb").unwrap(), "/a%2Fb");
        assert_eq!(decode_pathname("/a%2fb%3F").unwrap(), "/a%2fb%3F");
        assert_eq!(decode_pathname("/100%25%20off").unwrap(), "/100%25 off");
        assert_eq!(decode_pathname("/%23tag%40me").unwrap(), "/%23tag%40me");
    }

    #[test]
    fn test_decode_pathname_rejects_invalid_utf8() {
        assert!(matches!(decode_pathname("/%FF"), Err(Error::InvalidEncoding(_))));
    }

    #[test]
    fn test_decode_params() {
        let params: Params = [("slug".to_string(), "a%2Fb%20c".to_string())].into_iter().collect();
        let decoded = decode_params(params).unwrap();
        assert_eq!(decoded["slug"], "a/b c");
    }
}
