//! Character reference decoding for attribute values.

use std::borrow::Cow;

/// Decodes numeric (`&#38;`, `&#x26;`) and common named character references. Named
/// references need their trailing `;`; unknown ones are left as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match decode_reference(after) {
            Some((c, consumed)) => {
                decoded.push(c);
                rest = &after[consumed..];
            }
            None => {
                decoded.push('&');
                rest = after;
            }
        }
    }
    decoded.push_str(rest);
    Cow::Owned(decoded)
}

/// Decodes the reference following an `&`, returning the character and how many bytes
/// of `text` it spans.
fn decode_reference(text: &str) -> Option<(char, usize)> {
    if let Some(numeric) = text.strip_prefix('#') {
        let (prefix, radix) = if numeric.starts_with(['x', 'X']) { (1, 16) } else { (0, 10) };
        let digits = numeric[prefix..]
            .bytes()
            .take_while(|b| if radix == 16 { b.is_ascii_hexdigit() } else { b.is_ascii_digit() })
            .count();
        if digits == 0 {
            return None;
        }

        let code = u32::from_str_radix(&numeric[prefix..prefix + digits], radix).ok()?;
        let c = char::from_u32(code)
            .filter(|&c| c != '\0')
            .unwrap_or(char::REPLACEMENT_CHARACTER);

        let mut consumed = 1 + prefix + digits;
        if text.as_bytes().get(consumed) == Some(&b';') {
            consumed += 1;
        }
        return Some((c, consumed));
    }

    let len = text.bytes().take_while(u8::is_ascii_alphanumeric).count();
    if text.as_bytes().get(len) != Some(&b';') {
        return None;
    }
    named(&text[..len]).map(|c| (c, len + 1))
}

fn named(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "reg" => '®',
        "hellip" => '…',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        _ => return None,
    };
    Some(c)
}
