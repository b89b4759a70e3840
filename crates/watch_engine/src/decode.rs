use chardetng::EncodingDetector;
use encoding_rs::Encoding;

use crate::{FailureKind, FetchError};

/// Decodes a response body to UTF-8.
///
/// Order: byte-order mark, then the `charset` of the Content-Type header,
/// then chardetng's guess over the whole body.
pub(crate) fn decode_page(bytes: &[u8], content_type: Option<&str>) -> Result<String, FetchError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(encoding) = content_type
        .and_then(header_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, encoding);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn header_charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(&['"', '\''][..]).to_string())
    })
}

fn decode_with(bytes: &[u8], encoding: &'static Encoding) -> Result<String, FetchError> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(FetchError::new(
            FailureKind::Decode {
                encoding: encoding.name().to_string(),
            },
            "malformed byte sequence",
        ));
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_parameter_is_case_insensitive() {
        assert_eq!(
            header_charset("text/html; Charset=\"ISO-8859-1\""),
            Some("ISO-8859-1".to_string())
        );
        assert_eq!(header_charset("text/html"), None);
    }

    #[test]
    fn header_charset_drives_decoding() {
        let bytes = b"caf\xe9";
        let text = decode_page(bytes, Some("text/html; charset=windows-1252")).unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn bom_wins_over_header() {
        let bytes = b"\xef\xbb\xbfhi";
        let text = decode_page(bytes, Some("text/html; charset=windows-1252")).unwrap();
        assert_eq!(text, "hi");
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let err = decode_page(b"ab\xc3", Some("text/html; charset=utf-8")).unwrap_err();
        assert_eq!(
            err.kind,
            FailureKind::Decode {
                encoding: "UTF-8".to_string()
            }
        );
    }
}
