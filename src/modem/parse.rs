//! Pure parsers over completed modem reply lines.

use heapless::String;

use crate::modem::{IDSTRING_MAX_LENGTH, IP_MAX_LENGTH};

pub(crate) enum DnsReply {
    Resolved(String<IP_MAX_LENGTH>),
    /// `+CDNSGIP: 1` line with a quote count outside the valid range.
    Malformed,
    /// `+CDNSGIP: 0,<err>` - the modem could not resolve the host.
    Failed,
    NotDns,
}

/// A well-formed resolution carries the hostname pair plus one to four
/// address pairs, so between 4 and 10 double quotes. The address is the
/// token after the third quote.
pub(crate) fn parse_dns_reply(line: &[u8]) -> DnsReply {
    if line.starts_with(b"+CDNSGIP: 1") {
        let quotes = line.iter().filter(|&&b| b == b'"').count();
        if !(4..=10).contains(&quotes) {
            return DnsReply::Malformed;
        }
        let address = match line.split(|&b| b == b'"').nth(3) {
            Some(token) => token,
            None => return DnsReply::Malformed,
        };
        let text = match core::str::from_utf8(address) {
            Ok(text) => text,
            Err(_) => return DnsReply::Malformed,
        };
        let mut ip: String<IP_MAX_LENGTH> = String::new();
        if ip.push_str(text).is_err() {
            return DnsReply::Malformed;
        }
        DnsReply::Resolved(ip)
    } else if line.starts_with(b"+CDNSGIP: 0") {
        DnsReply::Failed
    } else {
        DnsReply::NotDns
    }
}

/// `+CIPRXGET: 4,0,<n>` - bytes waiting at the modem.
pub(crate) fn parse_rx_pending(line: &[u8]) -> Option<u16> {
    ascii_u16(line.strip_prefix(b"+CIPRXGET: 4,0,")?)
}

/// `+CIPRXGET: 2,0,<n>` - header of a granted window; exactly `n` raw
/// bytes follow it on the wire.
pub(crate) fn parse_rx_grant(line: &[u8]) -> Option<u16> {
    ascii_u16(line.strip_prefix(b"+CIPRXGET: 2,0,")?)
}

/// `+CIPRXGET: 1,0` - unsolicited "unread data" notification.
pub(crate) fn is_data_pending(line: &[u8]) -> bool {
    line.starts_with(b"+CIPRXGET: 1,0")
}

/// `+CSQ: <rssi>,<ber>`; 99 means the modem does not know.
pub(crate) fn parse_csq(line: &[u8]) -> Option<u8> {
    let value = ascii_u16(line.strip_prefix(b"+CSQ: ")?)?;
    Some(value.min(u8::MAX as u16) as u8)
}

/// `+CREG: <mode>,<stat>`; registered home (1) or roaming (5).
pub(crate) fn parse_registration(line: &[u8]) -> Option<bool> {
    let rest = line.strip_prefix(b"+CREG: ")?;
    let comma = rest.iter().position(|&b| b == b',')?;
    let stat = ascii_u16(&rest[comma + 1..])?;
    Some(stat == 1 || stat == 5)
}

/// `+CGATT: <state>`.
pub(crate) fn parse_attach(line: &[u8]) -> Option<bool> {
    let stat = ascii_u16(line.strip_prefix(b"+CGATT: ")?)?;
    Some(stat == 1)
}

pub(crate) fn is_error_reply(line: &[u8]) -> bool {
    line.starts_with(b"ERROR")
        || line.starts_with(b"+CME ERROR")
        || line.starts_with(b"+CMS ERROR")
}

/// Extracts an identity payload: any line that is neither a command
/// echo nor a blank CR line. The copy ends at `\r` and is truncated to
/// the identity buffer.
pub(crate) fn id_reply(line: &[u8]) -> Option<&[u8]> {
    if line.is_empty() || line.starts_with(b"AT") || line[0] == b'\r' || line[0] == b'\n' {
        return None;
    }
    let end = line
        .iter()
        .position(|&b| b == b'\r')
        .unwrap_or(line.len())
        .min(IDSTRING_MAX_LENGTH - 1);
    if end == 0 {
        return None;
    }
    Some(&line[..end])
}

fn ascii_u16(bytes: &[u8]) -> Option<u16> {
    let mut value: u16 = 0;
    let mut seen = false;
    for &b in bytes {
        if !b.is_ascii_digit() {
            break;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as u16)?;
        seen = true;
    }
    if seen {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_canonical_dns_reply() {
        match parse_dns_reply(b"+CDNSGIP: 1,\"example.com\",\"93.184.216.34\"\r\n") {
            DnsReply::Resolved(ip) => assert_eq!(ip.as_str(), "93.184.216.34"),
            _ => panic!("expected resolution"),
        }
    }

    #[test]
    fn resolves_first_of_multiple_addresses() {
        let line = b"+CDNSGIP: 1,\"example.com\",\"10.0.0.1\",\"10.0.0.2\"\r\n";
        match parse_dns_reply(line) {
            DnsReply::Resolved(ip) => assert_eq!(ip.as_str(), "10.0.0.1"),
            _ => panic!("expected resolution"),
        }
    }

    #[test]
    fn rejects_quote_counts_outside_range() {
        for line in [
            b"+CDNSGIP: 1,example.com\r\n".as_slice(),
            b"+CDNSGIP: 1,\"example.com\"\r\n".as_slice(),
            b"+CDNSGIP: 1,\"a\",\"b\",\"c\",\"d\",\"e\",\"f\"\r\n".as_slice(),
        ] {
            assert!(matches!(parse_dns_reply(line), DnsReply::Malformed));
        }
    }

    #[test]
    fn reports_resolution_failure() {
        assert!(matches!(
            parse_dns_reply(b"+CDNSGIP: 0,8\r\n"),
            DnsReply::Failed
        ));
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(matches!(parse_dns_reply(b"OK\r\n"), DnsReply::NotDns));
    }

    #[test]
    fn parses_rx_window_sizes() {
        assert_eq!(parse_rx_pending(b"+CIPRXGET: 4,0,1460\r\n"), Some(1460));
        assert_eq!(parse_rx_grant(b"+CIPRXGET: 2,0,3\r\n"), Some(3));
        assert_eq!(parse_rx_pending(b"+CIPRXGET: 2,0,3\r\n"), None);
        assert_eq!(parse_rx_grant(b"+CIPRXGET: 2,0,\r\n"), None);
    }

    #[test]
    fn recognizes_data_pending_notification() {
        assert!(is_data_pending(b"+CIPRXGET: 1,0\r\n"));
        assert!(!is_data_pending(b"+CIPRXGET: 4,0,12\r\n"));
    }

    #[test]
    fn parses_signal_quality() {
        assert_eq!(parse_csq(b"+CSQ: 17,99\r\n"), Some(17));
        assert_eq!(parse_csq(b"+CSQ: 99,99\r\n"), Some(99));
        assert_eq!(parse_csq(b"+CSQ: ,\r\n"), None);
    }

    #[test]
    fn parses_registration_status() {
        assert_eq!(parse_registration(b"+CREG: 0,1\r\n"), Some(true));
        assert_eq!(parse_registration(b"+CREG: 0,5\r\n"), Some(true));
        assert_eq!(parse_registration(b"+CREG: 0,2\r\n"), Some(false));
        assert_eq!(parse_registration(b"+CGATT: 1\r\n"), None);
    }

    #[test]
    fn parses_attach_status() {
        assert_eq!(parse_attach(b"+CGATT: 1\r\n"), Some(true));
        assert_eq!(parse_attach(b"+CGATT: 0\r\n"), Some(false));
    }

    #[test]
    fn identity_skips_echo_and_blank_lines() {
        assert_eq!(id_reply(b"AT+CGSN\r\n"), None);
        assert_eq!(id_reply(b"\r\n"), None);
        assert_eq!(
            id_reply(b"867564050638945\r\n"),
            Some(b"867564050638945".as_slice())
        );
    }

    #[test]
    fn identity_truncates_to_buffer() {
        let line = [b'x'; 48];
        assert_eq!(id_reply(&line).map(<[u8]>::len), Some(IDSTRING_MAX_LENGTH - 1));
    }
}
