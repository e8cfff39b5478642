//! Port-string parsing and the pairwise overlap predicate (SPEC_FULL.md §4.4 C4).

use tracing::warn;

use crate::model::{IngressPort, PortRange, Protocol};

/// Parses a single ingress port declaration into zero or more ranges.
///
/// Accepts `"N"`, `"N-M"` with `N <= M`, and comma-separated lists of either
/// form. Whitespace is insignificant. Invalid fragments are skipped with a
/// warning rather than failing the whole mapping — the parser is tolerant by
/// design (SPEC_FULL.md §4.5).
pub fn parse_port_string(raw: &str) -> Vec<PortRange> {
    let mut ranges = Vec::new();
    for fragment in raw.split(',') {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        match parse_fragment(fragment) {
            Some(range) => ranges.push(range),
            None => warn!(fragment, "skipping unparsable port fragment"),
        }
    }
    ranges
}

fn parse_fragment(fragment: &str) -> Option<PortRange> {
    if let Some((start, end)) = fragment.split_once('-') {
        let start: u16 = start.trim().parse().ok()?;
        let end: u16 = end.trim().parse().ok()?;
        if start > end {
            return None;
        }
        Some(PortRange { start, end })
    } else {
        let port: u16 = fragment.parse().ok()?;
        Some(PortRange::single(port))
    }
}

/// Parses every ingress port of a service into `(protocol, ranges)` pairs,
/// preserving declaration order.
pub fn parse_ingress_ports(ports: &[IngressPort]) -> Vec<(Protocol, Vec<PortRange>)> {
    ports
        .iter()
        .map(|p| (p.protocol, parse_port_string(&p.port)))
        .collect()
}

/// Whether any range drawn from `a`'s ingress ports overlaps, under the same
/// transport, any range drawn from `b`'s. Returns the first conflicting pair
/// found, `(protocol, range_from_a, range_from_b)`.
pub fn find_conflict(
    a: &[IngressPort],
    b: &[IngressPort],
) -> Option<(Protocol, PortRange, PortRange)> {
    let parsed_a = parse_ingress_ports(a);
    let parsed_b = parse_ingress_ports(b);

    for (proto_a, ranges_a) in &parsed_a {
        for (proto_b, ranges_b) in &parsed_b {
            if proto_a != proto_b {
                continue;
            }
            for ra in ranges_a {
                for rb in ranges_b {
                    if ra.overlaps(rb) {
                        return Some((*proto_a, *ra, *rb));
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_port() {
        assert_eq!(parse_port_string("80"), vec![PortRange::single(80)]);
    }

    #[test]
    fn parses_range() {
        assert_eq!(
            parse_port_string("80-90"),
            vec![PortRange { start: 80, end: 90 }]
        );
    }

    #[test]
    fn parses_comma_separated_list_ignoring_whitespace() {
        assert_eq!(
            parse_port_string(" 80 , 443, 8000-8100 "),
            vec![
                PortRange::single(80),
                PortRange::single(443),
                PortRange { start: 8000, end: 8100 },
            ]
        );
    }

    #[test]
    fn skips_invalid_fragments_tolerantly() {
        assert_eq!(parse_port_string("80,not-a-port,443"), vec![
            PortRange::single(80),
            PortRange::single(443),
        ]);
    }

    #[test]
    fn reversed_range_is_invalid() {
        assert_eq!(parse_port_string("100-80"), Vec::<PortRange>::new());
    }

    #[test]
    fn find_conflict_detects_overlap_same_protocol_only() {
        let a = vec![IngressPort::new(Protocol::Tcp, "80-100")];
        let b = vec![IngressPort::new(Protocol::Tcp, "90-110")];
        let conflict = find_conflict(&a, &b);
        assert!(conflict.is_some());

        let c = vec![IngressPort::new(Protocol::Udp, "90-110")];
        assert!(find_conflict(&a, &c).is_none());
    }

    #[test]
    fn find_conflict_none_when_disjoint() {
        let a = vec![IngressPort::new(Protocol::Tcp, "80")];
        let b = vec![IngressPort::new(Protocol::Tcp, "81-90")];
        assert!(find_conflict(&a, &b).is_none());
    }
}
