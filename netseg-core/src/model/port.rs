use serde::{Deserialize, Serialize};

/// Transport protocol tag carried alongside each ingress port string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// An inclusive port range, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// `[a,b]` and `[c,d]` overlap iff `a <= d && c <= b`.
    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// One ingress port declaration as it appears on a Service spec: a protocol tag
/// plus a raw port string (`"80"`, `"80-90"`, or `"80,443,8000-8100"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressPort {
    pub protocol: Protocol,
    pub port: String,
}

impl IngressPort {
    pub fn new(protocol: Protocol, port: impl Into<String>) -> Self {
        Self {
            protocol,
            port: port.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_predicate() {
        let a = PortRange {
            start: 80,
            end: 100,
        };
        let b = PortRange {
            start: 90,
            end: 110,
        };
        let c = PortRange {
            start: 101,
            end: 110,
        };
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn display_collapses_single_port_range() {
        assert_eq!(PortRange::single(80).to_string(), "80");
        assert_eq!(
            PortRange {
                start: 80,
                end: 90
            }
            .to_string(),
            "80-90"
        );
    }
}
