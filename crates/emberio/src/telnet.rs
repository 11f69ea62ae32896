//! Telnet IAC filtering.
//!
//! The server speaks plain lines; whatever option negotiation a client
//! attempts gets politely refused. The filter removes IAC sequences from
//! the inbound stream (including `IAC SB ... IAC SE` subnegotiation blocks)
//! and queues the refusal bytes to write back:
//! - `IAC DO <opt>`   => `IAC WONT <opt>`
//! - `IAC WILL <opt>` => `IAC DONT <opt>`

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Default, Clone, Copy)]
enum FilterState {
    #[default]
    Data,
    SawIac,
    /// Negotiation command byte seen; the option byte is next.
    Negotiating(u8),
    /// Inside `IAC SB ... IAC SE`; true once an unescaped IAC was seen.
    Subneg(bool),
}

/// Stateful IAC stripper. Feed it chunks as they arrive; sequences split
/// across reads are handled.
#[derive(Debug, Default)]
pub struct TelnetFilter {
    state: FilterState,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter one chunk. Clean data bytes are appended to `data`; any
    /// refusal replies owed to the peer are returned.
    pub fn filter(&mut self, chunk: &[u8], data: &mut Vec<u8>) -> Vec<u8> {
        let mut replies = Vec::new();

        for &b in chunk {
            self.state = match self.state {
                FilterState::Data => {
                    if b == IAC {
                        FilterState::SawIac
                    } else {
                        data.push(b);
                        FilterState::Data
                    }
                }
                FilterState::SawIac => match b {
                    // IAC IAC escapes a literal 0xff.
                    IAC => {
                        data.push(IAC);
                        FilterState::Data
                    }
                    DO | DONT | WILL | WONT => FilterState::Negotiating(b),
                    SB => FilterState::Subneg(false),
                    // NOP, GA, and friends are two bytes total.
                    _ => FilterState::Data,
                },
                FilterState::Negotiating(cmd) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, b]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, b]),
                        _ => {}
                    }
                    FilterState::Data
                }
                FilterState::Subneg(iac_seen) => {
                    if iac_seen {
                        match b {
                            SE => FilterState::Data,
                            // IAC IAC inside SB is an escaped payload byte;
                            // the payload itself is discarded either way.
                            _ => FilterState::Subneg(false),
                        }
                    } else if b == IAC {
                        FilterState::Subneg(true)
                    } else {
                        FilterState::Subneg(false)
                    }
                }
            };
        }

        replies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(filter: &mut TelnetFilter, chunk: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        let replies = filter.filter(chunk, &mut data);
        (data, replies)
    }

    #[test]
    fn plain_data_passes_through() {
        let mut f = TelnetFilter::new();
        let (d, r) = run(&mut f, b"look\r\n");
        assert_eq!(d, b"look\r\n");
        assert!(r.is_empty());
    }

    #[test]
    fn escaped_iac_becomes_literal() {
        let mut f = TelnetFilter::new();
        let (d, r) = run(&mut f, &[IAC, IAC, b'a']);
        assert_eq!(d, vec![IAC, b'a']);
        assert!(r.is_empty());
    }

    #[test]
    fn do_and_will_are_refused() {
        let mut f = TelnetFilter::new();
        let (d, r) = run(&mut f, &[IAC, DO, 1, IAC, WILL, 3, b'x']);
        assert_eq!(d, vec![b'x']);
        assert_eq!(r, vec![IAC, WONT, 1, IAC, DONT, 3]);
    }

    #[test]
    fn negotiation_split_across_chunks() {
        let mut f = TelnetFilter::new();
        let (d1, r1) = run(&mut f, &[IAC, DO]);
        assert!(d1.is_empty());
        assert!(r1.is_empty());

        let (d2, r2) = run(&mut f, &[7, b'z']);
        assert_eq!(d2, vec![b'z']);
        assert_eq!(r2, vec![IAC, WONT, 7]);
    }

    #[test]
    fn subnegotiation_is_discarded() {
        let mut f = TelnetFilter::new();
        let (d, r) = run(&mut f, &[b'a', IAC, SB, 24, b'x', b'y', IAC, SE, b'b']);
        assert_eq!(d, vec![b'a', b'b']);
        assert!(r.is_empty());
    }

    #[test]
    fn escaped_iac_inside_subneg_does_not_terminate() {
        let mut f = TelnetFilter::new();
        let (d, _) = run(&mut f, &[IAC, SB, 24, IAC, IAC, b'q', IAC, SE, b'k']);
        assert_eq!(d, vec![b'k']);
    }
}
