use pnet::packet::ipv4::Ipv4Packet;
use std::fmt;
use std::io::{self, Write};

use crate::config::Config;
use crate::export::json::export_json;
use crate::probe::correlate::{IcmpKind, ParsedReply, locate_icmp_header};
use crate::probe::icmp::ICMP_HEADER_SIZE;
use crate::state::{Summary, Target};

/// Microseconds rendered as milliseconds with three decimals (`12.345`)
#[derive(Debug, Clone, Copy)]
pub struct Millis(pub i64);

impl Millis {
    pub fn from_f64(us: f64) -> Self {
        Millis(us.round() as i64)
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:03}", sign, abs / 1000, abs % 1000)
    }
}

/// How the final statistics are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryFormat {
    #[default]
    Text,
    Json,
}

/// Line-oriented output of a ping run
pub struct Reporter<W: Write> {
    out: W,
    quiet: bool,
    verbose: bool,
    flood: bool,
    format: SummaryFormat,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, config: &Config, format: SummaryFormat) -> Self {
        Self {
            out,
            quiet: config.quiet,
            verbose: config.verbose,
            flood: config.flood,
            format,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// `PING host (ip): N data bytes`
    pub fn print_start(
        &mut self,
        target: &Target,
        payload_size: usize,
        identifier: u16,
    ) -> io::Result<()> {
        write!(
            self.out,
            "PING {} ({}): {} data bytes",
            target.original, target.resolved, payload_size
        )?;
        if self.verbose {
            write!(self.out, ", id 0x{:04x} = {}", identifier, identifier)?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Flood progress: one dot per request
    pub fn print_sent(&mut self) -> io::Result<()> {
        if self.flood && !self.quiet {
            self.out.write_all(b".")?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Echo reply line, or a backspace in flood mode
    pub fn print_echo(
        &mut self,
        reply: &ParsedReply,
        rtt_us: Option<i64>,
        duplicate: bool,
    ) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        if self.flood {
            self.out.write_all(b"\x08")?;
            return self.out.flush();
        }

        write!(
            self.out,
            "{} bytes from {}: icmp_seq={} ttl={}",
            reply.icmp_len, reply.source, reply.sequence, reply.ttl
        )?;
        if let Some(rtt) = rtt_us {
            write!(self.out, " time={} ms", Millis(rtt))?;
        }
        if duplicate {
            write!(self.out, " (DUP!)")?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    /// ICMP error line, followed by a dump of the quoted datagram when verbose
    pub fn print_icmp_error(&mut self, reply: &ParsedReply, original: &[u8]) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(
            self.out,
            "{} bytes from {}: {}",
            reply.icmp_len,
            reply.source,
            describe_icmp_error(reply.kind)
        )?;
        if self.verbose {
            self.out.write_all(format_packet_dump(original).as_bytes())?;
        }
        self.out.flush()
    }

    pub fn print_timeout(&mut self, sequence: u16) -> io::Result<()> {
        if self.quiet || self.flood {
            return Ok(());
        }
        writeln!(self.out, "Request timeout for icmp_seq={}", sequence)?;
        self.out.flush()
    }

    pub fn print_summary(&mut self, summary: &Summary) -> anyhow::Result<()> {
        if self.format == SummaryFormat::Json {
            if self.flood {
                writeln!(self.out)?;
            }
            return export_json(summary, &mut self.out);
        }

        writeln!(self.out)?;
        writeln!(self.out, "--- {} ping statistics ---", summary.target)?;
        write!(
            self.out,
            "{} packets transmitted, {} packets received, ",
            summary.transmitted, summary.received
        )?;
        if summary.duplicates > 0 {
            write!(self.out, "+{} duplicates, ", summary.duplicates)?;
        }
        writeln!(self.out, "{:.1}% packet loss", summary.loss_pct)?;

        if let Some(rtt) = summary.rtt {
            writeln!(
                self.out,
                "round-trip min/avg/max/stddev = {}/{}/{}/{} ms",
                Millis(rtt.min_us),
                Millis::from_f64(rtt.avg_us),
                Millis(rtt.max_us),
                Millis::from_f64(rtt.stddev_us)
            )?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Human readable text for an ICMP error type/code
pub fn describe_icmp_error(kind: IcmpKind) -> &'static str {
    match kind {
        IcmpKind::EchoReply => "Echo Reply",
        IcmpKind::DestUnreachable(code) => match code {
            0 => "Destination Net Unreachable",
            1 => "Destination Host Unreachable",
            2 => "Destination Protocol Unreachable",
            3 => "Destination Port Unreachable",
            4 => "Fragmentation needed and DF set",
            5 => "Source Route Failed",
            6 => "Network Unknown",
            7 => "Host Unknown",
            8 => "Host Isolated",
            9 => "Destination Network Administratively Prohibited",
            10 => "Destination Host Administratively Prohibited",
            11 => "Destination Network Unreachable At This TOS",
            12 => "Destination Host Unreachable At This TOS",
            13 => "Communication Administratively Prohibited",
            14 => "Host Precedence Violation",
            15 => "Precedence Cutoff In Effect",
            _ => "Destination Unreachable",
        },
        IcmpKind::SourceQuench(_) => "Source Quench",
        IcmpKind::Redirect(code) => match code {
            0 => "Redirect Network",
            1 => "Redirect Host",
            2 => "Redirect Type of Service and Network",
            3 => "Redirect Type of Service and Host",
            _ => "Redirect Message",
        },
        IcmpKind::TimeExceeded(code) => match code {
            0 => "Time to live exceeded",
            1 => "Frag reassembly time exceeded",
            _ => "Time Exceeded",
        },
        IcmpKind::ParameterProblem(_) => "Parameter Problem",
    }
}

/// Dump of a datagram quoted by an ICMP error:
///
/// ```text
/// IP Hdr Dump:
///  4500 0054 257f 4000 4001 fdfa 0a00 0132 0a00 01fe
/// Vr HL TOS  Len   ID Flg  off TTL Pro  cks      Src	Dst	Data
///  4  5  00 0054 257f   2 0000  40  01 fdfa 10.0.1.50  10.0.1.254
/// ICMP: type 8, code 0, size 64, id 0x8a0e, seq 0x0001
/// ```
pub fn format_packet_dump(original: &[u8]) -> String {
    let mut out = String::new();

    let header_len = locate_icmp_header(original);
    let dump_len = header_len.unwrap_or(original.len().min(20));

    out.push_str("IP Hdr Dump:\n ");
    for (i, byte) in original.iter().take(dump_len).enumerate() {
        out.push_str(&format!("{:02x}", byte));
        if i % 2 == 1 {
            out.push(' ');
        }
    }
    out.push('\n');

    let (Some(header_len), Some(ip)) = (header_len, Ipv4Packet::new(original)) else {
        return out;
    };

    let tos = (ip.get_dscp() << 2) | ip.get_ecn();
    let total_len = ip.get_total_length();
    out.push_str("Vr HL TOS  Len   ID Flg  off TTL Pro  cks      Src\tDst\tData\n");
    out.push_str(&format!(
        " {:01x}  {:01x}  {:02x} {:04x} {:04x}   {:01x} {:04x}  {:02x}  {:02x} {:04x} {}  {}\n",
        ip.get_version(),
        ip.get_header_length(),
        tos,
        total_len,
        ip.get_identification(),
        ip.get_flags(),
        ip.get_fragment_offset(),
        ip.get_ttl(),
        ip.get_next_level_protocol().0,
        ip.get_checksum(),
        ip.get_source(),
        ip.get_destination()
    ));

    // IP options, if any
    if header_len > 20 {
        for byte in &original[20..header_len] {
            out.push_str(&format!("{:02x}", byte));
        }
        out.push('\n');
    }

    if ip.get_next_level_protocol().0 != 1 {
        return out;
    }
    let Some(icmp) = original.get(header_len..header_len + ICMP_HEADER_SIZE) else {
        return out;
    };

    out.push_str(&format!(
        "ICMP: type {}, code {}, size {}",
        icmp[0],
        icmp[1],
        (total_len as usize).saturating_sub(header_len)
    ));
    if icmp[0] == 8 || icmp[0] == 0 {
        out.push_str(&format!(
            ", id 0x{:04x}, seq 0x{:04x}",
            u16::from_be_bytes([icmp[4], icmp[5]]),
            u16::from_be_bytes([icmp[6], icmp[7]])
        ));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RttSummary;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn reporter(config: &Config) -> Reporter<Vec<u8>> {
        Reporter::new(Vec::new(), config, SummaryFormat::Text)
    }

    fn output(reporter: Reporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    fn reply(kind: IcmpKind) -> ParsedReply {
        ParsedReply {
            source: Ipv4Addr::new(8, 8, 8, 8),
            ttl: 117,
            icmp_len: 64,
            sequence: 3,
            kind,
            sent_at: None,
        }
    }

    fn summary(duplicates: u32, rtt: Option<RttSummary>) -> Summary {
        Summary {
            target: "dns.google".to_string(),
            address: Ipv4Addr::new(8, 8, 8, 8),
            started_at: Utc::now(),
            transmitted: 4,
            received: 3,
            duplicates,
            loss_pct: 25.0,
            rtt,
        }
    }

    #[test]
    fn test_millis_display() {
        assert_eq!(Millis(12_345).to_string(), "12.345");
        assert_eq!(Millis(7).to_string(), "0.007");
        assert_eq!(Millis(0).to_string(), "0.000");
        assert_eq!(Millis(-1_500).to_string(), "-1.500");
        assert_eq!(Millis::from_f64(8164.97).to_string(), "8.165");
    }

    #[test]
    fn test_start_banner() {
        let target = Target::new("localhost".to_string(), Ipv4Addr::LOCALHOST);
        let mut r = reporter(&Config::default());
        r.print_start(&target, 56, 0x1a2b).unwrap();
        assert_eq!(output(r), "PING localhost (127.0.0.1): 56 data bytes\n");

        let config = Config {
            verbose: true,
            ..Config::default()
        };
        let mut r = reporter(&config);
        r.print_start(&target, 56, 0x1a2b).unwrap();
        assert_eq!(
            output(r),
            "PING localhost (127.0.0.1): 56 data bytes, id 0x1a2b = 6699\n"
        );
    }

    #[test]
    fn test_echo_line() {
        let mut r = reporter(&Config::default());
        r.print_echo(&reply(IcmpKind::EchoReply), Some(23_456), false).unwrap();
        r.print_echo(&reply(IcmpKind::EchoReply), Some(40), true).unwrap();
        r.print_echo(&reply(IcmpKind::EchoReply), None, false).unwrap();
        assert_eq!(
            output(r),
            "64 bytes from 8.8.8.8: icmp_seq=3 ttl=117 time=23.456 ms\n\
             64 bytes from 8.8.8.8: icmp_seq=3 ttl=117 time=0.040 ms (DUP!)\n\
             64 bytes from 8.8.8.8: icmp_seq=3 ttl=117\n"
        );
    }

    #[test]
    fn test_quiet_suppresses_per_packet_lines() {
        let config = Config {
            quiet: true,
            ..Config::default()
        };
        let mut r = reporter(&config);
        r.print_echo(&reply(IcmpKind::EchoReply), Some(1), false).unwrap();
        r.print_icmp_error(&reply(IcmpKind::TimeExceeded(0)), &[]).unwrap();
        r.print_timeout(4).unwrap();
        r.print_sent().unwrap();
        assert_eq!(output(r), "");
    }

    #[test]
    fn test_flood_progress() {
        let config = Config {
            flood: true,
            ..Config::default()
        };
        let mut r = reporter(&config);
        r.print_sent().unwrap();
        r.print_sent().unwrap();
        r.print_echo(&reply(IcmpKind::EchoReply), Some(1), false).unwrap();
        r.print_timeout(2).unwrap();
        assert_eq!(output(r), "..\x08");
    }

    #[test]
    fn test_timeout_line() {
        let mut r = reporter(&Config::default());
        r.print_timeout(7).unwrap();
        assert_eq!(output(r), "Request timeout for icmp_seq=7\n");
    }

    #[test]
    fn test_icmp_error_line() {
        let mut r = reporter(&Config::default());
        r.print_icmp_error(&reply(IcmpKind::DestUnreachable(1)), &[]).unwrap();
        assert_eq!(
            output(r),
            "64 bytes from 8.8.8.8: Destination Host Unreachable\n"
        );
    }

    #[test]
    fn test_describe_icmp_error() {
        assert_eq!(
            describe_icmp_error(IcmpKind::DestUnreachable(4)),
            "Fragmentation needed and DF set"
        );
        assert_eq!(
            describe_icmp_error(IcmpKind::DestUnreachable(99)),
            "Destination Unreachable"
        );
        assert_eq!(describe_icmp_error(IcmpKind::Redirect(1)), "Redirect Host");
        assert_eq!(
            describe_icmp_error(IcmpKind::TimeExceeded(0)),
            "Time to live exceeded"
        );
        assert_eq!(
            describe_icmp_error(IcmpKind::TimeExceeded(1)),
            "Frag reassembly time exceeded"
        );
        assert_eq!(describe_icmp_error(IcmpKind::SourceQuench(0)), "Source Quench");
    }

    #[test]
    fn test_summary_text() {
        let rtt = RttSummary {
            min_us: 10_000,
            avg_us: 20_000.0,
            max_us: 30_000,
            stddev_us: 8_164.97,
        };
        let mut r = reporter(&Config::default());
        r.print_summary(&summary(2, Some(rtt))).unwrap();
        assert_eq!(
            output(r),
            "\n--- dns.google ping statistics ---\n\
             4 packets transmitted, 3 packets received, +2 duplicates, 25.0% packet loss\n\
             round-trip min/avg/max/stddev = 10.000/20.000/30.000/8.165 ms\n"
        );
    }

    #[test]
    fn test_summary_without_replies() {
        let mut s = summary(0, None);
        s.received = 0;
        s.loss_pct = 100.0;
        let mut r = reporter(&Config::default());
        r.print_summary(&s).unwrap();
        let text = output(r);
        assert!(text.contains("4 packets transmitted, 0 packets received, 100.0% packet loss\n"));
        assert!(!text.contains("round-trip"));
        assert!(!text.contains("duplicates"));
    }

    #[test]
    fn test_summary_json() {
        let mut r = Reporter::new(Vec::new(), &Config::default(), SummaryFormat::Json);
        r.print_summary(&summary(0, None)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&r.into_inner()).unwrap();
        assert_eq!(value["target"], "dns.google");
        assert_eq!(value["received"], 3);
    }

    #[test]
    fn test_packet_dump() {
        let original = [
            0x45, 0x00, 0x00, 0x54, 0x25, 0x7f, 0x40, 0x00, 0x40, 0x01, 0xfd, 0xfa, 10, 0, 1, 50,
            10, 0, 1, 254, // IP header
            0x08, 0x00, 0x00, 0x00, 0x8a, 0x0e, 0x00, 0x01, // ICMP echo request
        ];
        let dump = format_packet_dump(&original);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "IP Hdr Dump:");
        assert_eq!(lines[1], " 4500 0054 257f 4000 4001 fdfa 0a00 0132 0a00 01fe ");
        assert_eq!(
            lines[2],
            "Vr HL TOS  Len   ID Flg  off TTL Pro  cks      Src\tDst\tData"
        );
        assert_eq!(
            lines[3],
            " 4  5  00 0054 257f   2 0000  40  01 fdfa 10.0.1.50  10.0.1.254"
        );
        assert_eq!(
            lines[4],
            "ICMP: type 8, code 0, size 64, id 0x8a0e, seq 0x0001"
        );
    }

    #[test]
    fn test_packet_dump_with_options() {
        let original = [
            0x46, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 10, 0, 0, 1,
            8, 8, 8, 8, 0x01, 0x01, 0x01, 0x00, // IP header with one option word
            0x08, 0x00, 0x00, 0x00, 0x12, 0x34, 0x00, 0x05,
        ];
        assert_eq!(
            format_packet_dump(&original),
            "IP Hdr Dump:\n \
             4600 0020 0000 0000 0101 0000 0a00 0001 0808 0808 0101 0100 \n\
             Vr HL TOS  Len   ID Flg  off TTL Pro  cks      Src\tDst\tData\n \
             4  6  00 0020 0000   0 0000  01  01 0000 10.0.0.1  8.8.8.8\n\
             01010100\n\
             ICMP: type 8, code 0, size 8, id 0x1234, seq 0x0005\n"
        );
    }

    #[test]
    fn test_packet_dump_truncated() {
        let dump = format_packet_dump(&[0x45, 0x00, 0x00]);
        assert_eq!(dump, "IP Hdr Dump:\n 4500 00\n");
    }

    #[test]
    fn test_verbose_error_includes_dump() {
        let config = Config {
            verbose: true,
            ..Config::default()
        };
        let original = [
            0x45, 0x00, 0x00, 0x1c, 0x00, 0x01, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 10, 0, 0, 1,
            8, 8, 8, 8, 0x08, 0x00, 0x00, 0x00, 0x12, 0x34, 0x00, 0x03,
        ];
        let mut r = reporter(&config);
        r.print_icmp_error(&reply(IcmpKind::TimeExceeded(0)), &original).unwrap();
        let text = output(r);
        assert!(text.starts_with("64 bytes from 8.8.8.8: Time to live exceeded\nIP Hdr Dump:\n"));
        assert!(text.contains("ICMP: type 8, code 0, size 8, id 0x1234, seq 0x0003"));
    }
}
