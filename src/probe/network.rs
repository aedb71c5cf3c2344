//! Network diagnostics: ping, traceroute and TLS certificate.
//!
//! The three sub-checks run concurrently and independently. The probe
//! succeeds when at least one of them produced data; the others are
//! reported in [`NetworkReport::errors`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use super::process::run_command;
use super::retry::{RetryPolicy, retry};
use super::{Probe, ProbeError};
use crate::domain::{
    CertificateInfo, NetworkReport, PingStats, ProbeKind, ProbePayload, TraceHop, TrackedUrl,
};

/// Echo requests sent per ping check.
pub const PING_COUNT: usize = 6;

/// Runs `ping`, `traceroute` and `openssl` against the URL's host.
#[derive(Debug, Clone)]
pub struct NetworkProbe {
    policy: RetryPolicy,
    command_timeout: Duration,
}

impl NetworkProbe {
    /// Creates a probe whose individual commands are bounded by
    /// `command_timeout`.
    #[must_use]
    pub const fn new(policy: RetryPolicy, command_timeout: Duration) -> Self {
        Self {
            policy,
            command_timeout,
        }
    }

    async fn ping(&self, host: &str) -> Result<PingStats, ProbeError> {
        let args = &vec![
            "-n".to_string(),
            "-c".to_string(),
            PING_COUNT.to_string(),
            "-W".to_string(),
            "1".to_string(),
            host.to_string(),
        ];
        let timeout = self.command_timeout;
        let output = retry(self.policy, "ping", || async move {
            let out = run_command("ping", args, None, timeout).await?;
            // Exit code 1 means no reply, which is a valid measurement.
            if out.code == Some(1) {
                Ok(out)
            } else {
                out.check("ping")
            }
        })
        .await?;
        parse_ping(host, &output.stdout)
    }

    async fn traceroute(&self, host: &str) -> Result<Vec<TraceHop>, ProbeError> {
        let args = &vec![
            "-n".to_string(),
            "-q".to_string(),
            "1".to_string(),
            "-w".to_string(),
            "2".to_string(),
            host.to_string(),
        ];
        let timeout = self.command_timeout;
        let output = retry(self.policy, "traceroute", || async move {
            run_command("traceroute", args, None, timeout)
                .await?
                .check("traceroute")
        })
        .await?;
        let hops = parse_traceroute(&output.stdout)?;
        if hops.is_empty() {
            return Err(ProbeError::Parse("traceroute printed no hops".to_string()));
        }
        Ok(hops)
    }

    async fn certificate(&self, host: &str, port: u16) -> Result<CertificateInfo, ProbeError> {
        let client_args = &vec![
            "s_client".to_string(),
            "-connect".to_string(),
            format!("{host}:{port}"),
            "-servername".to_string(),
            host.to_string(),
        ];
        let x509_args = &vec![
            "x509".to_string(),
            "-noout".to_string(),
            "-text".to_string(),
        ];
        let timeout = self.command_timeout;

        let text = retry(self.policy, "openssl", || async move {
            let handshake = run_command("openssl", client_args, None, timeout)
                .await?
                .check("openssl")?;
            let decoded = run_command(
                "openssl",
                x509_args,
                Some(handshake.stdout.as_bytes()),
                timeout,
            )
            .await?
            .check("openssl")?;
            Ok(decoded.stdout)
        })
        .await?;

        parse_certificate(&text, Utc::now())
    }
}

#[async_trait]
impl Probe for NetworkProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Network
    }

    async fn run(&self, url: &TrackedUrl) -> Result<ProbePayload, ProbeError> {
        let host = url
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| ProbeError::Parse(format!("{url} has no host")))?;

        let (ping, trace, cert) = tokio::join!(
            self.ping(&host),
            self.traceroute(&host),
            self.certificate(&host, url.tls_port()),
        );

        let mut report = NetworkReport::default();
        match ping {
            Ok(stats) => report.ping = Some(stats),
            Err(e) => report.errors.push(format!("ping: {e}")),
        }
        match trace {
            Ok(hops) => report.traceroute = Some(hops),
            Err(e) => report.errors.push(format!("traceroute: {e}")),
        }
        match cert {
            Ok(info) => report.certificate = Some(info),
            Err(e) => report.errors.push(format!("certificate: {e}")),
        }

        if report.ping.is_none() && report.traceroute.is_none() && report.certificate.is_none() {
            return Err(ProbeError::Rejected(report.errors.join("; ")));
        }
        if !report.errors.is_empty() {
            tracing::warn!(url = %url, errors = ?report.errors, "partial network diagnostics");
        }
        Ok(ProbePayload::Network(report))
    }
}

fn compile(pattern: &str) -> Result<Regex, ProbeError> {
    Regex::new(pattern).map_err(|e| ProbeError::Parse(format!("pattern {pattern}: {e}")))
}

/// Builds ping statistics from `ping` output. No replies yields
/// `alive = false` and 100 % loss.
///
/// # Errors
///
/// Returns [`ProbeError::Parse`] only if the internal pattern is invalid.
pub fn parse_ping(host: &str, output: &str) -> Result<PingStats, ProbeError> {
    let reply = compile(r"time[=<]([\d.]+)\s*ms")?;
    let samples: Vec<f64> = reply
        .captures_iter(output)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .take(PING_COUNT)
        .collect();

    let received = samples.len();
    let lost = PING_COUNT.saturating_sub(received);
    let packet_loss_pct = (lost as f64 / PING_COUNT as f64) * 100.0;

    let min = samples.iter().copied().reduce(f64::min);
    let max = samples.iter().copied().reduce(f64::max);
    let avg = (received > 0).then(|| samples.iter().sum::<f64>() / received as f64);

    Ok(PingStats {
        host: host.to_string(),
        alive: received > 0,
        samples,
        min,
        max,
        avg,
        packet_loss_pct,
    })
}

/// Parses `traceroute -n -q 1` output into hops. Timed-out hops are kept
/// with no address and no latency.
///
/// # Errors
///
/// Returns [`ProbeError::Parse`] only if the internal pattern is invalid.
pub fn parse_traceroute(output: &str) -> Result<Vec<TraceHop>, ProbeError> {
    let answered = compile(r"^\s*(\d+)\s+([0-9A-Fa-f.:]+)\s+([\d.]+)\s*ms")?;
    let silent = compile(r"^\s*(\d+)\s+\*")?;

    let mut hops = Vec::new();
    for line in output.lines() {
        if let Some(c) = answered.captures(line) {
            let Some(hop) = c.get(1).and_then(|m| m.as_str().parse().ok()) else {
                continue;
            };
            hops.push(TraceHop {
                hop,
                address: c.get(2).map(|m| m.as_str().to_string()),
                latency_ms: c.get(3).and_then(|m| m.as_str().parse().ok()),
            });
        } else if let Some(c) = silent.captures(line)
            && let Some(hop) = c.get(1).and_then(|m| m.as_str().parse().ok())
        {
            hops.push(TraceHop {
                hop,
                address: None,
                latency_ms: None,
            });
        }
    }
    Ok(hops)
}

/// Parses `openssl x509 -noout -text` output.
///
/// # Errors
///
/// Returns [`ProbeError::Parse`] if no certificate fields are present.
pub fn parse_certificate(text: &str, now: DateTime<Utc>) -> Result<CertificateInfo, ProbeError> {
    let field = |pattern: &str| -> Result<Option<String>, ProbeError> {
        Ok(compile(pattern)?
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty()))
    };

    let not_after = field(r"Not After\s*:\s*(.+)")?.and_then(|raw| parse_openssl_time(&raw));
    let days_remaining = not_after.map(|expiry| {
        let secs = (expiry - now).num_seconds().max(0);
        (secs + 86_399) / 86_400
    });

    let info = CertificateInfo {
        version: field(r"Version:\s*(.+)")?,
        serial_number: field(r"Serial Number:\s*(.+)")?,
        signature_algorithm: field(r"Signature Algorithm:\s*(.+)")?,
        issuer: field(r"Issuer:\s*(.+)")?,
        subject: field(r"Subject:\s*(.+)")?,
        public_key_algorithm: field(r"Public Key Algorithm:\s*(.+)")?,
        key_bits: field(r"Public-Key:\s*\((\d+) bit\)")?.and_then(|b| b.parse().ok()),
        not_after,
        days_remaining,
    };

    if info.subject.is_none() && info.issuer.is_none() && info.not_after.is_none() {
        return Err(ProbeError::Parse("no certificate in openssl output".to_string()));
    }
    Ok(info)
}

fn parse_openssl_time(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%b %d %H:%M:%S %Y GMT")
        .ok()
        .map(|naive| naive.and_utc())
}
