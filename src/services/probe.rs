use crate::models::config::Thresholds;
use crate::models::host::Host;
use crate::models::metrics::Reading;
use crate::utils::clock::Clock;
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Slack on top of the probe timeout for process start-up before the child is killed.
const SPAWN_GRACE: Duration = Duration::from_millis(500);

/// Round-trip probe for a single address.
///
/// `None` covers every failure: launch error, non-zero exit, timeout and
/// output without a recognisable time token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, address: &str, timeout: Duration) -> Option<f64>;
}

/// Shells out to the system `ping`.
#[derive(Debug, Clone)]
pub struct SystemPinger {
    program: String,
}

impl SystemPinger {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemPinger {
    fn default() -> Self {
        Self::new("ping")
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, address: &str, timeout: Duration) -> Option<f64> {
        if address.is_empty() || address.starts_with('-') {
            warn!("Refusing to ping suspicious address {:?}", address);
            return None;
        }

        let mut command = Command::new(&self.program);
        command
            .args(ping_args(address, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout + SPAWN_GRACE, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("Failed to launch {} for {}: {}", self.program, address, e);
                return None;
            }
            Err(_) => {
                debug!("Ping to {} timed out after {:?}", address, timeout);
                return None;
            }
        };

        if !output.status.success() {
            debug!("Ping to {} exited with {}", address, output.status);
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let latency = parse_ping_time(&stdout);
        if latency.is_none() {
            debug!("No round-trip time in ping output for {}", address);
        }
        latency
    }
}

fn ping_args(address: &str, timeout: Duration) -> Vec<String> {
    let timeout_ms = timeout.as_millis().max(1);

    if cfg!(target_os = "windows") {
        vec![
            "-n".into(),
            "1".into(),
            "-w".into(),
            timeout_ms.to_string(),
            address.into(),
        ]
    } else if cfg!(target_os = "macos") {
        // BSD ping takes -W in milliseconds
        vec![
            "-c".into(),
            "1".into(),
            "-W".into(),
            timeout_ms.to_string(),
            address.into(),
        ]
    } else {
        // iputils ping takes -W in whole seconds
        let timeout_secs = ((timeout_ms + 999) / 1000).max(1);
        vec![
            "-c".into(),
            "1".into(),
            "-W".into(),
            timeout_secs.to_string(),
            address.into(),
        ]
    }
}

fn ping_time_regex() -> Option<&'static Regex> {
    static PING_TIME: OnceLock<Option<Regex>> = OnceLock::new();
    PING_TIME
        .get_or_init(|| Regex::new(r"(?i)time[=<](\d+\.?\d*)\s*ms").ok())
        .as_ref()
}

/// Extracts the round-trip time from `time=12.3 ms` / `time<1ms` style output.
pub fn parse_ping_time(output: &str) -> Option<f64> {
    let captures = ping_time_regex()?.captures(output)?;
    captures.get(1)?.as_str().parse::<f64>().ok()
}

/// Probes every enabled host concurrently, one [`Reading`] per enabled host.
///
/// Each probe returns its reading by value; the call resolves once every
/// probe has finished or hit its own timeout.
pub async fn probe_many(
    pinger: &dyn Pinger,
    hosts: &[Host],
    timeout: Duration,
    thresholds: &Thresholds,
    clock: &dyn Clock,
) -> Vec<Reading> {
    let probes = hosts.iter().filter(|host| host.is_enabled).map(|host| async move {
        let latency = pinger.ping(&host.address, timeout).await;
        Reading::new(host, latency, thresholds, clock.now())
    });

    join_all(probes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metrics::LatencyStatus;
    use crate::utils::clock::SystemClock;
    use mockall::predicate::eq;

    #[test]
    fn parses_common_ping_formats() {
        let macos = "PING 8.8.8.8 (8.8.8.8): 56 data bytes\n64 bytes from 8.8.8.8: icmp_seq=0 ttl=117 time=12.345 ms\n";
        let linux = "64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=9.87 ms";
        let windows = "Reply from 192.168.1.1: bytes=32 time<1ms TTL=64";
        let upper = "Reply from 10.0.0.1: bytes=32 TIME=42ms TTL=64";
        let integer = "64 bytes from 10.0.0.1: icmp_seq=0 ttl=64 time=7 ms";

        assert_eq!(parse_ping_time(macos), Some(12.345));
        assert_eq!(parse_ping_time(linux), Some(9.87));
        assert_eq!(parse_ping_time(windows), Some(1.0));
        assert_eq!(parse_ping_time(upper), Some(42.0));
        assert_eq!(parse_ping_time(integer), Some(7.0));
    }

    #[test]
    fn output_without_time_token_is_a_miss() {
        assert_eq!(parse_ping_time(""), None);
        assert_eq!(parse_ping_time("Request timeout for icmp_seq 0"), None);
        assert_eq!(
            parse_ping_time("1 packets transmitted, 1 packets received, 0.0% packet loss"),
            None
        );
        assert_eq!(parse_ping_time("time=abc ms"), None);
    }

    #[test]
    fn ping_args_end_with_address() {
        let args = ping_args("example.com", Duration::from_millis(2000));
        assert_eq!(args.last().map(String::as_str), Some("example.com"));
        assert!(args.len() >= 5);
    }

    #[tokio::test]
    async fn probe_many_skips_disabled_hosts() {
        let up = Host::new("10.0.0.1", "Up", true);
        let down = Host::new("10.0.0.2", "Down", true);
        let mut disabled = Host::new("10.0.0.3", "Disabled", true);
        disabled.is_enabled = false;

        let mut pinger = MockPinger::new();
        pinger
            .expect_ping()
            .with(eq("10.0.0.1"), eq(Duration::from_secs(2)))
            .times(1)
            .returning(|_, _| Some(30.0));
        pinger
            .expect_ping()
            .with(eq("10.0.0.2"), eq(Duration::from_secs(2)))
            .times(1)
            .returning(|_, _| None);

        let readings = probe_many(
            &pinger,
            &[up.clone(), down.clone(), disabled],
            Duration::from_secs(2),
            &Thresholds::default(),
            &SystemClock,
        )
        .await;

        assert_eq!(readings.len(), 2);
        let up_reading = readings.iter().find(|r| r.host_id == up.id()).unwrap();
        let down_reading = readings.iter().find(|r| r.host_id == down.id()).unwrap();
        assert_eq!(up_reading.status, LatencyStatus::Excellent);
        assert_eq!(down_reading.status, LatencyStatus::Offline);
        assert_eq!(down_reading.latency_ms, None);
    }

    struct SlowPinger {
        delay: Duration,
    }

    #[async_trait]
    impl Pinger for SlowPinger {
        async fn ping(&self, _address: &str, _timeout: Duration) -> Option<f64> {
            tokio::time::sleep(self.delay).await;
            Some(self.delay.as_millis() as f64)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probes_run_concurrently() {
        let hosts: Vec<Host> = (1..=5)
            .map(|i| Host::new(format!("10.0.0.{i}"), format!("Host {i}"), true))
            .collect();
        let pinger = SlowPinger {
            delay: Duration::from_secs(1),
        };

        let start = tokio::time::Instant::now();
        let readings = probe_many(
            &pinger,
            &hosts,
            Duration::from_secs(2),
            &Thresholds::default(),
            &SystemClock,
        )
        .await;

        assert_eq!(readings.len(), 5);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn missing_program_yields_no_reading() {
        let pinger = SystemPinger::new("definitely-not-a-ping-binary");
        assert_eq!(pinger.ping("127.0.0.1", Duration::from_millis(200)).await, None);
    }

    #[tokio::test]
    async fn option_like_address_is_refused() {
        let pinger = SystemPinger::default();
        assert_eq!(pinger.ping("-f", Duration::from_millis(200)).await, None);
    }

    #[cfg(unix)]
    fn fake_ping(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-ping");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_pinger_reads_fake_ping_output() {
        let dir = tempfile::tempdir().unwrap();
        let ok = SystemPinger::new(fake_ping(
            &dir,
            "echo '64 bytes from 10.0.0.1: icmp_seq=0 ttl=64 time=3.21 ms'",
        ));
        assert_eq!(ok.ping("10.0.0.1", Duration::from_secs(1)).await, Some(3.21));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let failing = SystemPinger::new(fake_ping(
            &dir,
            "echo 'time=3.21 ms'\nexit 2",
        ));
        assert_eq!(failing.ping("10.0.0.1", Duration::from_secs(1)).await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_ping_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let hung = SystemPinger::new(fake_ping(&dir, "sleep 10"));

        let start = std::time::Instant::now();
        assert_eq!(hung.ping("10.0.0.1", Duration::from_millis(100)).await, None);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
