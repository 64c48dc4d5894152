//! Configuration
//!
//! Command line arguments (clap) and their validated form, `WatcherConfig`.

use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;

use crate::authorization::DEFAULT_MASTER_ACCOUNT;
use crate::filter::OperationFilter;
use crate::relay::OutputMode;
use crate::sink::DEFAULT_REDIS_CHANNEL;

/// Public Hive API node
pub const DEFAULT_NODE: &str = "https://api.hive.blog";

/// Hive testnet API node
pub const TEST_NODE: &str = "https://testnet.openhive.network";

/// Format accepted by `--start-date`
pub const START_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default ZMQ host when only a port is given
const DEFAULT_ZMQ_HOST: &str = "127.0.0.1";

const ABOUT: &str = "Watch the Hive blockchain for podping notifications of new podcast episodes.

Runs until terminated, logging every feed URL announced by an authorized podping
server, with a summary line every report interval listing the number of podpings
and of other custom_json operations seen on the chain.";

/// Errors found while validating the command line
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Invalid start date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },
}

/// What to do with an authorized ping whose payload does not decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DecodePolicy {
    /// Log the bad payload and carry on with the next operation
    #[default]
    Skip,
    /// Abort the session; the supervisor restarts it
    Restart,
}

/// Where a session restarted after a fault picks up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ResumePolicy {
    /// Go straight to live at the chain head
    #[default]
    Tip,
    /// Replay from the block after the last processed operation
    Checkpoint,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "hivewatcher", version, about = ABOUT)]
pub struct Args {
    #[arg(short = 'b', long, help = "Hive block number to start replay at")]
    pub block: Option<u64>,

    #[arg(
        short = 'o',
        long,
        default_value_t = 0,
        help = "Time in HOURS to look back up the chain for old pings"
    )]
    pub old: u64,

    #[arg(
        short = 'a',
        long,
        default_value_t = 0,
        help = "Time in HOURS to replay for from the start point"
    )]
    pub stop_after: u64,

    #[arg(short = 'y', long, help = "<%Y-%m-%d %H:%M:%S> UTC date/time to start the history")]
    pub start_date: Option<String>,

    #[arg(short = 'H', long, help = "Report history only and exit")]
    pub history_only: bool,

    #[arg(short = 'd', long, help = "Show diagnostic posts written to the blockchain")]
    pub diagnostic: bool,

    #[arg(short = 'u', long, help = "Just output the urls on a single line, nothing else")]
    pub urls_only: bool,

    #[arg(
        short = 'r',
        long,
        default_value_t = 5,
        help = "Time in MINUTES between periodic status reports, 0 for none"
    )]
    pub reports: u64,

    #[arg(
        short = 's',
        long,
        conflicts_with = "zmq",
        help = "<IP-Address>:<port> socket to send each new url to"
    )]
    pub socket: Option<String>,

    #[arg(short = 'z', long, help = "[<IP-Address>:]<port> for ZMQ to send each new url to")]
    pub zmq: Option<String>,

    #[arg(long, help = "Redis URL to publish each new url on")]
    pub redis: Option<String>,

    #[arg(long, default_value = DEFAULT_REDIS_CHANNEL, help = "Redis channel for --redis")]
    pub redis_channel: String,

    #[arg(
        short = 't',
        long,
        env = "USE_TEST_NODE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new(),
        help = "Use a test net API"
    )]
    pub test: bool,

    #[arg(short = 'l', long, help = "Watch the live chain for the podping-livetest ids")]
    pub livetest: bool,

    #[arg(short = 'q', long, conflicts_with = "verbose", help = "Minimal output")]
    pub quiet: bool,

    #[arg(short = 'v', long, help = "Lots of output")]
    pub verbose: bool,

    #[arg(long, help = "Hive API node URL (overrides --test)")]
    pub node: Option<String>,

    #[arg(
        long,
        default_value = DEFAULT_MASTER_ACCOUNT,
        help = "Account whose follows may post podpings"
    )]
    pub master: String,

    #[arg(
        long,
        value_enum,
        default_value_t = DecodePolicy::Skip,
        help = "Handling of undecodable pings"
    )]
    pub decode_errors: DecodePolicy,

    #[arg(
        long,
        value_enum,
        default_value_t = ResumePolicy::Tip,
        help = "Where to resume after a fault"
    )]
    pub resume: ResumePolicy,
}

/// Where a history scan starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStart {
    Block(u64),
    Since(DateTime<Utc>),
}

/// Requested catch-up before going live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    pub start: HistoryStart,
    /// Replay length from the start point; unbounded when `None`
    pub stop_after: Option<Duration>,
}

/// Forwarding destinations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkTargets {
    pub socket: Option<SocketAddr>,
    /// `tcp://host:port`
    pub zmq: Option<String>,
    /// Redis URL and channel
    pub redis: Option<(String, String)>,
}

/// Validated watcher settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub node_url: String,
    pub test_node: bool,
    pub filter: OperationFilter,
    pub master_account: String,
    /// `None` disables periodic reports
    pub report_interval: Option<Duration>,
    pub output: OutputMode,
    pub diagnostic: bool,
    pub history: Option<HistoryRequest>,
    pub history_only: bool,
    pub decode_policy: DecodePolicy,
    pub resume_policy: ResumePolicy,
    pub sinks: SinkTargets,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            node_url: DEFAULT_NODE.to_string(),
            test_node: false,
            filter: OperationFilter::default(),
            master_account: DEFAULT_MASTER_ACCOUNT.to_string(),
            report_interval: Some(Duration::minutes(5)),
            output: OutputMode::default(),
            diagnostic: false,
            history: None,
            history_only: false,
            decode_policy: DecodePolicy::default(),
            resume_policy: ResumePolicy::default(),
            sinks: SinkTargets::default(),
        }
    }
}

impl WatcherConfig {
    /// Validate parsed arguments
    ///
    /// # Arguments
    /// * `args` - Parsed command line
    /// * `now` - Current time, anchor for `--old`
    pub fn from_args(args: &Args, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let history = history_request(args, now)?;
        if args.history_only && history.is_none() {
            return Err(ConfigError::InvalidValue(
                "--history-only needs --block, --old or --start-date".to_string(),
            ));
        }

        let report_interval = if args.reports == 0 || args.urls_only {
            None
        } else {
            Some(duration_arg("--reports", args.reports, Duration::try_minutes)?)
        };

        let node_url = match (&args.node, args.test) {
            (Some(node), _) => node.clone(),
            (None, true) => TEST_NODE.to_string(),
            (None, false) => DEFAULT_NODE.to_string(),
        };

        let sinks = SinkTargets {
            socket: args.socket.as_deref().map(parse_socket_addr).transpose()?,
            zmq: args.zmq.as_deref().map(parse_zmq_endpoint).transpose()?,
            redis: args.redis.clone().map(|url| (url, args.redis_channel.clone())),
        };

        Ok(Self {
            node_url,
            test_node: args.test,
            filter: if args.livetest {
                OperationFilter::livetest()
            } else {
                OperationFilter::default()
            },
            master_account: args.master.clone(),
            report_interval,
            output: OutputMode {
                quiet: args.quiet,
                urls_only: args.urls_only,
            },
            diagnostic: args.diagnostic,
            history,
            history_only: args.history_only,
            decode_policy: args.decode_errors,
            resume_policy: args.resume,
            sinks,
        })
    }

    pub fn reports_enabled(&self) -> bool {
        self.report_interval.is_some()
    }
}

fn history_request(
    args: &Args,
    now: DateTime<Utc>,
) -> Result<Option<HistoryRequest>, ConfigError> {
    let start = if let Some(block) = args.block {
        HistoryStart::Block(block)
    } else if let Some(date) = &args.start_date {
        HistoryStart::Since(parse_start_date(date)?)
    } else if args.old > 0 {
        let back = duration_arg("--old", args.old, Duration::try_hours)?;
        let since = now.checked_sub_signed(back).ok_or_else(|| {
            ConfigError::InvalidValue(format!("--old {} reaches before any date", args.old))
        })?;
        HistoryStart::Since(since)
    } else {
        return Ok(None);
    };

    let stop_after = if args.stop_after > 0 {
        Some(duration_arg("--stop-after", args.stop_after, Duration::try_hours)?)
    } else {
        None
    };
    Ok(Some(HistoryRequest { start, stop_after }))
}

/// Convert a count of minutes or hours from the command line
fn duration_arg(
    flag: &str,
    value: u64,
    unit: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError> {
    i64::try_from(value)
        .ok()
        .and_then(unit)
        .ok_or_else(|| ConfigError::InvalidValue(format!("{} {} is out of range", flag, value)))
}

/// Parse a `--start-date` value as UTC
pub fn parse_start_date(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    NaiveDateTime::parse_from_str(value, START_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ConfigError::InvalidDate {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse `<ip>:<port>` (IPv6 as `[ip]:port`)
pub fn parse_socket_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue(format!("socket must be <IP-Address>:<port>, got '{}'", value))
    })
}

/// Parse `[<ip>:]<port>` into a `tcp://` endpoint, defaulting to localhost
pub fn parse_zmq_endpoint(value: &str) -> Result<String, ConfigError> {
    let (host, port) = match value.rsplit_once(':') {
        Some((host, port)) => (host.trim_start_matches('[').trim_end_matches(']'), port),
        None => (DEFAULT_ZMQ_HOST, value),
    };

    let ip: IpAddr = host
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("invalid ZMQ address '{}'", host)))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("invalid ZMQ port '{}'", port)))?;

    Ok(match ip {
        IpAddr::V4(v4) => format!("tcp://{}:{}", v4, port),
        IpAddr::V6(v6) => format!("tcp://[{}]:{}", v6, port),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["hivewatcher"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    fn config(argv: &[&str]) -> Result<WatcherConfig, ConfigError> {
        WatcherConfig::from_args(&parse(argv), now())
    }

    // ==================== defaults ====================

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.node_url, DEFAULT_NODE);
        assert_eq!(cfg.master_account, "podping");
        assert_eq!(cfg.report_interval, Some(Duration::minutes(5)));
        assert!(cfg.history.is_none());
        assert!(cfg.filter.is_watched("pp_video_update"));
        assert_eq!(cfg.decode_policy, DecodePolicy::Skip);
        assert_eq!(cfg.resume_policy, ResumePolicy::Tip);
        assert_eq!(cfg.sinks, SinkTargets::default());
    }

    // ==================== reports ====================

    #[test]
    fn test_reports_zero_disables() {
        let cfg = config(&["-r", "0"]).unwrap();
        assert!(!cfg.reports_enabled());
    }

    #[test]
    fn test_urls_only_disables_reports() {
        let cfg = config(&["--urls-only", "-r", "15"]).unwrap();
        assert!(cfg.report_interval.is_none());
        assert!(cfg.output.urls_only);
    }

    #[test]
    fn test_reports_interval_minutes() {
        let cfg = config(&["--reports", "15"]).unwrap();
        assert_eq!(cfg.report_interval, Some(Duration::minutes(15)));
    }

    // ==================== history ====================

    #[test]
    fn test_reports_out_of_range() {
        let err = config(&["-r", "99999999999999999"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_block_starts_history() {
        let cfg = config(&["-b", "53691004", "-a", "2"]).unwrap();
        let history = cfg.history.unwrap();
        assert_eq!(history.start, HistoryStart::Block(53_691_004));
        assert_eq!(history.stop_after, Some(Duration::hours(2)));
    }

    #[test]
    fn test_old_hours_counts_back_from_now() {
        let cfg = config(&["--old", "3"]).unwrap();
        let history = cfg.history.unwrap();
        assert_eq!(history.start, HistoryStart::Since(now() - Duration::hours(3)));
        assert_eq!(history.stop_after, None);
    }

    #[test]
    fn test_start_date_is_utc() {
        let cfg = config(&["-y", "2021-05-07 20:58:33"]).unwrap();
        assert_eq!(
            cfg.history.unwrap().start,
            HistoryStart::Since(Utc.with_ymd_and_hms(2021, 5, 7, 20, 58, 33).unwrap())
        );
    }

    #[test]
    fn test_block_wins_over_old() {
        let cfg = config(&["-b", "10", "-o", "5"]).unwrap();
        assert_eq!(cfg.history.unwrap().start, HistoryStart::Block(10));
    }

    #[test]
    fn test_old_out_of_range() {
        // Too many hours for a Duration
        let err = config(&["-o", "99999999999999999"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        // Representable, but before the earliest date
        let err = config(&["-o", "10000000000"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_stop_after_out_of_range() {
        let err = config(&["-b", "1", "-a", "99999999999999999"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_bad_start_date() {
        let err = config(&["-y", "yesterday"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDate { .. }));
    }

    #[test]
    fn test_history_only_requires_history() {
        assert!(config(&["--history-only"]).is_err());
        assert!(config(&["--history-only", "-o", "1"]).unwrap().history_only);
    }

    // ==================== node selection ====================

    #[test]
    fn test_test_flag_selects_test_node() {
        let cfg = config(&["-t"]).unwrap();
        assert_eq!(cfg.node_url, TEST_NODE);
        assert!(cfg.test_node);
    }

    #[test]
    fn test_explicit_node_wins() {
        let cfg = config(&["-t", "--node", "https://hive.example"]).unwrap();
        assert_eq!(cfg.node_url, "https://hive.example");
    }

    #[test]
    fn test_livetest_switches_filter() {
        let cfg = config(&["--livetest"]).unwrap();
        assert!(cfg.filter.is_watched("podping-livetest"));
        assert!(!cfg.filter.is_watched("pp_video_update"));
    }

    // ==================== sinks ====================

    #[test]
    fn test_socket_parses() {
        let cfg = config(&["-s", "127.0.0.1:9999"]).unwrap();
        assert_eq!(cfg.sinks.socket, Some("127.0.0.1:9999".parse().unwrap()));
    }

    #[test]
    fn test_socket_rejects_missing_port() {
        assert!(config(&["-s", "127.0.0.1"]).is_err());
    }

    #[test]
    fn test_socket_and_zmq_conflict() {
        let result = Args::try_parse_from(["hivewatcher", "-s", "127.0.0.1:1", "-z", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        assert!(Args::try_parse_from(["hivewatcher", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_zmq_port_only_defaults_to_localhost() {
        assert_eq!(parse_zmq_endpoint("5555").unwrap(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn test_zmq_with_host() {
        assert_eq!(parse_zmq_endpoint("10.0.0.2:5555").unwrap(), "tcp://10.0.0.2:5555");
        assert_eq!(parse_zmq_endpoint("[::1]:5555").unwrap(), "tcp://[::1]:5555");
    }

    #[test]
    fn test_zmq_rejects_garbage() {
        assert!(parse_zmq_endpoint("nothost:5555").is_err());
        assert!(parse_zmq_endpoint("70000").is_err());
    }

    #[test]
    fn test_redis_uses_channel() {
        let argv = ["--redis", "redis://127.0.0.1:6379", "--redis-channel", "pings"];
        let cfg = config(&argv).unwrap();
        assert_eq!(
            cfg.sinks.redis,
            Some(("redis://127.0.0.1:6379".to_string(), "pings".to_string()))
        );
    }

    // ==================== policies ====================

    #[test]
    fn test_policies_parse() {
        let cfg = config(&["--decode-errors", "restart", "--resume", "checkpoint"]).unwrap();
        assert_eq!(cfg.decode_policy, DecodePolicy::Restart);
        assert_eq!(cfg.resume_policy, ResumePolicy::Checkpoint);
    }
}
