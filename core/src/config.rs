/*
 * Created on Thu Jun 27 2024
 *
 * This file is a part of Janus
 * Janus is a free and open-source distributed transaction coordinator
 * written by Sayan Nandan ("the Author") with the vision to provide
 * applications with dependable two-phase commit without compromising
 * on durability, recoverability or performance.
 *
 * Copyright (c) 2024, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    crate::{error::RuntimeResult, txn::uid::Uid},
    core::fmt,
    serde::Deserialize,
    std::collections::HashMap,
};

/*
    configuration
*/

#[derive(Debug, PartialEq, Clone)]
/// The final frozen configuration. Sub-services receive this by value at construction time, so
/// there is nothing to reconfigure (and nothing to guard) once the coordinator is running.
pub struct Configuration {
    pub server_id: Box<str>,
    pub journal: JournalKind,
    pub disk: DiskConfiguration,
    pub primary_disk: DiskConfiguration,
    pub secondary_disk: DiskConfiguration,
    pub fail_on_record_corruption: bool,
    pub current_node_only_recovery: bool,
    /// periodic recovery cadence for the scheduler; 0 disables background recovery
    pub background_recovery_interval_seconds: u64,
    pub default_transaction_timeout_seconds: u64,
    pub graceful_shutdown_interval_seconds: u64,
}

#[derive(Debug, PartialEq, Clone)]
/// Which journal implementation to run
pub enum JournalKind {
    /// the single disk journal
    Disk,
    /// accept and discard everything (unsafe; for throwaway environments)
    Null,
    /// two disk journals written in parallel and reconciled on read
    Multiplexed,
    /// a custom implementation registered by name
    Custom(Box<str>),
}

#[derive(Debug, PartialEq, Clone)]
/// Settings for one disk journal (a pair of fragment files)
pub struct DiskConfiguration {
    pub log_part1_filename: Box<str>,
    pub log_part2_filename: Box<str>,
    pub max_log_size_mb: u64,
    pub forced_write_enabled: bool,
    pub force_batching_enabled: bool,
    pub filter_log_status: bool,
    pub skip_corrupted_logs: bool,
}

impl DiskConfiguration {
    pub fn max_log_size_bytes(&self) -> u64 {
        self.max_log_size_mb * 1024 * 1024
    }
}

impl Configuration {
    pub const DEFAULT_SERVER_ID: &'static str = "127.0.0.1";
    pub const DEFAULT_MAX_LOG_SIZE_MB: u64 = 2;
    pub const DEFAULT_BACKGROUND_RECOVERY_INTERVAL_SECONDS: u64 = 60;
    pub const DEFAULT_TRANSACTION_TIMEOUT_SECONDS: u64 = 60;
    pub const DEFAULT_GRACEFUL_SHUTDOWN_INTERVAL_SECONDS: u64 = 60;
    pub fn default_with_server_id(server_id: &str) -> Self {
        Self {
            server_id: server_id.into(),
            journal: JournalKind::Disk,
            disk: DiskConfiguration::default_with_parts("janus-log1.tlog", "janus-log2.tlog"),
            primary_disk: DiskConfiguration::default_with_parts(
                "janus-primary-log1.tlog",
                "janus-primary-log2.tlog",
            ),
            secondary_disk: DiskConfiguration::default_with_parts(
                "janus-secondary-log1.tlog",
                "janus-secondary-log2.tlog",
            ),
            fail_on_record_corruption: false,
            current_node_only_recovery: true,
            background_recovery_interval_seconds:
                Self::DEFAULT_BACKGROUND_RECOVERY_INTERVAL_SECONDS,
            default_transaction_timeout_seconds: Self::DEFAULT_TRANSACTION_TIMEOUT_SECONDS,
            graceful_shutdown_interval_seconds: Self::DEFAULT_GRACEFUL_SHUTDOWN_INTERVAL_SECONDS,
        }
    }
}

impl DiskConfiguration {
    pub fn default_with_parts(part1: &str, part2: &str) -> Self {
        Self {
            log_part1_filename: part1.into(),
            log_part2_filename: part2.into(),
            max_log_size_mb: Configuration::DEFAULT_MAX_LOG_SIZE_MB,
            forced_write_enabled: true,
            force_batching_enabled: false,
            filter_log_status: false,
            skip_corrupted_logs: false,
        }
    }
}

/*
    decoded configuration
    ---
    the "raw" configuration that we got from the user. not validated
*/

#[derive(Debug, PartialEq, Deserialize, Default)]
pub struct DecodedConfiguration {
    server_id: Option<String>,
    journal: Option<String>,
    disk: Option<DecodedDiskConfig>,
    primary_disk: Option<DecodedDiskConfig>,
    secondary_disk: Option<DecodedDiskConfig>,
    fail_on_record_corruption: Option<bool>,
    current_node_only_recovery: Option<bool>,
    background_recovery_interval_seconds: Option<u64>,
    default_transaction_timeout_seconds: Option<u64>,
    graceful_shutdown_interval_seconds: Option<u64>,
}

#[derive(Debug, PartialEq, Deserialize, Default)]
/// Decoded disk journal configuration
pub struct DecodedDiskConfig {
    log_part1_filename: Option<String>,
    log_part2_filename: Option<String>,
    max_log_size_mb: Option<u64>,
    forced_write_enabled: Option<bool>,
    force_batching_enabled: Option<bool>,
    filter_log_status: Option<bool>,
    skip_corrupted_logs: Option<bool>,
}

/*
    errors and misc
*/

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
/// A configuration error (with an optional error origin source)
pub struct ConfigError {
    source: Option<ConfigSource>,
    kind: ConfigErrorKind,
}

impl ConfigError {
    fn _new(source: Option<ConfigSource>, kind: ConfigErrorKind) -> Self {
        Self { source, kind }
    }
    /// New config error with no source
    fn new(kind: ConfigErrorKind) -> Self {
        Self::_new(None, kind)
    }
    /// New config error with the given source
    fn with_src(source: ConfigSource, kind: ConfigErrorKind) -> Self {
        Self::_new(Some(source), kind)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "config error in {}: ", src.as_str())?,
            None => write!(f, "config error: ")?,
        }
        match &self.kind {
            ConfigErrorKind::Conflict => write!(
                f,
                "conflicting settings. please choose either ENV or configuration file"
            ),
            ConfigErrorKind::ErrorString(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
/// The configuration source
pub enum ConfigSource {
    /// Environment variables
    Env,
    /// Configuration file
    File,
}

impl ConfigSource {
    fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::Env => "ENV",
            ConfigSource::File => "config file",
        }
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
/// Type of configuration error
pub enum ConfigErrorKind {
    /// More than one of ENV/FILE was provided
    Conflict,
    /// A custom error output
    ErrorString(String),
}

/// A configuration source implementation
trait ConfigurationSource {
    const SOURCE: ConfigSource;
    /// Formats an error `invalid value for {key}`
    fn err_invalid_value_for(key: &str) -> ConfigError {
        ConfigError::with_src(
            Self::SOURCE,
            ConfigErrorKind::ErrorString(format!("invalid value for {key}")),
        )
    }
    /// Formats the custom error directly
    fn custom_err(error: String) -> ConfigError {
        ConfigError::with_src(Self::SOURCE, ConfigErrorKind::ErrorString(error))
    }
}

struct CSConfigFile;
impl ConfigurationSource for CSConfigFile {
    const SOURCE: ConfigSource = ConfigSource::File;
}

struct CSEnvArgs;
impl ConfigurationSource for CSEnvArgs {
    const SOURCE: ConfigSource = ConfigSource::Env;
}

/*
    decode
*/

/// Parse a YAML configuration document
fn decode_yaml(yaml: &str) -> RuntimeResult<DecodedConfiguration> {
    serde_yaml::from_str(yaml).map_err(|e| {
        CSConfigFile::custom_err(format!("failed to parse YAML configuration: {e}")).into()
    })
}

pub type ParsedRawArgs = HashMap<String, String>;

/// Recognized `JANUS_*` environment keys. Disk settings use the
/// `JANUS_{,PRIMARY_,SECONDARY_}DISK_*` prefixes.
const ENV_KEYS: [&str; 7] = [
    "JANUS_SERVER_ID",
    "JANUS_JOURNAL",
    "JANUS_FAIL_ON_RECORD_CORRUPTION",
    "JANUS_CURRENT_NODE_ONLY_RECOVERY",
    "JANUS_BACKGROUND_RECOVERY_INTERVAL_SECONDS",
    "JANUS_DEFAULT_TRANSACTION_TIMEOUT_SECONDS",
    "JANUS_GRACEFUL_SHUTDOWN_INTERVAL_SECONDS",
];
const ENV_DISK_KEY_SUFFIXES: [&str; 7] = [
    "LOG_PART1_FILENAME",
    "LOG_PART2_FILENAME",
    "MAX_LOG_SIZE_MB",
    "FORCED_WRITE_ENABLED",
    "FORCE_BATCHING_ENABLED",
    "FILTER_LOG_STATUS",
    "SKIP_CORRUPTED_LOGS",
];

/// Collect the recognized `JANUS_*` variables from the process environment
fn parse_env() -> ParsedRawArgs {
    let mut args = HashMap::new();
    let mut probe = |key: String| {
        if let Ok(v) = std::env::var(&key) {
            args.insert(key, v);
        }
    };
    for key in ENV_KEYS {
        probe(key.to_owned());
    }
    for scope in ["DISK", "PRIMARY_DISK", "SECONDARY_DISK"] {
        for suffix in ENV_DISK_KEY_SUFFIXES {
            probe(format!("JANUS_{scope}_{suffix}"));
        }
    }
    args
}

fn env_bool<CS: ConfigurationSource>(args: &ParsedRawArgs, key: &str) -> RuntimeResult<Option<bool>> {
    match args.get(key).map(|s| s.as_str()) {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(_) => Err(CS::err_invalid_value_for(key).into()),
    }
}

fn env_u64<CS: ConfigurationSource>(args: &ParsedRawArgs, key: &str) -> RuntimeResult<Option<u64>> {
    match args.get(key) {
        None => Ok(None),
        Some(v) => match v.parse::<u64>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => Err(CS::err_invalid_value_for(key).into()),
        },
    }
}

fn decode_env_disk<CS: ConfigurationSource>(
    args: &ParsedRawArgs,
    scope: &str,
) -> RuntimeResult<Option<DecodedDiskConfig>> {
    let key = |suffix: &str| format!("JANUS_{scope}_{suffix}");
    let decoded = DecodedDiskConfig {
        log_part1_filename: args.get(&key("LOG_PART1_FILENAME")).cloned(),
        log_part2_filename: args.get(&key("LOG_PART2_FILENAME")).cloned(),
        max_log_size_mb: env_u64::<CS>(args, &key("MAX_LOG_SIZE_MB"))?,
        forced_write_enabled: env_bool::<CS>(args, &key("FORCED_WRITE_ENABLED"))?,
        force_batching_enabled: env_bool::<CS>(args, &key("FORCE_BATCHING_ENABLED"))?,
        filter_log_status: env_bool::<CS>(args, &key("FILTER_LOG_STATUS"))?,
        skip_corrupted_logs: env_bool::<CS>(args, &key("SKIP_CORRUPTED_LOGS"))?,
    };
    if decoded == DecodedDiskConfig::default() {
        Ok(None)
    } else {
        Ok(Some(decoded))
    }
}

/// Decode the recognized environment variables
fn decode_env(args: &ParsedRawArgs) -> RuntimeResult<DecodedConfiguration> {
    Ok(DecodedConfiguration {
        server_id: args.get("JANUS_SERVER_ID").cloned(),
        journal: args.get("JANUS_JOURNAL").cloned(),
        disk: decode_env_disk::<CSEnvArgs>(args, "DISK")?,
        primary_disk: decode_env_disk::<CSEnvArgs>(args, "PRIMARY_DISK")?,
        secondary_disk: decode_env_disk::<CSEnvArgs>(args, "SECONDARY_DISK")?,
        fail_on_record_corruption: env_bool::<CSEnvArgs>(args, "JANUS_FAIL_ON_RECORD_CORRUPTION")?,
        current_node_only_recovery: env_bool::<CSEnvArgs>(
            args,
            "JANUS_CURRENT_NODE_ONLY_RECOVERY",
        )?,
        background_recovery_interval_seconds: env_u64::<CSEnvArgs>(
            args,
            "JANUS_BACKGROUND_RECOVERY_INTERVAL_SECONDS",
        )?,
        default_transaction_timeout_seconds: env_u64::<CSEnvArgs>(
            args,
            "JANUS_DEFAULT_TRANSACTION_TIMEOUT_SECONDS",
        )?,
        graceful_shutdown_interval_seconds: env_u64::<CSEnvArgs>(
            args,
            "JANUS_GRACEFUL_SHUTDOWN_INTERVAL_SECONDS",
        )?,
    })
}

/*
    validate
*/

fn validate_server_id<CS: ConfigurationSource>(server_id: &str) -> RuntimeResult<()> {
    if server_id.is_empty()
        || server_id.len() > Uid::MAX_SERVER_ID_SIZE
        || !server_id.is_ascii()
    {
        return Err(CS::custom_err(format!(
            "server_id must be 1..={} US-ASCII bytes",
            Uid::MAX_SERVER_ID_SIZE
        ))
        .into());
    }
    Ok(())
}

fn validate_journal_kind<CS: ConfigurationSource>(journal: &str) -> RuntimeResult<JournalKind> {
    Ok(match journal {
        "disk" => JournalKind::Disk,
        "null" => JournalKind::Null,
        "multiplexed" => JournalKind::Multiplexed,
        custom if !custom.is_empty() => JournalKind::Custom(custom.into()),
        _ => return Err(CS::err_invalid_value_for("journal").into()),
    })
}

fn apply_disk<CS: ConfigurationSource>(
    target: &mut DiskConfiguration,
    decoded: DecodedDiskConfig,
) -> RuntimeResult<()> {
    let DecodedDiskConfig {
        log_part1_filename,
        log_part2_filename,
        max_log_size_mb,
        forced_write_enabled,
        force_batching_enabled,
        filter_log_status,
        skip_corrupted_logs,
    } = decoded;
    if let Some(part1) = log_part1_filename {
        target.log_part1_filename = part1.into();
    }
    if let Some(part2) = log_part2_filename {
        target.log_part2_filename = part2.into();
    }
    if let Some(size) = max_log_size_mb {
        if size == 0 {
            return Err(CS::err_invalid_value_for("max_log_size_mb").into());
        }
        target.max_log_size_mb = size;
    }
    if let Some(v) = forced_write_enabled {
        target.forced_write_enabled = v;
    }
    if let Some(v) = force_batching_enabled {
        target.force_batching_enabled = v;
    }
    if let Some(v) = filter_log_status {
        target.filter_log_status = v;
    }
    if let Some(v) = skip_corrupted_logs {
        target.skip_corrupted_logs = v;
    }
    if target.log_part1_filename == target.log_part2_filename {
        return Err(CS::custom_err(
            "the two fragment files of a disk journal must not share a path".to_owned(),
        )
        .into());
    }
    Ok(())
}

/// Apply a decoded configuration on top of the defaults, validating as we go
fn apply_decoded<CS: ConfigurationSource>(
    decoded: DecodedConfiguration,
) -> RuntimeResult<Configuration> {
    let DecodedConfiguration {
        server_id,
        journal,
        disk,
        primary_disk,
        secondary_disk,
        fail_on_record_corruption,
        current_node_only_recovery,
        background_recovery_interval_seconds,
        default_transaction_timeout_seconds,
        graceful_shutdown_interval_seconds,
    } = decoded;
    let server_id = match server_id {
        Some(server_id) => {
            validate_server_id::<CS>(&server_id)?;
            server_id
        }
        None => {
            // fall back to this node's address; warn because two nodes sharing it will
            // collide on gtrids
            log::warn!(
                "no server_id configured; falling back to the local address `{}`",
                Configuration::DEFAULT_SERVER_ID
            );
            Configuration::DEFAULT_SERVER_ID.to_owned()
        }
    };
    let mut config = Configuration::default_with_server_id(&server_id);
    if let Some(journal) = journal {
        config.journal = validate_journal_kind::<CS>(&journal)?;
    }
    if let Some(disk) = disk {
        apply_disk::<CS>(&mut config.disk, disk)?;
    }
    if let Some(primary) = primary_disk {
        apply_disk::<CS>(&mut config.primary_disk, primary)?;
    }
    if let Some(secondary) = secondary_disk {
        apply_disk::<CS>(&mut config.secondary_disk, secondary)?;
    }
    if let Some(v) = fail_on_record_corruption {
        config.fail_on_record_corruption = v;
    }
    if let Some(v) = current_node_only_recovery {
        config.current_node_only_recovery = v;
    }
    if let Some(v) = background_recovery_interval_seconds {
        config.background_recovery_interval_seconds = v;
    }
    if let Some(v) = default_transaction_timeout_seconds {
        config.default_transaction_timeout_seconds = v;
    }
    if let Some(v) = graceful_shutdown_interval_seconds {
        config.graceful_shutdown_interval_seconds = v;
    }
    if config.journal == JournalKind::Multiplexed {
        let primary_paths = [
            &config.primary_disk.log_part1_filename,
            &config.primary_disk.log_part2_filename,
        ];
        if primary_paths.contains(&&config.secondary_disk.log_part1_filename)
            || primary_paths.contains(&&config.secondary_disk.log_part2_filename)
        {
            return Err(CS::custom_err(
                "multiplexed journal legs must not share fragment files".to_owned(),
            )
            .into());
        }
    }
    Ok(config)
}

/// Resolve the configuration from the given YAML document (if any) and the process environment.
/// Providing both is a conflict: settings must come from exactly one source.
pub fn check_config_and_resolve(config_file: Option<&str>) -> RuntimeResult<Configuration> {
    let env_args = parse_env();
    match (config_file, env_args.is_empty()) {
        (Some(_), false) => Err(ConfigError::new(ConfigErrorKind::Conflict).into()),
        (Some(yaml), true) => apply_decoded::<CSConfigFile>(decode_yaml(yaml)?),
        (None, false) => apply_decoded::<CSEnvArgs>(decode_env(&env_args)?),
        (None, true) => apply_decoded::<CSEnvArgs>(DecodedConfiguration::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        apply_decoded, decode_env, decode_yaml, CSConfigFile, CSEnvArgs, Configuration,
        JournalKind, ParsedRawArgs,
    };

    const FULL_YAML: &str = r#"
server_id: node-a
journal: multiplexed
primary_disk:
  log_part1_filename: p1.tlog
  log_part2_filename: p2.tlog
  max_log_size_mb: 8
  skip_corrupted_logs: true
secondary_disk:
  log_part1_filename: s1.tlog
  log_part2_filename: s2.tlog
  skip_corrupted_logs: true
fail_on_record_corruption: true
background_recovery_interval_seconds: 120
"#;

    #[test]
    fn yaml_full_decode() {
        let config = apply_decoded::<CSConfigFile>(decode_yaml(FULL_YAML).unwrap()).unwrap();
        assert_eq!(&*config.server_id, "node-a");
        assert_eq!(config.journal, JournalKind::Multiplexed);
        assert_eq!(&*config.primary_disk.log_part1_filename, "p1.tlog");
        assert_eq!(config.primary_disk.max_log_size_mb, 8);
        assert!(config.primary_disk.skip_corrupted_logs);
        assert!(config.primary_disk.forced_write_enabled);
        assert_eq!(&*config.secondary_disk.log_part2_filename, "s2.tlog");
        assert!(config.fail_on_record_corruption);
        assert_eq!(config.background_recovery_interval_seconds, 120);
    }

    #[test]
    fn defaults_when_nothing_is_configured() {
        let config = apply_decoded::<CSEnvArgs>(Default::default()).unwrap();
        assert_eq!(&*config.server_id, Configuration::DEFAULT_SERVER_ID);
        assert_eq!(config.journal, JournalKind::Disk);
        assert!(config.disk.forced_write_enabled);
        assert!(!config.disk.skip_corrupted_logs);
        assert_eq!(
            config.background_recovery_interval_seconds,
            Configuration::DEFAULT_BACKGROUND_RECOVERY_INTERVAL_SECONDS
        );
    }

    #[test]
    fn env_decode() {
        let mut args = ParsedRawArgs::new();
        args.insert("JANUS_SERVER_ID".to_owned(), "node-env".to_owned());
        args.insert("JANUS_JOURNAL".to_owned(), "null".to_owned());
        args.insert(
            "JANUS_DISK_LOG_PART1_FILENAME".to_owned(),
            "env1.tlog".to_owned(),
        );
        args.insert("JANUS_DISK_FORCED_WRITE_ENABLED".to_owned(), "false".to_owned());
        let config = apply_decoded::<CSEnvArgs>(decode_env(&args).unwrap()).unwrap();
        assert_eq!(&*config.server_id, "node-env");
        assert_eq!(config.journal, JournalKind::Null);
        assert_eq!(&*config.disk.log_part1_filename, "env1.tlog");
        assert!(!config.disk.forced_write_enabled);
    }

    #[test]
    fn rejects_bad_values() {
        let long_id = "x".repeat(52);
        let yaml = format!("server_id: {long_id}");
        assert!(apply_decoded::<CSConfigFile>(decode_yaml(&yaml).unwrap()).is_err());
        let yaml = "disk:\n  max_log_size_mb: 0";
        assert!(apply_decoded::<CSConfigFile>(decode_yaml(yaml).unwrap()).is_err());
        let yaml = "disk:\n  log_part1_filename: same.tlog\n  log_part2_filename: same.tlog";
        assert!(apply_decoded::<CSConfigFile>(decode_yaml(yaml).unwrap()).is_err());
    }

    #[test]
    fn custom_journal_kind() {
        let config =
            apply_decoded::<CSConfigFile>(decode_yaml("journal: my-journal").unwrap()).unwrap();
        assert_eq!(config.journal, JournalKind::Custom("my-journal".into()));
    }
}
