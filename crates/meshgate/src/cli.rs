//! Clap derive structures for the `meshgate` CLI.
//!
//! Defines the complete command tree, global flags, and the integer
//! parsers shared by every address and index argument. Only depends on
//! clap, so `build.rs` can include it to render man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// meshgate -- operate Bluetooth mesh networks through an nRF Cloud gateway
#[derive(Debug, Parser)]
#[command(
    name = "meshgate",
    version,
    about = "Operate Bluetooth mesh networks through an nRF Cloud gateway",
    long_about = "Console for Bluetooth mesh networks managed by an nRF Cloud gateway.\n\n\
        Every command publishes one operation to the gateway over MQTT and\n\
        waits for the matching event before printing the result.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Gateway profile to use
    #[arg(long, short = 'p', env = "MESHGATE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Gateway device id (overrides profile)
    #[arg(long, short = 'g', env = "MESHGATE_GATEWAY", global = true)]
    pub gateway: Option<String>,

    /// nRF Cloud API key
    #[arg(long, env = "MESHGATE_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MESHGATE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Seconds to wait for each gateway response (overrides profile)
    #[arg(long, env = "MESHGATE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Output, Color & Log Enums ────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Feature and beacon states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

/// Publish period resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PeriodUnit {
    #[value(name = "100ms")]
    Millis100,
    #[value(name = "1s")]
    Seconds1,
    #[value(name = "10s")]
    Seconds10,
    #[value(name = "10m")]
    Minutes10,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List unprovisioned device beacons heard by the gateway
    #[command(alias = "b")]
    Beacons,

    /// Manage mesh subnets (network keys)
    #[command(alias = "net")]
    Subnets(SubnetsArgs),

    /// Manage application keys
    #[command(alias = "keys")]
    AppKeys(AppKeysArgs),

    /// List, discover, configure and provision nodes
    #[command(alias = "n")]
    Nodes(NodesArgs),

    /// Manage the addresses the gateway forwards to the cloud
    #[command(alias = "subs")]
    Subscriptions(SubscriptionsArgs),

    /// Talk to a node's health server
    Health(HealthArgs),

    /// Send and receive access-layer model messages
    Model(ModelArgs),

    /// Whole-network operations
    Network(NetworkArgs),

    /// List gateways registered to the nRF Cloud account
    Gateways,

    /// Interactive menu
    Shell,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SUBNETS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SubnetsArgs {
    #[command(subcommand)]
    pub command: SubnetsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubnetsCommand {
    /// List subnets known to the gateway
    #[command(alias = "ls")]
    List,

    /// Add a subnet with a known network key
    Add {
        /// 128-bit network key, hex
        #[arg(value_name = "NET_KEY")]
        net_key: String,

        /// Network index
        #[arg(value_parser = parse_u16)]
        index: u16,
    },

    /// Add a subnet with a gateway-generated network key
    Generate {
        /// Network index
        #[arg(value_parser = parse_u16)]
        index: u16,
    },

    /// Delete a subnet
    #[command(alias = "rm")]
    Delete {
        /// Network index (the primary subnet 0x0000 cannot be deleted)
        #[arg(value_parser = parse_u16)]
        index: u16,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  APPLICATION KEYS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct AppKeysArgs {
    #[command(subcommand)]
    pub command: AppKeysCommand,
}

#[derive(Debug, Subcommand)]
pub enum AppKeysCommand {
    /// List application keys
    #[command(alias = "ls")]
    List,

    /// Add an application key with a known value
    Add {
        /// 128-bit application key, hex
        #[arg(value_name = "APP_KEY")]
        app_key: String,

        /// Application key index
        #[arg(value_parser = parse_u16)]
        index: u16,

        /// Subnet the key is bound to
        #[arg(long, default_value = "0", value_parser = parse_u16)]
        subnet: u16,
    },

    /// Add a gateway-generated application key
    Generate {
        /// Application key index
        #[arg(value_parser = parse_u16)]
        index: u16,

        /// Subnet the key is bound to
        #[arg(long, default_value = "0", value_parser = parse_u16)]
        subnet: u16,
    },

    /// Delete an application key
    #[command(alias = "rm")]
    Delete {
        /// Application key index
        #[arg(value_parser = parse_u16)]
        index: u16,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  NODES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct NodesArgs {
    #[command(subcommand)]
    pub command: NodesCommand,
}

#[derive(Debug, Subcommand)]
pub enum NodesCommand {
    /// List provisioned nodes
    #[command(alias = "ls")]
    List,

    /// Fetch a node's full configuration
    Discover {
        /// Node unicast address
        #[arg(value_parser = parse_u16)]
        address: u16,
    },

    /// Change a node's configuration
    Configure {
        /// Node unicast address
        #[arg(value_parser = parse_u16)]
        address: u16,

        #[command(subcommand)]
        change: ConfigureCommand,
    },

    /// Provision an unprovisioned device into the network
    Provision {
        /// Device UUID (omit to pick from the beacon list)
        uuid: Option<String>,

        /// Unicast address to assign
        #[arg(long, short = 'a', value_parser = parse_u16)]
        address: u16,

        /// Subnet to provision into
        #[arg(long, default_value = "0", value_parser = parse_u16)]
        subnet: u16,

        /// Attention timer during provisioning, seconds
        #[arg(long, default_value = "0", value_parser = parse_u8)]
        attention: u8,
    },
}

/// Element and model a per-model change applies to.
#[derive(Debug, Clone, Args)]
pub struct ModelTarget {
    /// Element address
    #[arg(long, value_parser = parse_u16)]
    pub element: u16,

    /// Model id
    #[arg(long, value_parser = parse_u16)]
    pub model: u16,
}

#[derive(Debug, Subcommand)]
pub enum ConfigureCommand {
    /// Turn the secure network beacon on or off
    NetworkBeacon { state: Toggle },

    /// Set the default time-to-live
    Ttl {
        #[arg(value_parser = parse_u8)]
        value: u8,
    },

    /// Configure the relay feature
    Relay {
        state: Toggle,

        #[arg(long, default_value = "0", value_parser = parse_u8)]
        retransmit_count: u8,

        /// Milliseconds between retransmissions
        #[arg(long, default_value = "10", value_parser = parse_u16)]
        retransmit_interval: u16,
    },

    /// Turn the GATT proxy feature on or off
    Proxy { state: Toggle },

    /// Turn the friend feature on or off
    Friend { state: Toggle },

    /// Add a subnet key to the node
    AddSubnet {
        #[arg(value_parser = parse_u16)]
        net_index: u16,
    },

    /// Remove a subnet key from the node
    RemoveSubnet {
        #[arg(value_parser = parse_u16)]
        net_index: u16,
    },

    /// Bind an application key to a model
    Bind {
        #[command(flatten)]
        target: ModelTarget,

        #[arg(long, value_parser = parse_u16)]
        app_key: u16,
    },

    /// Unbind an application key from a model
    Unbind {
        #[command(flatten)]
        target: ModelTarget,

        #[arg(long, value_parser = parse_u16)]
        app_key: u16,
    },

    /// Set a model's publish parameters
    Publish {
        #[command(flatten)]
        target: ModelTarget,

        /// Publish address
        #[arg(long, value_parser = parse_u16)]
        address: u16,

        #[arg(long, value_parser = parse_u16)]
        app_key: u16,

        #[arg(long)]
        friend_credential: bool,

        #[arg(long, default_value = "7", value_parser = parse_u8)]
        ttl: u8,

        /// Number of period units; 0 disables periodic publishing
        #[arg(long, default_value = "0", value_parser = parse_u8)]
        period: u8,

        #[arg(long, default_value = "1s")]
        period_units: PeriodUnit,

        #[arg(long, default_value = "0", value_parser = parse_u8)]
        retransmit_count: u8,

        #[arg(long, default_value = "50", value_parser = parse_u16)]
        retransmit_interval: u16,
    },

    /// Add an address to a model's subscription list
    Subscribe {
        #[command(flatten)]
        target: ModelTarget,

        #[arg(long, value_parser = parse_u16)]
        address: u16,
    },

    /// Remove an address from a model's subscription list
    Unsubscribe {
        #[command(flatten)]
        target: ModelTarget,

        #[arg(long, value_parser = parse_u16)]
        address: u16,
    },

    /// Replace a model's subscription list with one address
    OverwriteSubscriptions {
        #[command(flatten)]
        target: ModelTarget,

        #[arg(long, value_parser = parse_u16)]
        address: u16,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SUBSCRIPTIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SubscriptionsArgs {
    #[command(subcommand)]
    pub command: SubscriptionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubscriptionsCommand {
    /// List subscribed addresses
    #[command(alias = "ls")]
    List,

    /// Subscribe to one or more addresses
    Add {
        #[arg(required = true, value_parser = parse_u16)]
        addresses: Vec<u16>,
    },

    /// Unsubscribe from one or more addresses
    #[command(alias = "rm")]
    Remove {
        #[arg(required = true, value_parser = parse_u16)]
        addresses: Vec<u16>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  HEALTH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct HealthArgs {
    #[command(subcommand)]
    pub command: HealthCommand,
}

/// Node and application key a health request goes through.
#[derive(Debug, Clone, Args)]
pub struct HealthTarget {
    /// Node unicast address
    #[arg(value_parser = parse_u16)]
    pub address: u16,

    /// Application key bound to the node's health server
    #[arg(long, default_value = "0", value_parser = parse_u16)]
    pub app_key: u16,
}

#[derive(Debug, Subcommand)]
pub enum HealthCommand {
    /// Read registered faults
    Faults {
        #[command(flatten)]
        target: HealthTarget,

        /// Company id the faults are registered under
        #[arg(long, default_value = "0x0059", value_parser = parse_u16)]
        company: u16,
    },

    /// Clear registered faults
    ClearFaults {
        #[command(flatten)]
        target: HealthTarget,

        #[arg(long, default_value = "0x0059", value_parser = parse_u16)]
        company: u16,
    },

    /// Run a self-test
    TestFaults {
        #[command(flatten)]
        target: HealthTarget,

        #[arg(long, default_value = "0x0059", value_parser = parse_u16)]
        company: u16,

        #[arg(long, default_value = "0", value_parser = parse_u8)]
        test_id: u8,
    },

    /// Read the fast period divisor
    Period {
        #[command(flatten)]
        target: HealthTarget,
    },

    /// Set the fast period divisor
    SetPeriod {
        #[command(flatten)]
        target: HealthTarget,

        #[arg(value_parser = parse_u8)]
        divisor: u8,
    },

    /// Read the attention timer
    Attention {
        #[command(flatten)]
        target: HealthTarget,
    },

    /// Start the attention timer (no answer is expected)
    SetAttention {
        #[command(flatten)]
        target: HealthTarget,

        /// Seconds
        #[arg(value_parser = parse_u8)]
        seconds: u8,
    },

    /// Read the gateway's health client timeout
    ClientTimeout,

    /// Set the gateway's health client timeout
    SetClientTimeout {
        /// Milliseconds
        #[arg(value_parser = parse_u32)]
        timeout: u32,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  MODEL MESSAGES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ModelArgs {
    #[command(subcommand)]
    pub command: ModelCommand,
}

/// Keys a model message is sent with.
#[derive(Debug, Clone, Args)]
pub struct MessageKeys {
    #[arg(long, default_value = "0", value_parser = parse_u16)]
    pub subnet: u16,

    #[arg(long, default_value = "0", value_parser = parse_u16)]
    pub app_key: u16,
}

#[derive(Debug, Subcommand)]
pub enum ModelCommand {
    /// Send a raw access-layer message
    Send {
        /// Destination address
        #[arg(value_parser = parse_u16)]
        address: u16,

        /// Access-layer opcode (1, 2 or 3 bytes)
        #[arg(value_parser = parse_u32)]
        opcode: u32,

        /// Payload bytes
        #[arg(value_parser = parse_u8)]
        payload: Vec<u8>,

        #[command(flatten)]
        keys: MessageKeys,

        /// Print messages from the destination for this many seconds
        #[arg(long, value_name = "SECS")]
        listen: Option<u64>,
    },

    /// Switch a Generic OnOff server
    Onoff {
        /// Destination address
        #[arg(value_parser = parse_u16)]
        address: u16,

        state: Toggle,

        #[command(flatten)]
        keys: MessageKeys,

        /// Raw transition time
        #[arg(long, value_parser = parse_u8)]
        transition: Option<u8>,

        /// Delay in 5 ms steps (needs --transition)
        #[arg(long, default_value = "0", value_parser = parse_u8, requires = "transition")]
        delay: u8,

        /// Use the unacknowledged set
        #[arg(long)]
        unack: bool,
    },

    /// Print model messages and health fault reports as they arrive
    Listen {
        /// Only messages from this source address
        #[arg(long, value_parser = parse_u16)]
        from: Option<u16>,

        /// Stop after this many messages
        #[arg(long)]
        count: Option<usize>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  NETWORK
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct NetworkArgs {
    #[command(subcommand)]
    pub command: NetworkCommand,
}

#[derive(Debug, Subcommand)]
pub enum NetworkCommand {
    /// Refresh subnets, app keys and nodes, then discover every node
    Refresh,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive configuration wizard
    Init,

    /// Show the current configuration
    Show,

    /// Set a profile field
    Set {
        /// Field name, e.g. gateway_id, host, timeout
        key: String,
        value: String,
    },

    /// Store the API key in the system keyring
    SetKey {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// List configured profiles
    Profiles,

    /// Print the config file path
    Path,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,

    /// Write to a file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

// ── Integer parsing ──────────────────────────────────────────────────

/// Decimal, or hex with a `0x` prefix.
fn parse_number(raw: &str) -> Result<u64, String> {
    let trimmed = raw.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|e| format!("'{raw}' is not a decimal or 0x-prefixed number: {e}"))
}

fn parse_bounded<T: TryFrom<u64>>(raw: &str, max: &str) -> Result<T, String> {
    let value = parse_number(raw)?;
    T::try_from(value).map_err(|_| format!("'{raw}' is out of range (max {max})"))
}

pub fn parse_u8(raw: &str) -> Result<u8, String> {
    parse_bounded(raw, "0xff")
}

pub fn parse_u16(raw: &str) -> Result<u16, String> {
    parse_bounded(raw, "0xffff")
}

pub fn parse_u32(raw: &str) -> Result<u32, String> {
    parse_bounded(raw, "0xffffffff")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn integers_accept_hex_and_decimal() {
        assert_eq!(parse_u16("0x00ff").unwrap(), 255);
        assert_eq!(parse_u16("0XC000").unwrap(), 0xc000);
        assert_eq!(parse_u16("42").unwrap(), 42);
        assert_eq!(parse_u8("0x59").unwrap(), 0x59);
        assert_eq!(parse_u32("0x8202").unwrap(), 0x8202);
    }

    #[test]
    fn integers_reject_overflow_and_garbage() {
        assert!(parse_u16("0x10000").unwrap_err().contains("out of range"));
        assert!(parse_u8("256").is_err());
        assert!(parse_u16("node").is_err());
        assert!(parse_u16("0x").is_err());
    }

    #[test]
    fn command_tree_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn configure_publish_parses_units() {
        let cli = Cli::try_parse_from([
            "meshgate",
            "nodes",
            "configure",
            "0x0005",
            "publish",
            "--element",
            "5",
            "--model",
            "0x1000",
            "--address",
            "0xc000",
            "--app-key",
            "0",
            "--period-units",
            "100ms",
        ])
        .unwrap();
        let Command::Nodes(NodesArgs {
            command: NodesCommand::Configure { address, change },
        }) = cli.command
        else {
            panic!("expected nodes configure");
        };
        assert_eq!(address, 5);
        match change {
            ConfigureCommand::Publish {
                target,
                period_units,
                ttl,
                ..
            } => {
                assert_eq!(target.model, 0x1000);
                assert_eq!(period_units, PeriodUnit::Millis100);
                assert_eq!(ttl, 7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
