// Per-channel peer daemon implementing the BOLT wire protocol state machine
// for a single Lightning Network payment channel.
//
// Written in 2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Runtime configuration (§10.3): everything the spec says must not be
//! hardcoded in the core.

use clap::Parser;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// File descriptor numbers for the four channels the core multiplexes over
/// (§6). Overridable for testing, where in-memory pipes stand in for the
/// real descriptors.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "serde_crate"))]
pub struct Descriptors {
    pub master: i32,
    pub peer: i32,
    pub gossip: i32,
    pub gossip_store: i32,
    pub signer: i32,
}

impl Default for Descriptors {
    fn default() -> Self {
        Descriptors {
            master: 0,
            peer: 3,
            gossip: 4,
            gossip_store: 5,
            signer: 6,
        }
    }
}

/// Default feerate band used only until the master supplies its own
/// (§10.3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "serde_crate"))]
pub struct FeerateBand {
    pub feerate_min_per_kw: u32,
    pub feerate_max_per_kw: u32,
}

impl Default for FeerateBand {
    fn default() -> Self {
        FeerateBand {
            feerate_min_per_kw: 253,
            feerate_max_per_kw: 10_000,
        }
    }
}

/// Per-channel daemon configuration (§10.3), loadable from a `channeld.toml`
/// file and overridable by CLI flags.
#[derive(Clone, Debug, Parser)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "serde_crate"))]
#[clap(
    name = "channeld",
    about = "Per-channel peer daemon for a Lightning Network payment channel"
)]
pub struct Config {
    /// Path to a `channeld.toml` configuration file, if any.
    #[clap(short, long)]
    #[cfg_attr(feature = "serde", serde(skip))]
    pub config_file: Option<std::path::PathBuf>,

    /// Milliseconds the one-shot commit timer waits once a change is
    /// pending before `send_commit` fires (§3, "Timers").
    #[clap(long, default_value = "50")]
    pub commit_msec: u64,

    /// Seconds of peer silence after which `send_commit` defers to the
    /// keepalive ping path instead of committing (§4.3 step 3; open
    /// question (c)).
    #[clap(long, default_value = "30")]
    pub peer_liveness_secs: u64,

    /// Default feerate band, used only until the master supplies its own.
    #[clap(skip)]
    pub default_feerate_band: FeerateBand,

    /// The four multiplexed descriptor numbers.
    #[clap(skip)]
    pub descriptors: Descriptors,

    /// Increase logging verbosity; can be repeated.
    #[clap(short, long, parse(from_occurrences))]
    pub verbose: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            config_file: None,
            commit_msec: 50,
            peer_liveness_secs: 30,
            default_feerate_band: FeerateBand::default(),
            descriptors: Descriptors::default(),
            verbose: 0,
        }
    }
}

impl Config {
    /// Parses CLI flags, then layers in a `channeld.toml` file if one was
    /// named and the `config-file` feature is enabled (§10.3).
    pub fn with_cli_and_file() -> Result<Self, ConfigError> {
        let mut config = Config::parse();
        #[cfg(feature = "config-file")]
        if let Some(path) = config.config_file.clone() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|err| ConfigError::Read(path.clone(), err.to_string()))?;
            let from_file: TomlConfig = toml::from_str(&contents)
                .map_err(|err| ConfigError::Parse(path, err.to_string()))?;
            from_file.apply_defaults(&mut config);
        }
        Ok(config)
    }
}

/// The subset of [`Config`] fields that may be set from `channeld.toml`
/// (§10.3). CLI flags always take precedence over file values, so this
/// only fills in fields left at the CLI-parser's own defaults.
#[cfg(feature = "config-file")]
#[derive(Clone, Debug, serde_crate::Deserialize)]
#[serde(crate = "serde_crate", default)]
struct TomlConfig {
    commit_msec: u64,
    peer_liveness_secs: u64,
}

#[cfg(feature = "config-file")]
impl Default for TomlConfig {
    fn default() -> Self {
        TomlConfig {
            commit_msec: 50,
            peer_liveness_secs: 30,
        }
    }
}

#[cfg(feature = "config-file")]
impl TomlConfig {
    fn apply_defaults(&self, config: &mut Config) {
        config.commit_msec = self.commit_msec;
        config.peer_liveness_secs = self.peer_liveness_secs;
    }
}

/// Errors reading or parsing `channeld.toml` (§10.3).
#[derive(Clone, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ConfigError {
    /// failed to read config file {0:?}: {1}
    Read(std::path::PathBuf, String),
    /// failed to parse config file {0:?}: {1}
    Parse(std::path::PathBuf, String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = Config::default();
        assert_eq!(config.commit_msec, 50);
        assert_eq!(config.peer_liveness_secs, 30);
        assert_eq!(config.descriptors.peer, 3);
        assert_eq!(config.descriptors.gossip, 4);
        assert_eq!(config.descriptors.gossip_store, 5);
        assert_eq!(config.descriptors.signer, 6);
    }

    #[test]
    fn feerate_band_default_is_sane() {
        let band = FeerateBand::default();
        assert!(band.feerate_min_per_kw < band.feerate_max_per_kw);
    }
}
