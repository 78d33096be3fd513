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

//! Log styling helpers (§10.1): small extension trait colorizing channel
//! ids and amounts inside otherwise plain `log` lines, in the `lnp-node`
//! convention. No structured/JSON logging anywhere in the corpus.

/// Initializes `env_logger` reading verbosity from `RUST_LOG`, falling back
/// to `info` when unset.
pub fn init() {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    );
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

#[cfg(feature = "log-styles")]
mod styles {
    use colored::{Color, Colorize};

    /// Highlights the progress-relevant parts of a log line: channel ids in
    /// one color, amounts/counts in another. Mirrors the `lnp-node`
    /// `LogStyle` convention of `.progress()`/`.ender()` helpers on
    /// `Display` values, kept here as plain `&str`/formatted-value helpers
    /// since the core has no shared `LogStyle` trait object of its own.
    pub trait LogStyle {
        fn progress(&self) -> colored::ColoredString;
        fn ender(&self) -> colored::ColoredString;
        fn amount(&self) -> colored::ColoredString;
    }

    impl LogStyle for str {
        fn progress(&self) -> colored::ColoredString {
            self.color(Color::Yellow)
        }

        fn ender(&self) -> colored::ColoredString {
            self.color(Color::Green).bold()
        }

        fn amount(&self) -> colored::ColoredString {
            self.color(Color::Cyan)
        }
    }
}

#[cfg(feature = "log-styles")]
pub use styles::LogStyle;

#[cfg(not(feature = "log-styles"))]
mod no_styles {
    /// No-op counterpart of the `log-styles` [`super::styles::LogStyle`]
    /// trait so call sites don't need to feature-gate every log line.
    pub trait LogStyle {
        fn progress(&self) -> &Self;
        fn ender(&self) -> &Self;
        fn amount(&self) -> &Self;
    }

    impl LogStyle for str {
        fn progress(&self) -> &Self { self }
        fn ender(&self) -> &Self { self }
        fn amount(&self) -> &Self { self }
    }
}

#[cfg(not(feature = "log-styles"))]
pub use no_styles::LogStyle;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_style_helpers_return_displayable_values() {
        let highlighted = "channel-id-abcd".progress();
        assert!(!format!("{}", highlighted).is_empty());
    }
}
