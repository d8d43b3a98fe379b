#![warn(missing_docs)]
//! # Structured logging for hdht
//!
//! Every hdht component logs through `tracing` macros. Nothing in the library
//! crates installs a subscriber; binaries and tests pick an [Output] and call
//! [init_fmt] (or [test_run]) once at start up.
//!
//! ## Filtering
//! ```bash
//! RUST_LOG='hdht_p2p::gossip=trace,hdht_state=debug' my_bin
//! ```
//! `CUSTOM_FILTER` replaces `RUST_LOG` entirely when set and valid.
//!
//! ## Json
//! `Output::Json` writes one json object per event to stderr, handy for
//! piping into `jq`.

use tracing::Subscriber;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        format::{DefaultFields, Format},
        time::UtcTime,
        MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

use derive_more::Display;
use std::str::FromStr;

pub use tracing;

#[derive(Debug, Clone, Display, PartialEq, Eq)]
/// Sets the kind of structured logging output you want
pub enum Output {
    /// More compact version of above
    Compact,
    /// Outputs everything as json
    Json,
    /// Regular logging (default)
    Log,
    /// No logging to console
    None,
}

/// ParseError is a String
pub type ParseError = String;

impl FromStr for Output {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Json" => Ok(Output::Json),
            "Log" => Ok(Output::Log),
            "Compact" => Ok(Output::Compact),
            "None" => Ok(Output::None),
            _ => Err("Could not parse log output type".into()),
        }
    }
}

/// Run logging in a unit test.
///
/// RUST_LOG must be set or this is a no-op. Safe to call from every test;
/// only the first call installs a subscriber.
pub fn test_run() -> Result<(), errors::TracingError> {
    static INIT: std::sync::Once = std::sync::Once::new();

    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }

    let mut out = Ok(());
    INIT.call_once(|| out = init_fmt(Output::Log));
    out
}

/// Build the canonical filter based on env
pub fn standard_filter() -> Result<EnvFilter, errors::TracingError> {
    let mut filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::from_default_env().add_directive("info".parse()?),
    };
    if std::env::var("CUSTOM_FILTER").is_ok() {
        EnvFilter::try_from_env("CUSTOM_FILTER")
            .map_err(|e| eprintln!("Failed to parse CUSTOM_FILTER {:?}", e))
            .map(|f| {
                filter = f;
            })
            .ok();
    }
    Ok(filter)
}

/// Return a layer directly, for times when you need more control over the
/// produced subscriber
pub fn standard_layer_unfiltered<W, S>(
    writer: W,
) -> tracing_subscriber::fmt::Layer<S, DefaultFields, Format, W>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    S: Subscriber + Send + Sync + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::Layer::default()
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
}

/// Install a global subscriber writing to stderr.
pub fn init_fmt(output: Output) -> Result<(), errors::TracingError> {
    init_fmt_with_opts(output, std::io::stderr)
}

fn init_fmt_with_opts<W>(output: Output, writer: W) -> Result<(), errors::TracingError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = standard_filter()?;

    match output {
        Output::Json => Registry::default()
            .with(
                standard_layer_unfiltered(writer)
                    .with_timer(UtcTime::rfc_3339())
                    .json()
                    .with_filter(filter),
            )
            .try_init()?,

        Output::Log => Registry::default()
            .with(standard_layer_unfiltered(writer).with_filter(filter))
            .try_init()?,

        Output::Compact => Registry::default()
            .with(
                standard_layer_unfiltered(writer)
                    .compact()
                    .with_filter(filter),
            )
            .try_init()?,

        Output::None => (),
    };
    Ok(())
}

pub mod errors {
    //! Error in the tracing/logging framework

    use thiserror::Error;

    /// Error in the tracing/logging framework
    #[allow(missing_docs)] // should be self-explanatory
    #[derive(Error, Debug)]
    pub enum TracingError {
        #[error(transparent)]
        TryInit(#[from] tracing_subscriber::util::TryInitError),
        #[error(transparent)]
        BadDirective(#[from] tracing_subscriber::filter::ParseError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_output() {
        assert_eq!(Ok(Output::Json), "Json".parse());
        assert_eq!(Ok(Output::None), "None".parse());
        assert!("Flame".parse::<Output>().is_err());
        assert_eq!("Compact", Output::Compact.to_string());
    }

    #[test]
    fn test_run_is_repeatable() {
        test_run().unwrap();
        test_run().unwrap();
    }
}
