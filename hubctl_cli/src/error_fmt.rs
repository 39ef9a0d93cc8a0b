//! Human-readable error descriptions and structured JSON error formatting.

use hubctl_core::error::{BuildError, DecodeError, HubError, ValidationError};

/// Input problems detected by the CLI itself before the core is involved.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("not a hex frame: {0:?}")]
    BadHex(String),
    #[error("config file {0} not found")]
    MissingConfig(String),
    #[error("frame {0} is not a command this tool sends")]
    NotACommand(String),
}

enum Kind {
    Validation,
    Decode,
    Config,
    Other,
}

fn classify(err: &eyre::Report) -> Kind {
    if err.downcast_ref::<ValidationError>().is_some() {
        return Kind::Validation;
    }
    if err.downcast_ref::<DecodeError>().is_some() {
        return Kind::Decode;
    }
    if let Some(he) = err.downcast_ref::<HubError>() {
        return match he {
            HubError::Validation(_) => Kind::Validation,
            HubError::Decode(_) => Kind::Decode,
            HubError::Config(_) => Kind::Config,
            HubError::Transport(_) | HubError::Closed => Kind::Other,
        };
    }
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::BadHex(_) | CliError::NotACommand(_) => Kind::Decode,
            CliError::MissingConfig(_) => Kind::Config,
        };
    }
    if matches!(err.downcast_ref::<BuildError>(), Some(BuildError::InvalidConfig(_))) {
        return Kind::Config;
    }
    Kind::Other
}

/// Map an `eyre::Report` to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    match classify(err) {
        Kind::Validation => format!(
            "What happened: The command was rejected before encoding ({err}).\nLikely causes: Speed outside -100..=100, max power above 100, or empty mode data.\nHow to fix: Adjust the arguments and try again."
        ),
        Kind::Decode => format!(
            "What happened: The frame could not be decoded ({err}).\nLikely causes: Fewer than three bytes, or characters that are not hex digits.\nHow to fix: Pass the whole frame including the length and hub id bytes, e.g. `hubctl decode \"05 00 82 00 0a\"`."
        ),
        Kind::Config => format!(
            "What happened: Invalid configuration ({err:#}).\nLikely causes: Missing file, out-of-range values, overlapping rate bands or a bad bands CSV header.\nHow to fix: Edit the config (see etc/hubctl.toml), then run `hubctl self-check`."
        ),
        Kind::Other => {
            let mut cause = String::new();
            if let Some(src) = err.source() {
                cause = format!(" Cause: {src}");
            }
            format!(
                "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {err}"
            )
        }
    }
}

/// Stable exit codes: validation 3, decode 4, config 5, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match classify(err) {
        Kind::Validation => 3,
        Kind::Decode => 4,
        Kind::Config => 5,
        Kind::Other => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match classify(err) {
        Kind::Validation => "Validation",
        Kind::Decode => "Decode",
        Kind::Config => "Config",
        Kind::Other => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
