//! Request spec encoding and command line building.
//!
//! Probes store their request as the JSON string encoding of a literal shell
//! command (typically a `curl` invocation). Building the command decodes it,
//! splits it with POSIX quoting rules and appends the flags the response
//! parser depends on.

use super::error::CheckError;

/// Flags appended to every probe command: include response headers, no progress meter.
pub const FORCED_FLAGS: [&str; 2] = ["-i", "-s"];

/// Encode a literal command string for storage.
pub fn encode_request_spec(command: &str) -> String {
    // Serializing a &str cannot fail.
    serde_json::to_string(command).unwrap_or_default()
}

/// Decode a stored request spec back to the literal command string.
pub fn decode_request_spec(encoded: &str) -> Result<String, CheckError> {
    serde_json::from_str(encoded)
        .map_err(|e| CheckError::MalformedSpec(format!("invalid encoding: {e}")))
}

/// Split a literal command line into an argument vector using shell quoting rules.
pub fn split_command(command: &str) -> Result<Vec<String>, CheckError> {
    let args = shlex::split(command)
        .ok_or_else(|| CheckError::MalformedSpec("unbalanced quotes or trailing escape".into()))?;

    if args.is_empty() {
        return Err(CheckError::MalformedSpec("empty command".into()));
    }

    Ok(args)
}

/// Turn a stored request spec into the argv that gets executed.
pub fn build_command(encoded: &str) -> Result<Vec<String>, CheckError> {
    let command = decode_request_spec(encoded)?;
    let mut args = split_command(&command)?;
    args.extend(FORCED_FLAGS.iter().map(|flag| flag.to_string()));
    Ok(args)
}
