//! Verb-to-operation dispatch.

use crate::driver::{DriverHandle, Reply};
use crate::error::DriverError;
use grapher_protocol::ArgumentMap;

/// Replaces each run of non-alphanumeric characters in a verb.
pub const OPERATION_SEPARATOR: &str = "__";

/// Maps a wire verb to the operation name it selects.
///
/// Every maximal run of characters outside `[0-9A-Za-z]` becomes `__`, so
/// `get-node`, `get.node` and `get -- node` all select `get__node`.
pub fn canonical_operation_name(verb: &str) -> String {
    let mut name = String::with_capacity(verb.len());
    let mut in_run = false;
    for c in verb.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
            in_run = false;
        } else if !in_run {
            name.push_str(OPERATION_SEPARATOR);
            in_run = true;
        }
    }
    name
}

/// Resolves `verb` on the driver and calls it with `args`.
pub fn dispatch(
    driver: &mut DriverHandle,
    verb: &str,
    args: &ArgumentMap,
) -> Result<Reply, DriverError> {
    let operation = canonical_operation_name(verb);
    tracing::debug!(
        "Dispatching '{}' to {}::{} ({} args)",
        verb,
        driver.name(),
        operation,
        args.len()
    );
    driver.invoke(&operation, args)
}
