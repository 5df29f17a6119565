use std::io;
use tracing::{debug, warn};

/// Whether stdin is attached to an interactive terminal
#[must_use]
pub fn stdin_is_terminal() -> bool {
    atty::is(atty::Stream::Stdin)
}

/// Check that stdio can carry MCP traffic
///
/// An interactive terminal is allowed for manual testing but almost always
/// means no MCP client is attached, so it is reported loudly.
pub fn validate_stdio_transport() -> io::Result<()> {
    if stdin_is_terminal() {
        warn!("stdin is a terminal; the server expects an MCP client on stdio");
    } else {
        debug!("stdio transport detected");
    }

    if atty::is(atty::Stream::Stdout) {
        debug!("stdout is a terminal; protocol frames will be printed to it");
    }
    Ok(())
}
