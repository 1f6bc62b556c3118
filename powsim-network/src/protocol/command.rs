use std::fmt;

/// A peer-to-peer command kind.
///
/// The command strings are load-bearing: they are the protocol names used in
/// logs, schedule files, and topology configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    NodeVersion,
    Verack,
    Reject,
    GetAddr,
    Addrs,
    GetHeaders,
    Headers,
    GetBlocks,
    Blocks,
    Tx,
}

impl Command {
    /// May this command arrive before the peer has sent `nodeversion`?
    pub fn allowed_pre_version(self) -> bool {
        matches!(self, Command::NodeVersion | Command::Reject)
    }

    /// May this command arrive after `nodeversion` but before the handshake
    /// completes with `verack`?
    pub fn allowed_pre_verack(self) -> bool {
        matches!(self, Command::NodeVersion | Command::Reject | Command::Verack)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::NodeVersion => "nodeversion",
            Command::Verack => "verack",
            Command::Reject => "reject",
            Command::GetAddr => "getaddr",
            Command::Addrs => "addrs",
            Command::GetHeaders => "getheaders",
            Command::Headers => "headers",
            Command::GetBlocks => "getblocks",
            Command::Blocks => "blocks",
            Command::Tx => "tx",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_bits_match_the_handshake_phases() {
        // the handshake openers are valid at any time
        assert!(Command::NodeVersion.allowed_pre_version());
        assert!(Command::Reject.allowed_pre_version());

        // verack requires a version but not a completed handshake
        assert!(!Command::Verack.allowed_pre_version());
        assert!(Command::Verack.allowed_pre_verack());

        // everything else requires a completed handshake
        for command in [
            Command::GetAddr,
            Command::Addrs,
            Command::GetHeaders,
            Command::Headers,
            Command::GetBlocks,
            Command::Blocks,
            Command::Tx,
        ]
        .iter()
        {
            assert!(!command.allowed_pre_version());
            assert!(!command.allowed_pre_verack());
        }
    }
}
