use std::io::IsTerminal;

/// Whether a picker can be shown: both stdin and stderr are terminals.
pub fn can_prompt() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}
