// ABOUTME: Single-method capability traits a backend service may selectively implement.
// ABOUTME: Also defines the Capability enum used to name them in probes and errors.

mod exec;
mod lifecycle;
mod query;
mod shared_types;
mod stdio;
mod transfer;

use std::fmt;

pub use exec::{ExecOutput, Execer};
pub use lifecycle::{Creator, Killer, Remover, Starter, Stopper};
pub use query::{Inspector, Lister};
pub use shared_types::{CreateOptions, Signal};
pub use stdio::{BoxReader, BoxWriter, StderrSink, StdinSource, StdoutSink};
pub use transfer::{Mounter, Puller, Pusher};

/// Names one capability trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Pull,
    Push,
    Create,
    Start,
    Stop,
    Kill,
    Mount,
    Exec,
    Inspect,
    List,
    Remove,
    Stdin,
    Stdout,
    Stderr,
}

impl Capability {
    pub const ALL: [Capability; 14] = [
        Capability::Pull,
        Capability::Push,
        Capability::Create,
        Capability::Start,
        Capability::Stop,
        Capability::Kill,
        Capability::Mount,
        Capability::Exec,
        Capability::Inspect,
        Capability::List,
        Capability::Remove,
        Capability::Stdin,
        Capability::Stdout,
        Capability::Stderr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Pull => "pull",
            Capability::Push => "push",
            Capability::Create => "create",
            Capability::Start => "start",
            Capability::Stop => "stop",
            Capability::Kill => "kill",
            Capability::Mount => "mount",
            Capability::Exec => "exec",
            Capability::Inspect => "inspect",
            Capability::List => "list",
            Capability::Remove => "remove",
            Capability::Stdin => "stdin",
            Capability::Stdout => "stdout",
            Capability::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
