use eyre::Result;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// Which side of the run is the data source.
///
/// The local machine is the one running gatesync; the remote side is the
/// pool of candidate hosts configured for the other endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    LocalToRemote,
    RemoteToLocal,
    Undetermined,
}

impl TransferDirection {
    /// Infer the direction from the size of each side's host pool.
    ///
    /// A multi-host source against a single (or empty) destination pool is a
    /// pull from remote candidates; one host on each side, or several on both,
    /// cannot be told apart and is rejected. Everything else is a push.
    pub fn resolve<S, D>(source_hosts: &[S], destination_hosts: &[D]) -> Result<Self> {
        let n_src = source_hosts.len();
        let n_dst = destination_hosts.len();

        if n_src > 1 && n_dst > 1 {
            return Err(SyncError::direction(
                "cannot determine direction: both sides multi-host",
            )
            .into());
        }
        if n_src == 1 && n_dst == 1 {
            return Err(SyncError::direction(
                "cannot determine direction: both sides name a single host",
            )
            .into());
        }
        if n_src > 1 {
            return Ok(TransferDirection::RemoteToLocal);
        }
        Ok(TransferDirection::LocalToRemote)
    }

    /// Use `explicit` when given, otherwise fall back to [`Self::resolve`].
    pub fn resolve_or_explicit<S, D>(
        explicit: Option<Self>,
        source_hosts: &[S],
        destination_hosts: &[D],
    ) -> Result<Self> {
        match explicit {
            Some(TransferDirection::Undetermined) => Err(SyncError::direction(
                "an explicit transfer direction must be local_to_remote or remote_to_local",
            )
            .into()),
            Some(direction) => Ok(direction),
            None => Self::resolve(source_hosts, destination_hosts),
        }
    }

    /// Whether the remote candidates sit on the source side.
    pub fn source_is_remote(self) -> bool {
        matches!(self, TransferDirection::RemoteToLocal)
    }

    /// Whether the remote candidates sit on the destination side.
    pub fn destination_is_remote(self) -> bool {
        matches!(self, TransferDirection::LocalToRemote)
    }
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransferDirection::LocalToRemote => "local -> remote",
            TransferDirection::RemoteToLocal => "remote -> local",
            TransferDirection::Undetermined => "undetermined",
        };
        f.write_str(label)
    }
}
