//! Peer identity for log context.
//!
//! Resolved once per accepted connection from the socket's peer
//! credentials. Every lookup is best-effort; a connection with no
//! resolvable identity is still served.

use std::fmt;
use std::fs;

use nix::unistd::{Uid, User};
use tokio::net::UnixStream;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ConnectionIdentity {
    pub pid: Option<i32>,
    pub uid: Option<u32>,
    /// Username, falling back to the numeric uid.
    pub user: Option<String>,
    /// Executable name of the connecting process.
    pub program: Option<String>,
}

impl ConnectionIdentity {
    pub fn resolve(stream: &UnixStream) -> Self {
        let cred = match stream.peer_cred() {
            Ok(cred) => cred,
            Err(e) => {
                debug!(error = %e, "could not read peer credentials");
                return Self::default();
            }
        };

        let uid = cred.uid();
        let user = match User::from_uid(Uid::from_raw(uid)) {
            Ok(Some(user)) => user.name,
            _ => uid.to_string(),
        };

        let pid = cred.pid();
        let program = pid.and_then(|pid| {
            fs::read_to_string(format!("/proc/{pid}/comm"))
                .ok()
                .map(|name| name.trim_end().to_string())
        });

        Self {
            pid,
            uid: Some(uid),
            user: Some(user),
            program,
        }
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(pid) = self.pid {
            write!(f, "pid={pid}")?;
            wrote = true;
        }
        if let Some(user) = &self.user {
            if wrote {
                write!(f, " ")?;
            }
            write!(f, "user={user}")?;
            wrote = true;
        }
        if let Some(program) = &self.program {
            if wrote {
                write!(f, " ")?;
            }
            write!(f, "program={program}")?;
            wrote = true;
        }
        if !wrote {
            write!(f, "unknown")?;
        }
        Ok(())
    }
}
