use std::io;
use std::os::unix::net::UnixStream;

use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};

use super::PeerIdentity;

pub fn peer_identity(stream: &UnixStream) -> io::Result<PeerIdentity> {
    let creds = getsockopt(stream, PeerCredentials).map_err(io::Error::from)?;
    Ok(PeerIdentity {
        uid: creds.uid(),
        pid: u32::try_from(creds.pid()).ok(),
    })
}
