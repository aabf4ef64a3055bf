use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;

use super::PeerIdentity;

pub fn peer_identity(stream: &UnixStream) -> io::Result<PeerIdentity> {
    let mut uid: libc::uid_t = 0;
    let mut gid: libc::gid_t = 0;
    // SAFETY: both out-pointers reference live locals and the fd is owned by
    // `stream`.
    let rc = unsafe { libc::getpeereid(stream.as_raw_fd(), &mut uid, &mut gid) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(PeerIdentity { uid, pid: None })
}
