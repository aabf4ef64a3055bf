//! Platform-specific socket inspection
//!
//! The bridge needs two things the standard library does not expose: the
//! credentials of the process on the other end of a Unix socket, and a
//! non-blocking check whether that process has hung up.

use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod bsd;

/// Kernel-reported identity of a socket peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
    pub uid: u32,
    /// Not every platform reports the peer pid
    pub pid: Option<u32>,
}

/// Identity of the process on the other end of `stream`
#[cfg(target_os = "linux")]
pub fn peer_identity(stream: &UnixStream) -> io::Result<PeerIdentity> {
    linux::peer_identity(stream)
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub fn peer_identity(stream: &UnixStream) -> io::Result<PeerIdentity> {
    bsd::peer_identity(stream)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
pub fn peer_identity(_stream: &UnixStream) -> io::Result<PeerIdentity> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "peer credentials are not available on this platform",
    ))
}

/// Whether the peer closed the connection or left unread bytes behind
///
/// Either way the stream can no longer carry a clean request/reply pair.
/// Never blocks.
pub fn peer_hung_up(stream: &UnixStream) -> bool {
    let mut byte = 0u8;
    // SAFETY: the fd is owned by `stream` for the duration of the call and
    // the buffer is a valid one-byte region.
    let n = unsafe {
        libc::recv(
            stream.as_raw_fd(),
            (&mut byte as *mut u8).cast(),
            1,
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };
    if n < 0 {
        let err = io::Error::last_os_error();
        return !matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
        );
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_pair_is_not_hung_up() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(!peer_hung_up(&a));
    }

    #[test]
    fn test_closed_peer_is_hung_up() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        assert!(peer_hung_up(&a));
    }

    #[test]
    fn test_unread_bytes_count_as_hung_up() {
        let (a, mut b) = UnixStream::pair().unwrap();
        b.write_all(&[1]).unwrap();
        assert!(peer_hung_up(&a));
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_peer_identity_of_own_pair() {
        let (a, _b) = UnixStream::pair().unwrap();
        let identity = peer_identity(&a).unwrap();
        assert_eq!(identity.uid, crate::context::effective_uid());
        #[cfg(target_os = "linux")]
        assert_eq!(identity.pid, Some(std::process::id()));
    }
}
