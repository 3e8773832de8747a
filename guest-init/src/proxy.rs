//! Optional HTTP proxy. `spec.md` §4.10: "Optionally expose a simple HTTP
//! proxy that forwards host→guest requests to the workload's `base_url`."
//!
//! Host traffic reaches the guest over vsock (the host-side half is
//! `volant-dataplane::VsockBridge`, which dials `(cid, guest_port)` per
//! accepted TCP connection). `guest_port` is the same `volant.api_port`
//! cmdline key the route operator points a vsock route at, so no extra
//! handshake is needed to agree on it.
//!
//! Grounded on the teacher's vsock server trio (`exec_server.rs` /
//! `attest_server.rs` / `pty_server.rs`): raw `nix::sys::socket`
//! bind/listen/accept on `AF_VSOCK`, wrapping the accepted fd in a
//! `std::fs::File` for plain `Read`/`Write`. Those servers speak a custom
//! length-prefixed frame protocol for a single request/response; this one
//! is a dumb byte pump since the payload is already HTTP.

use std::io;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::thread;

use nix::sys::socket::{accept, bind, listen, socket, AddressFamily, Backlog, SockFlag, SockType, VsockAddr};
use tracing::{error, info, warn};

/// Run the vsock→TCP proxy forever. Never returns on success; callers
/// typically run this on its own thread.
pub fn run(guest_port: u32, upstream_host: String, upstream_port: u16) -> io::Result<()> {
    let sock_fd = socket(AddressFamily::Vsock, SockType::Stream, SockFlag::SOCK_CLOEXEC, None)
        .map_err(|e| io::Error::from_raw_os_error(e as i32))?;

    let addr = VsockAddr::new(libc::VMADDR_CID_ANY, guest_port);
    bind(sock_fd.as_raw_fd(), &addr).map_err(|e| io::Error::from_raw_os_error(e as i32))?;
    listen(&sock_fd, Backlog::new(16).map_err(|e| io::Error::from_raw_os_error(e as i32))?)
        .map_err(|e| io::Error::from_raw_os_error(e as i32))?;

    info!(guest_port, %upstream_host, upstream_port, "http proxy listening on vsock");

    loop {
        match accept(sock_fd.as_raw_fd()) {
            Ok(client_fd) => {
                let client = unsafe { OwnedFd::from_raw_fd(client_fd) };
                let host = upstream_host.clone();
                thread::spawn(move || {
                    if let Err(e) = proxy_connection(client, &host, upstream_port) {
                        warn!(error = %e, "proxy connection failed");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "vsock accept failed");
                thread::sleep(std::time::Duration::from_millis(100));
            }
        }
    }
}

fn proxy_connection(client: OwnedFd, upstream_host: &str, upstream_port: u16) -> io::Result<()> {
    let raw_fd = client.as_raw_fd();
    let guest_side = unsafe { std::fs::File::from_raw_fd(raw_fd) };
    std::mem::forget(client);

    let upstream = TcpStream::connect((upstream_host, upstream_port))?;

    let mut guest_reader = guest_side.try_clone()?;
    let mut upstream_writer = upstream.try_clone()?;
    let to_upstream = thread::spawn(move || io::copy(&mut guest_reader, &mut upstream_writer));

    let mut upstream_reader = upstream;
    let mut guest_writer = guest_side;
    let to_guest = io::copy(&mut upstream_reader, &mut guest_writer);

    let _ = to_upstream.join();
    let _ = to_guest;
    Ok(())
}
