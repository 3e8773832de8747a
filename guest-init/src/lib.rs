//! `kestrel`: the guest PID-1 supervisor. `spec.md` §4.10. Boot-mode
//! dispatch (rootfs vs initramfs), `switch_root` into a mounted rootfs and
//! a `stage2` re-exec, manifest handoff decoding from `/proc/cmdline`,
//! workload spawn/reap/signal-forwarding, and an optional vsock→TCP proxy
//! onto the workload's `base_url`.
//!
//! Grounded on the teacher's `guest/init` crate: `main.rs`'s mount/spawn
//! sequencing, `namespace.rs`'s fork/exec idiom, and the vsock server trio
//! (`exec_server.rs`/`attest_server.rs`/`pty_server.rs`) for the proxy's
//! raw socket plumbing — generalized from "launch one co-resident agent"
//! to "boot a declared workload from a manifest handed off on the kernel
//! command line".

pub mod cmdline;
pub mod error;
pub mod mount;
pub mod proxy;
pub mod supervise;

pub use cmdline::{BootMode, GuestCmdline};
pub use error::{GuestInitError, Result};
