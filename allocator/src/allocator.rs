//! The transactional resource allocator. `spec.md` §4.2: `reserve(req) ->
//! Reservation | Error`, `release(reservation)`, atomic across all resources
//! in one transaction.
//!
//! Because `volant-db`'s `Database` serializes all access behind one
//! connection mutex, a `with_tx` closure already observes a consistent
//! snapshot with no concurrent writer — so planning (reading current state)
//! and committing (writing reservations) can safely happen in two steps
//! inside the same transaction without a separate locking scheme.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::Transaction;

use volant_db::{ip_pool, vms};

use crate::error::{AllocatorError, Result};
use crate::mac::derive_mac;
use crate::paths::{clear_stale, runtime_paths, RuntimePaths};
use crate::tap::tap_name;

/// Whether a reservation needs a host IP/tap at all; vsock-only VMs consume
/// neither (`spec.md` §8 scenario 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkNeeds {
    BridgedOrDhcp,
    VsockOnly,
}

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub vm_name: String,
    pub network: NetworkNeeds,
    pub requested_ip: Option<Ipv4Addr>,
    pub pci_devices: Vec<String>,
}

/// The resources computed for a not-yet-created VM. Handed to the caller so
/// it can build the `vms` row; `Allocator::commit` then marks them as in use.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub ip_address: Option<Ipv4Addr>,
    pub mac_address: Option<String>,
    pub vsock_cid: u32,
    pub tap_name: Option<String>,
    pub api_socket_path: PathBuf,
    pub serial_socket_path: PathBuf,
    pub log_path: PathBuf,
    pub pci_devices: Vec<String>,
}

pub struct Allocator {
    pci_claims: DashMap<String, i64>,
    runtime_dir: PathBuf,
    log_dir: PathBuf,
}

impl Allocator {
    pub fn new(runtime_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            pci_claims: DashMap::new(),
            runtime_dir: runtime_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    /// Rebuild the in-memory PCI claim index from persisted VM rows after a
    /// restart. `pci_devices` is whatever the caller has already decoded out
    /// of each VM's current config (the device list itself is not one of
    /// the ten tables `spec.md` §6 names, so it isn't queried here).
    pub fn restore_pci_claims(&self, claims: impl IntoIterator<Item = (String, i64)>) {
        for (pci, vm_id) in claims {
            self.pci_claims.insert(pci, vm_id);
        }
    }

    /// Compute (but do not yet persist) the resources a new VM would use.
    pub fn plan(&self, tx: &Transaction, req: &ReservationRequest) -> Result<Reservation> {
        let ip_address = match req.network {
            NetworkNeeds::VsockOnly => None,
            NetworkNeeds::BridgedOrDhcp => Some(self.plan_ip(tx, req.requested_ip)?),
        };
        let mac_address = ip_address.map(derive_mac);
        let vsock_cid = self.next_free_cid(tx)?;
        let tap = ip_address.map(|_| tap_name(&req.vm_name));

        for pci in &req.pci_devices {
            if let Some(owner) = self.pci_claims.get(pci) {
                return Err(AllocatorError::DeviceAlreadyClaimed(format!("{pci} (held by vm {})", *owner)));
            }
        }

        let paths = runtime_paths(&req.vm_name, &self.runtime_dir, &self.log_dir);
        clear_stale(&paths).map_err(volant_db::DbError::Io)?;

        Ok(Reservation {
            ip_address,
            mac_address,
            vsock_cid,
            tap_name: tap,
            api_socket_path: paths.api_socket_path,
            serial_socket_path: paths.serial_socket_path,
            log_path: paths.log_path,
            pci_devices: req.pci_devices.clone(),
        })
    }

    /// Mark the planned resources as in-use, once the caller has inserted
    /// the `vms` row and knows its id. Must be called in the same
    /// transaction `plan` ran in, or another caller could race the IP.
    pub fn commit(&self, tx: &Transaction, vm_id: i64, reservation: &Reservation) -> Result<()> {
        if let Some(ip) = reservation.ip_address {
            let now = Utc::now().to_rfc3339();
            if !ip_pool::lease(tx, ip, vm_id, &now)? {
                return Err(AllocatorError::IpNotAvailable(ip));
            }
        }
        for pci in &reservation.pci_devices {
            self.pci_claims.insert(pci.clone(), vm_id);
        }
        Ok(())
    }

    /// Release every resource owned by `vm_id`. Safe to call on a partially
    /// created reservation: each step is independently idempotent.
    pub fn release(&self, tx: &Transaction, vm_id: i64) -> Result<()> {
        if let Ok(vm) = vms::get(tx, vm_id) {
            if let Some(ip) = vm.ip_address.as_deref().and_then(|s| s.parse::<Ipv4Addr>().ok()) {
                ip_pool::release(tx, ip)?;
            }
        }
        self.pci_claims.retain(|_, owner| *owner != vm_id);
        Ok(())
    }

    fn plan_ip(&self, tx: &Transaction, requested: Option<Ipv4Addr>) -> Result<Ipv4Addr> {
        match requested {
            Some(ip) => {
                let allocation = ip_pool::get(tx, ip)?;
                match allocation {
                    Some(a) if a.status == volant_db::models::IpStatus::Available => Ok(ip),
                    _ => Err(AllocatorError::IpNotAvailable(ip)),
                }
            }
            None => ip_pool::lowest_available(tx)?.ok_or(AllocatorError::NoAvailableIPs),
        }
    }

    fn next_free_cid(&self, tx: &Transaction) -> Result<u32> {
        let used = vms::used_cids(tx)?;
        let mut candidate: u32 = 3;
        for cid in used {
            if cid == candidate {
                candidate = candidate.checked_add(1).ok_or(AllocatorError::NoAvailableCid)?;
            } else if cid > candidate {
                break;
            }
        }
        Ok(candidate)
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}
