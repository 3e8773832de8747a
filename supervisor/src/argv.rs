//! Hypervisor argv composition. `spec.md` §4.6: cpu/memory, kernel image,
//! initramfs-or-disk arguments, one `--net` for the tap with its MAC, serial
//! to file, API socket, cloud-init seed disk, vsock device, VFIO `--device`
//! entries.

use volant_manifest::BootPlan;

/// Networking and passthrough values the BootPlan doesn't itself carry —
/// they come from the allocator's reservation for this VM.
#[derive(Debug, Clone, Default)]
pub struct LaunchNetwork {
    pub tap_name: Option<String>,
    pub mac_address: Option<String>,
    pub vsock_cid: Option<u32>,
}

pub fn compose_argv(plan: &BootPlan, network: &LaunchNetwork) -> Vec<String> {
    let mut argv = Vec::new();

    argv.push("--cpus".to_string());
    argv.push(plan.cpu.to_string());
    argv.push("--memory".to_string());
    argv.push(format!("{}M", plan.memory_mb));

    argv.push("--kernel".to_string());
    argv.push(plan.kernel_image_path.display().to_string());

    if let Some(initramfs) = &plan.initramfs_path {
        argv.push("--initramfs".to_string());
        argv.push(initramfs.display().to_string());
    }
    if let Some(rootfs) = &plan.rootfs_image_path {
        argv.push("--disk".to_string());
        argv.push(format!("{}:ro=false", rootfs.display()));
    }
    for disk in &plan.disks {
        argv.push("--disk".to_string());
        argv.push(disk.display().to_string());
    }

    if let (Some(tap), Some(mac)) = (&network.tap_name, &network.mac_address) {
        argv.push("--net".to_string());
        argv.push(format!("tap={tap},mac={mac}"));
    }

    if let Some(cid) = network.vsock_cid {
        argv.push("--vsock".to_string());
        argv.push(cid.to_string());
    }

    argv.push("--serial".to_string());
    argv.push(plan.serial_socket_path.display().to_string());

    argv.push("--api-socket".to_string());
    argv.push(plan.api_socket_path.display().to_string());

    if let Some(seed) = &plan.cloud_init_seed_path {
        argv.push("--disk".to_string());
        argv.push(format!("{}:ro=true", seed.display()));
    }

    for group in &plan.vfio_groups {
        argv.push("--device".to_string());
        argv.push(format!("vfio,path={}", group.display()));
    }

    argv.push("--cmdline".to_string());
    argv.push(plan.kernel_cmdline.clone());

    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use volant_manifest::NetworkPlan;

    fn bare_plan() -> BootPlan {
        BootPlan {
            vm_name: "web".into(),
            runtime: "nginx".into(),
            cpu: 2,
            memory_mb: 1024,
            kernel_image_path: PathBuf::from("/boot/bzImage"),
            initramfs_path: None,
            rootfs_image_path: Some(PathBuf::from("/var/lib/volant/web/rootfs.img")),
            disks: vec![],
            kernel_cmdline: "volant.boot=rootfs".into(),
            network_plan: NetworkPlan::Bridged,
            vfio_groups: vec![],
            cloud_init_seed_path: None,
            api_socket_path: PathBuf::from("/run/volant/web.sock"),
            log_path: PathBuf::from("/var/log/volant/web.log"),
            serial_socket_path: PathBuf::from("/run/volant/web.serial"),
        }
    }

    #[test]
    fn includes_net_only_when_tap_and_mac_present() {
        let plan = bare_plan();
        let argv = compose_argv(&plan, &LaunchNetwork::default());
        assert!(!argv.contains(&"--net".to_string()));

        let network = LaunchNetwork {
            tap_name: Some("vttap-web".into()),
            mac_address: Some("06:00:c0:a8:7f:02".into()),
            vsock_cid: Some(3),
        };
        let argv = compose_argv(&plan, &network);
        let net_idx = argv.iter().position(|a| a == "--net").unwrap();
        assert_eq!(argv[net_idx + 1], "tap=vttap-web,mac=06:00:c0:a8:7f:02");
    }

    #[test]
    fn carries_cpu_memory_and_serial_socket() {
        let plan = bare_plan();
        let argv = compose_argv(&plan, &LaunchNetwork::default());
        assert_eq!(argv[0], "--cpus");
        assert_eq!(argv[1], "2");
        assert!(argv.contains(&"1024M".to_string()));
        assert!(argv.contains(&"/run/volant/web.serial".to_string()));
    }
}
