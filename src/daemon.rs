//! Mount lifecycle for the filesystem.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use tracing::{debug, error, info};

use exec_fs::driver::{Driver, DriverConfig};

use crate::app_config::Config;
use crate::fs::fuse::FuserAdapter;

/// Forces an unmount of the FUSE filesystem when dropped.
///
/// fuser only performs a regular unmount when the session ends; a reader
/// stuck inside a long-running command can keep the mount busy, so we retry
/// with a detaching unmount.
struct UnmountGuard {
    mount_point: PathBuf,
}

impl Drop for UnmountGuard {
    fn drop(&mut self) {
        const UMOUNT_ATTEMPT_COUNT: usize = 10;
        const UMOUNT_ATTEMPT_DELAY: Duration = Duration::from_millis(10);

        debug!(mount_point = ?self.mount_point, "Confirming unmount of FUSE filesystem...");

        for i in 0..UMOUNT_ATTEMPT_COUNT {
            let result = {
                #[cfg(target_os = "macos")]
                {
                    nix::mount::unmount(&self.mount_point, nix::mount::MntFlags::MNT_FORCE)
                }

                #[cfg(target_os = "linux")]
                {
                    nix::mount::umount2(&self.mount_point, nix::mount::MntFlags::MNT_DETACH)
                }
            };

            match result {
                Ok(()) => {
                    debug!("Unmounted FUSE filesystem on attempt {}", i + 1);
                    break;
                }
                Err(Errno::EBUSY) => {
                    debug!("FUSE filesystem still busy on attempt {}. Retrying...", i + 1);
                    std::thread::sleep(UMOUNT_ATTEMPT_DELAY);
                }
                Err(Errno::EINVAL | Errno::ENOENT) => {
                    debug!("FUSE filesystem already unmounted (attempt {})", i + 1);
                    break;
                }
                Err(e) => {
                    error!("Failed to unmount FUSE filesystem on attempt {}: {}", i + 1, e);
                    break;
                }
            }
        }
    }
}

/// Prepares the mount point directory.
///
/// - If the directory exists and is non-empty, returns an error.
/// - If the directory does not exist, creates it (including parents).
/// - If the directory exists and is empty, does nothing.
fn prepare_mount_point(mount_point: &Path) -> Result<(), std::io::Error> {
    match std::fs::read_dir(mount_point) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "Mount point '{}' already exists and is not empty.",
                        mount_point.display()
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(mount_point)?;
            info!(path = %mount_point.display(), "Created mount point directory.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Mount the filesystem and serve requests until unmounted.
pub fn run(config: Config) -> Result<(), std::io::Error> {
    prepare_mount_point(&config.mount_point)?;

    let driver = Driver::new(DriverConfig {
        cache_dir: config.cache_dir.trim_matches('/').to_owned(),
        unsafe_attrs: config.unsafe_attrs,
        echo: config.echo,
        workdir: config.workdir.clone(),
        refresh: (&config.refresh).into(),
        ..DriverConfig::default()
    });

    let owner = (
        nix::unistd::Uid::current().as_raw(),
        nix::unistd::Gid::current().as_raw(),
    );
    let adapter = FuserAdapter::new(driver, owner);

    let mount_opts = [
        fuser::MountOption::FSName("exec-fs".to_owned()),
        fuser::MountOption::NoDev,
        fuser::MountOption::AutoUnmount,
    ];

    info!("Mounting filesystem at {}.", config.mount_point.display());
    let _guard = UnmountGuard {
        mount_point: config.mount_point.clone(),
    };
    fuser::mount2(adapter, &config.mount_point, &mount_opts)
}
