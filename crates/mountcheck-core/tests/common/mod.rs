//! Fake mount driver for integration tests.
//!
//! The driver is a generated shell script with the same command-line surface
//! as a real one. `map` symlinks the mountpoint to a shared backing directory
//! and stays alive until the link disappears; `unmap` removes the link.
//! Every mountpoint therefore shows the same store, which is what the
//! cross-mount probes expect. With `honor_read_only` set, a `--read-only`
//! map strips write permission from the store until the next `unmap`.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mountcheck_core::{
    Driver, ExistsProbe, HarnessConfig, PollConfig, ReadinessKind, ReadinessPoller,
};
use tempfile::TempDir;

const DRIVER_TEMPLATE: &str = r#"#!/bin/sh
store='@STORE@'
cmd="$1"
shift
mountpoint=""
read_only=""
while [ "$#" -gt 0 ]; do
    case "$1" in
        -l) mountpoint="$2"; shift 2 ;;
        --win-vol-name|--win-vol-serial) shift 2 ;;
        --read-only) read_only=1; shift ;;
        *) echo "unknown argument: $1" >&2; exit 2 ;;
    esac
done
[ -n "$mountpoint" ] || { echo "missing -l" >&2; exit 2; }
case "$cmd" in
    map)
        @MAP_PRELUDE@
        if [ -n "$read_only" ]; then @READ_ONLY_MAP@; fi
        ln -s "$store" "$mountpoint" || exit 1
        while [ -L "$mountpoint" ]; do sleep 0.05; done
        exit @MAP_EXIT@
        ;;
    unmap)
        @UNMAP_PRELUDE@
        chmod u+w "$store"
        rm -f "$mountpoint"
        exit 0
        ;;
    *)
        echo "unknown command: $cmd" >&2
        exit 2
        ;;
esac
"#;

/// Knobs for misbehaving drivers.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    /// Shell run before `map` links the mountpoint.
    pub map_prelude: String,
    /// Exit code of `map` once unmapped.
    pub map_exit: i32,
    /// Shell run before `unmap` removes the link.
    pub unmap_prelude: String,
    /// Make the store unwritable while mapped with `--read-only`.
    pub honor_read_only: bool,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            map_prelude: ":".into(),
            map_exit: 0,
            unmap_prelude: ":".into(),
            honor_read_only: false,
        }
    }
}

/// A fake driver plus scratch space for its store and mountpoints.
pub struct FakeDriver {
    dir: TempDir,
    script: PathBuf,
    store: PathBuf,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::with_behavior(&FakeBehavior::default())
    }

    pub fn with_behavior(behavior: &FakeBehavior) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let store = dir.path().join("store");
        fs::create_dir(&store).expect("create store");
        fs::create_dir(dir.path().join("mnt")).expect("create mount dir");

        let script = dir.path().join("fake-driver.sh");
        let text = DRIVER_TEMPLATE
            .replace("@STORE@", &store.display().to_string())
            .replace("@MAP_PRELUDE@", &behavior.map_prelude)
            .replace("@MAP_EXIT@", &behavior.map_exit.to_string())
            .replace("@UNMAP_PRELUDE@", &behavior.unmap_prelude)
            .replace(
                "@READ_ONLY_MAP@",
                if behavior.honor_read_only {
                    r#"chmod a-w "$store""#
                } else {
                    ":"
                },
            );
        fs::write(&script, text).expect("write driver script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
            .expect("make driver executable");

        Self { dir, script, store }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn store(&self) -> &Path {
        &self.store
    }

    /// Mountpoint path under the scratch directory. Not created.
    pub fn mountpoint(&self, name: &str) -> PathBuf {
        self.dir.path().join("mnt").join(name)
    }

    /// Driver with a fast poll and existence-based readiness.
    pub fn driver(&self) -> Driver {
        Driver::new(&self.script)
            .with_poller(ReadinessPoller::new(100, Duration::from_millis(20)))
            .with_readiness(Arc::new(ExistsProbe))
    }

    /// Config with shared mountpoint `x` and alternates `y` and `z`.
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            driver: self.script.clone(),
            mountpoint: self.mountpoint("x"),
            alternate_mountpoints: vec![self.mountpoint("y"), self.mountpoint("z")],
            readiness: ReadinessKind::Exists,
            poll: PollConfig {
                max_attempts: 100,
                interval: Duration::from_millis(20),
            },
            ..HarnessConfig::default()
        }
    }

    /// Whether no mountpoint link is left behind.
    pub fn all_unmapped(&self) -> bool {
        ["x", "y", "z"]
            .iter()
            .all(|name| fs::symlink_metadata(self.mountpoint(name)).is_err())
    }

    /// Entries left in the backing store.
    pub fn store_entries(&self) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(&self.store)
            .expect("read store")
            .map(|e| e.expect("store entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// Whether directory permission bits stop this process from creating files.
/// They don't for root, which rules out the read-only emulation.
pub fn permission_bits_enforced() -> bool {
    let dir = TempDir::new().expect("create temp dir");
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).expect("create locked dir");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).expect("lock dir");
    let enforced = fs::File::create(locked.join("canary")).is_err();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock dir");
    enforced
}

/// Return early when the fake driver cannot emulate a read-only mount.
#[macro_export]
macro_rules! skip_if_permissions_ignored {
    () => {
        if !$crate::common::permission_bits_enforced() {
            eprintln!("Skipping test: permission bits are not enforced for this user");
            return;
        }
    };
}
