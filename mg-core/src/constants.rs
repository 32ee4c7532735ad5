//! Constants and configuration values for muxguard
//!
//! Centralizes paths, attribute names and limits.
//! Every default here can be overridden from `/etc/muxguard/config.json`.

use std::time::Duration;

/// System paths
pub mod paths {
    /// System configuration file
    pub const CONFIG_FILE: &str = "/etc/muxguard/config.json";

    /// Legacy platform-device attribute directories, searched in order
    pub const LEGACY_ATTRIBUTE_DIRS: &[&str] = &[
        "/sys/devices/platform/asus-nb-wmi",
        "/sys/bus/platform/devices/asus-nb-wmi",
    ];

    /// Firmware-attribute tree exposing `<name>/current_value`
    pub const FIRMWARE_ATTRIBUTE_DIR: &str = "/sys/class/firmware-attributes/asus-armoury/attributes";

    /// Pending-transition record (the boot-time handoff)
    pub const PENDING_FILE: &str = "/etc/muxguard/pending_mode";

    /// Driver blacklist directive
    pub const BLACKLIST_FILE: &str = "/etc/modprobe.d/muxguard-dgpu-block.conf";

    /// Device removal rule
    pub const REMOVAL_RULE_FILE: &str = "/etc/udev/rules.d/50-muxguard-dgpu-remove.rules";

    /// Written when the boot controller had to self-heal
    pub const RECOVERY_MARKER_FILE: &str = "/var/lib/muxguard/recovery_marker";

    /// Privileged helper binary
    pub const HELPER_BINARY: &str = "/usr/libexec/muxguard-helper";

    /// Lock file serializing mode changes across processes
    pub const PLANNER_LOCK: &str = "/run/lock/muxguard.lock";

    /// DMI product name, used to identify the laptop model
    pub const DMI_PRODUCT_NAME: &str = "/sys/class/dmi/id/product_name";

    /// Per-user state file name inside the user config directory
    pub const USER_STATE_FILE: &str = "state.json";

    /// udevadm locations, first existing wins
    pub const UDEVADM_BINARIES: &[&str] = &["/sbin/udevadm", "/usr/sbin/udevadm", "/usr/bin/udevadm"];

    /// Privilege escalation front-end for the helper
    pub const PKEXEC_BINARY: &str = "pkexec";

    /// User configuration directory (~/.config/muxguard)
    pub fn user_config_dir() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join("muxguard"))
    }
}

/// Logical attribute names
pub mod attributes {
    /// "1" when the dGPU is powered off
    pub const DGPU_DISABLE: &str = "dgpu_disable";

    /// "0" routes the panel straight to the dGPU, "1" keeps the hybrid path
    pub const GPU_MUX_MODE: &str = "gpu_mux_mode";

    /// Optional MiniLED backlight switch
    pub const MINI_LED_MODE: &str = "mini_led_mode";

    /// File holding the value inside a firmware-attribute node
    pub const FIRMWARE_VALUE_FILE: &str = "current_value";

    /// Raw `gpu_mux_mode` value for direct dGPU routing
    pub const MUX_DGPU_DIRECT: i64 = 0;

    /// Raw `gpu_mux_mode` value for hybrid routing
    pub const MUX_HYBRID: i64 = 1;
}

/// Limits applied by the privileged helper
pub mod limits {
    /// Maximum size of a blacklist or rule source file (8KB)
    pub const MAX_ARTIFACT_SIZE: u64 = 8 * 1024;

    /// Maximum size of the pending record
    pub const MAX_PENDING_SIZE: u64 = 256;

    /// Maximum length of a logical attribute name
    pub const MAX_ATTRIBUTE_NAME_LEN: usize = 64;
}

/// Planner timing
pub mod planner {
    use super::Duration;

    /// How long a cancellable request waits on the lock between cancel checks
    pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);
}

/// Logging
pub mod logging {
    /// Environment variable carrying the log filter
    pub const LOG_ENV: &str = "MUXGUARD_LOG";

    /// Default filter when neither env nor config set one
    pub const DEFAULT_LEVEL: &str = "info";

    /// Present when systemd-journald accepts native log records
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}
