use cfg_if::cfg_if;

cfg_if!(
    if #[cfg(target_os = "linux")] {
        pub const OS_NAME: &str = "linux";
        pub const OS_NAMES: &[&str] = &["linux"];
    } else if #[cfg(target_os = "macos")] {
        pub const OS_NAME: &str = "osx";
        pub const OS_NAMES: &[&str] = &["osx", "macos"];
    } else if #[cfg(target_os = "windows")] {
        pub const OS_NAME: &str = "windows";
        pub const OS_NAMES: &[&str] = &["windows"];
    } else if #[cfg(target_os = "freebsd")] {
        pub const OS_NAME: &str = "freebsd";
        pub const OS_NAMES: &[&str] = &["freebsd"];
    }
);

cfg_if!(
    if #[cfg(target_arch = "aarch64")] {
        pub const ARCH: &str = "aarch64";
    } else if #[cfg(target_arch = "arm")] {
        pub const ARCH: &str = "arm";
    } else if #[cfg(target_arch = "x86")] {
        pub const ARCH: &str = "x86";
    } else {
        pub const ARCH: &str = "x86_64";
    }
);

/// Value substituted into `${arch}` inside native classifier templates.
#[cfg(target_pointer_width = "64")]
pub const ARCH_BITS: &str = "64";
#[cfg(target_pointer_width = "32")]
pub const ARCH_BITS: &str = "32";

pub const CLASSPATH_SEPARATOR: char = if cfg!(unix) { ':' } else { ';' };

pub const LAUNCHER_BRAND: &str = "cl-launcher";
pub const LAUNCHER_VERSION_NAME: &str = env!("CARGO_PKG_VERSION");
