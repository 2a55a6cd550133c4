//! Protected-path table.
//!
//! Injected into [`super::SafetyPolicy`] rather than consulted as global state, so a
//! test or an alternative platform profile can swap it. Matching is component-wise and
//! case-insensitive on Windows.

use std::path::{Path, PathBuf};

use crate::utils::fold_case;

/// How a path relates to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMatch {
    /// Equal to or inside a protected entry.
    Protected,
    /// A strict ancestor of a protected entry.
    ContainsProtected,
    /// Listed (or inside a listing) as needing explicit confirmation.
    Confirm,
    None,
}

#[derive(Debug, Clone, Default)]
pub struct ProtectedTable {
    protected: Vec<PathBuf>,
    confirm: Vec<PathBuf>,
}

impl ProtectedTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// OS-critical roots for the running platform.
    pub fn platform_default() -> Self {
        Self::empty().with_protected(default_entries())
    }

    pub fn with_protected<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.protected
            .extend(paths.into_iter().map(|p| fold_case(p.as_ref())));
        self
    }

    pub fn with_confirm<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.confirm
            .extend(paths.into_iter().map(|p| fold_case(p.as_ref())));
        self
    }

    pub fn protected_paths(&self) -> &[PathBuf] {
        &self.protected
    }

    pub fn confirm_paths(&self) -> &[PathBuf] {
        &self.confirm
    }

    /// Classify a path. Callers pass the path as given and, when it exists, its
    /// canonical form; the strongest match of the two wins.
    pub fn classify(&self, path: &Path) -> TableMatch {
        let p = fold_case(path);
        if self.protected.iter().any(|e| p.starts_with(e)) {
            return TableMatch::Protected;
        }
        if self.protected.iter().any(|e| e.starts_with(&p)) {
            return TableMatch::ContainsProtected;
        }
        if self.confirm.iter().any(|e| p.starts_with(e)) {
            return TableMatch::Confirm;
        }
        TableMatch::None
    }
}

#[cfg(windows)]
fn default_entries() -> Vec<PathBuf> {
    let env_dir = |var: &str, fallback: &str| {
        std::env::var_os(var)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(fallback))
    };
    let windir = env_dir("SystemRoot", r"C:\Windows");
    let drive = windir
        .ancestors()
        .last()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(r"C:\"));
    let program_files = env_dir("ProgramFiles", r"C:\Program Files");
    let program_data = env_dir("ProgramData", r"C:\ProgramData");

    let mut v = vec![
        windir,
        program_files.join("WindowsApps"),
        program_files.join("Windows Defender"),
        program_files.join("Windows NT"),
        program_files.join("Common Files"),
        program_data.join(r"Microsoft\Windows"),
        drive.join("Boot"),
        drive.join("bootmgr"),
        drive.join("BOOTNXT"),
        drive.join("pagefile.sys"),
        drive.join("hiberfil.sys"),
        drive.join("swapfile.sys"),
        drive.join("System Volume Information"),
        drive.join("$Recycle.Bin"),
        drive.join("Recovery"),
        drive.join(r"Users\All Users"),
        drive.join(r"Users\Default"),
    ];
    // The signed-in user's registry hives live in the profile.
    if let Some(profile) = std::env::var_os("USERPROFILE").map(PathBuf::from) {
        v.push(profile.join("NTUSER.DAT"));
    }
    if let Some(local) = std::env::var_os("LOCALAPPDATA").map(PathBuf::from) {
        v.push(local.join(r"Microsoft\Windows\UsrClass.dat"));
    }
    v
}

#[cfg(not(windows))]
fn default_entries() -> Vec<PathBuf> {
    let mut v: Vec<PathBuf> = [
        "/bin", "/boot", "/dev", "/etc", "/lib", "/lib32", "/lib64", "/libx32", "/proc", "/run",
        "/sbin", "/sys", "/usr", "/var/lib", "/var/run",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    if cfg!(target_os = "macos") {
        v.extend(
            ["/System", "/Library", "/private/etc", "/private/var/db", "/cores"]
                .iter()
                .map(PathBuf::from),
        );
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ProtectedTable {
        ProtectedTable::empty()
            .with_protected(["/sys-root/etc", "/sys-root/usr"])
            .with_confirm(["/home/u/shared"])
    }

    #[test]
    fn entry_and_descendants_are_protected() {
        let t = table();
        assert_eq!(t.classify(Path::new("/sys-root/etc")), TableMatch::Protected);
        assert_eq!(t.classify(Path::new("/sys-root/usr/share/doc")), TableMatch::Protected);
    }

    #[test]
    fn ancestors_contain_protected() {
        assert_eq!(table().classify(Path::new("/sys-root")), TableMatch::ContainsProtected);
    }

    #[test]
    fn sibling_prefix_is_not_a_match() {
        assert_eq!(table().classify(Path::new("/sys-root/etcetera")), TableMatch::None);
    }

    #[test]
    fn confirm_list_matches_descendants() {
        assert_eq!(table().classify(Path::new("/home/u/shared/x")), TableMatch::Confirm);
        assert_eq!(table().classify(Path::new("/home/u/other")), TableMatch::None);
    }

    #[cfg(not(windows))]
    #[test]
    fn default_table_covers_system_roots() {
        let t = ProtectedTable::platform_default();
        for p in ["/etc", "/usr/bin", "/boot/grub", "/var/lib/dpkg"] {
            assert_eq!(t.classify(Path::new(p)), TableMatch::Protected, "{p}");
        }
        assert_eq!(t.classify(Path::new("/var")), TableMatch::ContainsProtected);
        assert_eq!(t.classify(Path::new("/home/someone")), TableMatch::None);
    }
}
