//! Network filesystem detection from the kernel mount table

use std::fs;
use std::path::{Path, PathBuf};

const MOUNTS_PATH: &str = "/proc/mounts";

/// Filesystem types whose roots are treated as network bookmarks
const NETWORK_FS_TYPES: &[&str] = &["nfs", "nfs4", "cifs", "smb", "smbfs", "fuse.sshfs"];

/// Check if a path lives on a network mount. Unreadable mount tables mean "local".
pub fn is_network_mount(path: &Path) -> bool {
    match fs::read_to_string(MOUNTS_PATH) {
        Ok(table) => network_fs_type(path, &table).is_some(),
        Err(_) => false,
    }
}

/// Return the network fs type of the deepest mount containing `path`, if any
pub fn network_fs_type<'a>(path: &Path, mount_table: &'a str) -> Option<&'a str> {
    let mut best: Option<(usize, &str)> = None;

    for line in mount_table.lines() {
        let mut fields = line.split_whitespace();
        let (Some(_device), Some(mount_point), Some(fs_type)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        let mount_point = unescape_mount_point(mount_point);
        if !path.starts_with(&mount_point) {
            continue;
        }

        let depth = mount_point.components().count();
        if best.is_none_or(|(d, _)| depth >= d) {
            best = Some((depth, fs_type));
        }
    }

    best.map(|(_, fs_type)| fs_type)
        .filter(|fs_type| NETWORK_FS_TYPES.contains(fs_type))
}

/// The kernel escapes space, tab, newline and backslash as `\ooo` octal
fn unescape_mount_point(raw: &str) -> PathBuf {
    if !raw.contains('\\') {
        return PathBuf::from(raw);
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            if let Ok(octal) = std::str::from_utf8(&bytes[i + 1..i + 4])
                && let Ok(value) = u8::from_str_radix(octal, 8)
            {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    PathBuf::from(String::from_utf8_lossy(&out).into_owned())
}
