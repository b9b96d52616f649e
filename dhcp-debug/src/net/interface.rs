//! Network interface lookup via sysfs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SYS_CLASS_NET: &str = "/sys/class/net";

/// A named network interface the endpoint binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub index: u32,
    pub mac: [u8; 6],
}

impl Interface {
    /// Resolve an interface by name.
    pub fn by_name(name: &str) -> io::Result<Self> {
        Self::from_sysfs(Path::new(SYS_CLASS_NET), name)
    }

    fn from_sysfs(root: &Path, name: &str) -> io::Result<Self> {
        // Names with path separators would escape the sysfs directory.
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid interface name: {name:?}"),
            ));
        }

        let dir: PathBuf = root.join(name);
        if !dir.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such interface: {name}"),
            ));
        }

        let index = read_interface_index(&dir)?;
        let mac = read_mac_address(&dir)?;

        Ok(Self {
            name: name.to_string(),
            index,
            mac,
        })
    }
}

fn read_interface_index(dir: &Path) -> io::Result<u32> {
    let index_str = fs::read_to_string(dir.join("ifindex"))?;
    index_str
        .trim()
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid interface index"))
}

fn read_mac_address(dir: &Path) -> io::Result<[u8; 6]> {
    let mac_str = fs::read_to_string(dir.join("address"))?;
    parse_mac_address(mac_str.trim())
}

pub fn parse_mac_address(s: &str) -> io::Result<[u8; 6]> {
    let invalid = || {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid MAC address: {s}"),
        )
    };

    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(invalid());
    }

    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        mac[i] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }

    Ok(mac)
}
