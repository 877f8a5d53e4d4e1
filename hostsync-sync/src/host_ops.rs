//! Host command vocabulary for the sync engine.
//!
//! Each builder returns the argv for one host-side step; parsing helpers read
//! back the output of the probing commands. Programs are addressed by
//! absolute path so the host's `PATH` never matters.

use std::path::Path;

use hostsync_exec::HostCommand;

pub const SHA256SUM: &str = "/usr/bin/sha256sum";
pub const STAT: &str = "/usr/bin/stat";
pub const MKDIR: &str = "/bin/mkdir";
pub const RM: &str = "/bin/rm";
pub const SH: &str = "/bin/sh";
pub const CHMOD: &str = "/bin/chmod";
pub const CHOWN: &str = "/bin/chown";
pub const MV: &str = "/bin/mv";

/// `stat` format: octal mode, owner name, group name.
const STAT_FORMAT: &str = "%a %U %G";

/// Mode for target directories created on the host.
pub const DIR_MODE: u32 = 0o755;

/// Mode, owner and group of a host file as reported by `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttrs {
    pub mode: u32,
    pub owner: String,
    pub group: String,
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn fingerprint(path: &Path) -> HostCommand {
    HostCommand::new([SHA256SUM.to_owned(), "--".to_owned(), arg(path)])
}

pub fn attributes(path: &Path) -> HostCommand {
    HostCommand::new([
        STAT.to_owned(),
        "-c".to_owned(),
        STAT_FORMAT.to_owned(),
        "--".to_owned(),
        arg(path),
    ])
}

pub fn make_dir(dir: &Path) -> HostCommand {
    HostCommand::new([
        MKDIR.to_owned(),
        "-p".to_owned(),
        "-m".to_owned(),
        format!("{DIR_MODE:o}"),
        "--".to_owned(),
        arg(dir),
    ])
}

pub fn remove(path: &Path) -> HostCommand {
    HostCommand::new([RM.to_owned(), "-f".to_owned(), "--".to_owned(), arg(path)])
}

/// Stream `bytes` into `path` on the host.
///
/// The path travels as a positional parameter rather than being spliced
/// into the script, so no shell quoting is involved.
pub fn write_stream(path: &Path, bytes: Vec<u8>) -> HostCommand {
    HostCommand::new([
        SH.to_owned(),
        "-c".to_owned(),
        r#"cat > "$1""#.to_owned(),
        "hostsync-write".to_owned(),
        arg(path),
    ])
    .with_stdin(bytes)
}

pub fn set_mode(path: &Path, mode: u32) -> HostCommand {
    HostCommand::new([
        CHMOD.to_owned(),
        format!("{:o}", mode & 0o7777),
        "--".to_owned(),
        arg(path),
    ])
}

pub fn set_owner(path: &Path, owner: &str, group: &str) -> HostCommand {
    HostCommand::new([
        CHOWN.to_owned(),
        format!("{owner}:{group}"),
        "--".to_owned(),
        arg(path),
    ])
}

/// Replace `to` with `from`. `-T` keeps a directory at `to` from swallowing
/// the file.
pub fn rename(from: &Path, to: &Path) -> HostCommand {
    HostCommand::new([
        MV.to_owned(),
        "-f".to_owned(),
        "-T".to_owned(),
        "--".to_owned(),
        arg(from),
        arg(to),
    ])
}

/// First token of `sha256sum` output, if it is a 64-digit hex digest.
pub fn parse_fingerprint(stdout: &str) -> Option<String> {
    let digest = stdout.split_whitespace().next()?.trim_start_matches('\\');
    if digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(digest.to_ascii_lowercase())
    } else {
        None
    }
}

/// Parse `"<octal mode> <owner> <group>"`.
pub fn parse_attributes(stdout: &str) -> Option<FileAttrs> {
    let mut parts = stdout.split_whitespace();
    let mode = u32::from_str_radix(parts.next()?, 8).ok()?;
    let owner = parts.next()?.to_owned();
    let group = parts.next()?.to_owned();
    Some(FileAttrs { mode, owner, group })
}
