// SPDX-License-Identifier: GPL-3.0-only

//! Parsers for the text printed by `btrfs` and `findmnt`.
//!
//! Each parser fails with the offending line rather than returning a partial result.

use std::collections::HashMap;
use std::path::PathBuf;

use storage_types::{BtrfsMountpoint, ROOT_SUBVOLUME_ID};
use tracing::debug;

use crate::error::{BtrfsError, Result};
use crate::path::normalize_subvolume_path;
use crate::subvolume::Subvolume;

/// One filesystem record from `btrfs filesystem show -d`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownFilesystem {
    pub uuid: String,
    pub label: Option<String>,
    pub devices: Vec<PathBuf>,
}

/// Parse `btrfs filesystem show -d` output.
///
/// ```text
/// Label: 'ROOT'  uuid: 2bdcd61d-079f-5f3d-b79e-05b15cc58a46
///         Total devices 1 FS bytes used 8.03GiB
///         devid    1 size 20.00GiB used 10.02GiB path /dev/nvme0n1p4
/// ```
pub fn parse_filesystem_show(output: &str) -> Result<Vec<ShownFilesystem>> {
    let mut filesystems: Vec<ShownFilesystem> = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("Label:") {
            filesystems.push(parse_filesystem_header(line)?);
            continue;
        }

        if line.starts_with("devid") {
            let current = filesystems.last_mut().ok_or_else(|| {
                BtrfsError::parse(line, "device line outside of a filesystem record")
            })?;
            current.devices.push(parse_filesystem_device(line)?);
        }
    }

    debug!("Parsed {} btrfs filesystems", filesystems.len());
    Ok(filesystems)
}

fn parse_filesystem_header(line: &str) -> Result<ShownFilesystem> {
    let rest = line.trim_start_matches("Label:");
    let (label, uuid) = rest
        .rsplit_once("uuid:")
        .ok_or_else(|| BtrfsError::parse(line, "missing uuid"))?;

    let uuid = uuid.trim();
    if uuid.is_empty() {
        return Err(BtrfsError::parse(line, "empty uuid"));
    }

    let label = match label.trim() {
        "none" => None,
        quoted => Some(strip_quotes(quoted).to_string()),
    };

    Ok(ShownFilesystem {
        uuid: uuid.to_string(),
        label,
        devices: Vec::new(),
    })
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(value)
}

fn parse_filesystem_device(line: &str) -> Result<PathBuf> {
    let (_, path) = line
        .split_once(" path ")
        .ok_or_else(|| BtrfsError::parse(line, "missing device path"))?;

    let path = path.trim();
    if path.is_empty() {
        return Err(BtrfsError::parse(line, "empty device path"));
    }

    Ok(PathBuf::from(path))
}

/// Parse `findmnt -t btrfs -nvP` output.
///
/// ```text
/// TARGET="/" SOURCE="/dev/sda1" FSTYPE="btrfs" OPTIONS="rw,subvolid=256,subvol=/@"
/// ```
pub fn parse_findmnt(output: &str) -> Result<Vec<BtrfsMountpoint>> {
    let mut mountpoints = Vec::new();

    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        let fields = parse_pairs(line)?;
        let target = required_field(&fields, "TARGET", line)?;
        let source = required_field(&fields, "SOURCE", line)?;
        let fstype = required_field(&fields, "FSTYPE", line)?;
        let options = parse_mount_options(required_field(&fields, "OPTIONS", line)?);

        if fstype != "btrfs" {
            debug!("Skipping {fstype} mount at {target}");
            continue;
        }

        let subvolume_id = options
            .get("subvolid")
            .copied()
            .flatten()
            .ok_or_else(|| BtrfsError::malformed_mount(line, "missing subvolid option"))?
            .parse::<u64>()
            .map_err(|e| BtrfsError::malformed_mount(line, format!("invalid subvolid: {e}")))?;

        let subvolume_path = options
            .get("subvol")
            .copied()
            .flatten()
            .ok_or_else(|| BtrfsError::malformed_mount(line, "missing subvol option"))?;

        mountpoints.push(BtrfsMountpoint::new(
            target,
            source,
            subvolume_id,
            normalize_subvolume_path(subvolume_path),
        ));
    }

    debug!("Parsed {} btrfs mountpoints", mountpoints.len());
    Ok(mountpoints)
}

/// Split `KEY="value" KEY="value"` pairs; values are unescaped
fn parse_pairs(line: &str) -> Result<HashMap<String, String>> {
    let mut pairs = HashMap::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let (key, after_key) = rest
            .split_once("=\"")
            .ok_or_else(|| BtrfsError::parse(line, "expected KEY=\"value\""))?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(BtrfsError::parse(line, format!("invalid key '{key}'")));
        }

        let (value, after_value) = after_key
            .split_once('"')
            .ok_or_else(|| BtrfsError::parse(line, format!("unterminated value for {key}")))?;

        pairs.insert(key.to_string(), unescape_findmnt_value(value, line)?);
        rest = after_value.trim_start();
    }

    Ok(pairs)
}

fn required_field<'a>(
    fields: &'a HashMap<String, String>,
    key: &str,
    line: &str,
) -> Result<&'a str> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| BtrfsError::parse(line, format!("missing {key} field")))
}

/// Options are `key[=value]` separated by commas
fn parse_mount_options(options: &str) -> HashMap<&str, Option<&str>> {
    options
        .split(',')
        .filter(|option| !option.is_empty())
        .map(|option| match option.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (option, None),
        })
        .collect()
}

/// Unescape `\xNN` sequences `findmnt -P` uses for unsafe bytes (e.g. `\x20` -> ` `).
///
/// Multi-byte characters arrive one escaped byte at a time, so decoding
/// happens on bytes and the result must be valid UTF-8.
fn unescape_findmnt_value(value: &str, line: &str) -> Result<String> {
    let mut output: Vec<u8> = Vec::with_capacity(value.len());
    let mut rest = value;

    while let Some(index) = rest.find("\\x") {
        output.extend_from_slice(rest[..index].as_bytes());
        let escaped = &rest[index + 2..];
        match escaped.get(..2).and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
            Some(byte) => {
                output.push(byte);
                rest = &escaped[2..];
            }
            None => {
                output.extend_from_slice(b"\\x");
                rest = escaped;
            }
        }
    }

    output.extend_from_slice(rest.as_bytes());
    String::from_utf8(output)
        .map_err(|e| BtrfsError::parse(line, format!("escaped value is not UTF-8: {e}")))
}

/// Parse `btrfs subvolume list -tap` output.
///
/// The first two lines are the table header and separator. Columns are
/// tab-separated; id is column 0, parent id column 2 and path column 5.
/// The top-level subvolume is not listed and is always prepended.
pub fn parse_subvolume_list(output: &str) -> Result<Vec<Subvolume>> {
    let mut subvolumes = vec![Subvolume::filesystem_root()];

    for line in output.lines().skip(2) {
        if line.trim().is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 6 {
            return Err(BtrfsError::parse(
                line,
                format!("expected at least 6 columns, found {}", columns.len()),
            ));
        }

        let id = parse_id(line, columns[0], "subvolume id")?;
        let parent = parse_id(line, columns[2], "parent id")?;
        if id == ROOT_SUBVOLUME_ID {
            continue;
        }

        subvolumes.push(Subvolume::new(id, columns[5].trim(), Some(parent)));
    }

    debug!("Parsed {} btrfs subvolumes", subvolumes.len());
    Ok(subvolumes)
}

fn parse_id(line: &str, column: &str, what: &str) -> Result<u64> {
    column
        .trim()
        .parse::<u64>()
        .map_err(|e| BtrfsError::parse(line, format!("invalid {what} '{}': {e}", column.trim())))
}

/// Parse `btrfs subvolume get-default` output, e.g. `ID 256 gen 1234 top level 5 path @`
pub fn parse_default_subvolume_id(output: &str) -> Result<u64> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| BtrfsError::parse(output, "empty default subvolume output"))?;

    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("ID") {
        return Err(BtrfsError::parse(line, "expected 'ID <n>'"));
    }

    let id = tokens
        .next()
        .ok_or_else(|| BtrfsError::parse(line, "missing subvolume id"))?;
    parse_id(line, id, "default subvolume id")
}
