//! Reading and writing the shared AWS-style config file.
//!
//! The file is kept as a flat list of [`Block`]s holding their raw text, so
//! anything the user wrote survives a read/write cycle byte for byte. Sections
//! written by the sync engine carry a marker comment right below their header:
//!
//! ```text
//! [profile dev]
//! # profile-sync: registry=core profile=dev
//! role_arn = arn:aws:iam::111:role/dev
//! ```

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use regex::Regex;
use tempfile::NamedTempFile;
use crate::error::{RegistryError, Result};

const MARKER_PREFIX: &str = "# profile-sync:";

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#\s*profile-sync:\s*registry=(\S+)\s+profile=(\S+)$").expect("valid marker regex")
});

/// The registry/profile pair a managed section belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    pub registry: String,
    pub profile: String,
}

impl Owner {
    pub fn new(registry: &str, profile: &str) -> Owner {
        Owner {
            registry: registry.to_string(),
            profile: profile.to_string(),
        }
    }

    fn marker(&self) -> String {
        format!("{} registry={} profile={}", MARKER_PREFIX, self.registry, self.profile)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.profile)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// Text outside any section: the preamble, or comments following a managed section.
    Loose,
    /// A section the user wrote.
    Section { header: String },
    /// A section written by the sync engine.
    Managed { header: String, owner: Owner },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    raw: String,
}

impl Block {
    /// Renders a managed section for `effective_name`.
    pub fn managed(owner: Owner, effective_name: &str, attributes: &[(String, String)]) -> Block {
        let header = header_for(effective_name);
        let mut raw = format!("[{header}]\n{}\n", owner.marker());
        for (key, value) in attributes {
            raw.push_str(&format!("{key} = {value}\n"));
        }
        raw.push('\n');
        Block {
            kind: BlockKind::Managed { header, owner },
            raw,
        }
    }

    /// The same section under another profile name. Only the header line changes.
    pub fn renamed(&self, effective_name: &str) -> Block {
        let header = header_for(effective_name);
        let body = self.raw.split_once('\n').map_or("", |(_, body)| body);
        let kind = match &self.kind {
            BlockKind::Managed { owner, .. } => BlockKind::Managed {
                header: header.clone(),
                owner: owner.clone(),
            },
            BlockKind::Section { .. } => BlockKind::Section { header: header.clone() },
            BlockKind::Loose => return self.clone(),
        };
        Block {
            kind,
            raw: format!("[{header}]\n{body}"),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn owner(&self) -> Option<&Owner> {
        match &self.kind {
            BlockKind::Managed { owner, .. } => Some(owner),
            _ => None,
        }
    }

    pub fn is_owned_by(&self, registry: &str) -> bool {
        self.owner().is_some_and(|o| o.registry == registry)
    }

    /// The profile name this block defines, if it is a profile section.
    ///
    /// `[default]` defines `default`, `[profile x]` defines `x`; other headers
    /// such as `[sso-session x]` live in their own namespace.
    pub fn profile_name(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Section { header } | BlockKind::Managed { header, .. } => {
                profile_name_of(header)
            }
            BlockKind::Loose => None,
        }
    }
}

fn header_for(effective_name: &str) -> String {
    if effective_name == "default" {
        "default".to_string()
    } else {
        format!("profile {effective_name}")
    }
}

fn profile_name_of(header: &str) -> Option<&str> {
    if header == "default" {
        return Some("default");
    }
    let rest = header.strip_prefix("profile")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let name = rest.trim();
    (!name.is_empty()).then_some(name)
}

fn parse_header(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('[')?.strip_suffix(']')?;
    Some(inner.trim().to_string())
}

fn parse_marker(line: &str) -> Option<Owner> {
    let caps = MARKER.captures(line.trim())?;
    Some(Owner::new(&caps[1], &caps[2]))
}

/// A `key = value` line.
fn is_setting_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.starts_with('#') && !trimmed.starts_with(';') && trimmed.contains('=')
}

/// Finishes the current block.
///
/// A managed section owns everything up to its last setting plus one blank
/// line; whatever follows in `pending` becomes a loose block.
fn close_block(blocks: &mut Vec<Block>, current: &mut Option<Block>, pending: &mut String) {
    let Some(mut block) = current.take() else {
        return;
    };
    let rest = std::mem::take(pending);
    let blank = rest
        .split_inclusive('\n')
        .next()
        .filter(|line| line.trim().is_empty())
        .map_or(0, str::len);
    block.raw.push_str(&rest[..blank]);
    blocks.push(block);
    if blank < rest.len() {
        blocks.push(Block {
            kind: BlockKind::Loose,
            raw: rest[blank..].to_string(),
        });
    }
}

/// The config file as an ordered arena of blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    blocks: Vec<Block>,
}

impl ConfigFile {
    pub fn new(blocks: Vec<Block>) -> ConfigFile {
        ConfigFile { blocks }
    }

    /// Splits config text into blocks. Never fails: unknown lines are kept as they are.
    pub fn parse(content: &str) -> ConfigFile {
        let mut blocks: Vec<Block> = Vec::new();
        let mut current: Option<Block> = None;
        // lines after the last setting of a managed section
        let mut pending = String::new();
        let mut first_body_line = false;

        for line in content.split_inclusive('\n') {
            if let Some(header) = parse_header(line) {
                close_block(&mut blocks, &mut current, &mut pending);
                current = Some(Block {
                    kind: BlockKind::Section { header },
                    raw: line.to_string(),
                });
                first_body_line = true;
                continue;
            }

            let check_marker = std::mem::take(&mut first_body_line);
            let Some(block) = current.as_mut() else {
                current = Some(Block {
                    kind: BlockKind::Loose,
                    raw: line.to_string(),
                });
                continue;
            };

            if matches!(block.kind, BlockKind::Managed { .. }) {
                // comments between settings stay inside the section
                if is_setting_line(line) {
                    block.raw.push_str(&pending);
                    pending.clear();
                    block.raw.push_str(line);
                } else {
                    pending.push_str(line);
                }
                continue;
            }

            if let Some(owner) = parse_marker(line).filter(|_| check_marker) {
                if let BlockKind::Section { header } = &block.kind {
                    let header = header.clone();
                    block.kind = BlockKind::Managed { header, owner };
                }
            }
            block.raw.push_str(line);
        }
        close_block(&mut blocks, &mut current, &mut pending);
        ConfigFile { blocks }
    }

    /// Reads the config file; a missing file reads as empty.
    ///
    /// # Errors
    /// Returns [`RegistryError::ConfigFileUnreadable`] for any other I/O failure.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<ConfigFile> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(ConfigFile::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
            Err(source) => Err(RegistryError::ConfigFileUnreadable {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Serializes all blocks back into config text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block.raw);
        }
        out
    }

    /// Replaces the file at `path` with the rendered content.
    ///
    /// The content goes to a temporary file next to the target first, which is
    /// then renamed over it, so readers never see a half-written file.
    ///
    /// # Errors
    /// Returns [`RegistryError::ConfigFileUnwritable`] if any step fails.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let unwritable = |source: std::io::Error| RegistryError::ConfigFileUnwritable {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(unwritable)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(unwritable)?;
        tmp.write_all(self.render().as_bytes()).map_err(unwritable)?;
        tmp.flush().map_err(unwritable)?;
        tmp.persist(path).map_err(|e| unwritable(e.error))?;
        Ok(())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether any section of the file was written by the sync engine.
    pub fn has_managed_sections(&self) -> bool {
        self.blocks.iter().any(|b| b.owner().is_some())
    }
}
