/*++

Licensed under the Apache-2.0 license.

File Name:

    fdt.rs

Abstract:

    File contains a read-only flattened device tree (FDT) parser sufficient
    for FIT firmware images, and a minimal builder used to compose them.

--*/

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

/// FDT header magic
pub const FDT_MAGIC: u32 = 0xd00d_feed;

const FDT_BEGIN_NODE: u32 = 0x1;
const FDT_END_NODE: u32 = 0x2;
const FDT_PROP: u32 = 0x3;
const FDT_NOP: u32 = 0x4;
const FDT_END: u32 = 0x9;

/// Size of the fixed FDT header
const FDT_HEADER_SIZE: usize = 40;

const FDT_VERSION: u32 = 17;
const FDT_LAST_COMP_VERSION: u32 = 16;

/// Device Tree Error
#[derive(Debug, Error)]
pub enum FdtError {
    /// Blob does not start with the FDT magic
    #[error("bad device tree magic: {0:#010x}")]
    BadMagic(u32),

    /// Blob ends before the structure it declares
    #[error("truncated device tree at offset {0:#x}")]
    Truncated(usize),

    /// Unexpected structure token
    #[error("bad device tree token {token:#x} at offset {offset:#x}")]
    BadToken { offset: usize, token: u32 },

    /// No node or property at the requested path
    #[error("device tree path not found: {0}")]
    PathNotFound(String),

    /// Property value has the wrong shape for the requested type
    #[error("bad device tree value for {0}")]
    BadValue(String),

    /// I/O failure while reading the tree from a file
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Device Tree Property
#[derive(Debug, Clone)]
pub struct FdtProp {
    name: String,
    value: Vec<u8>,
    image_offset: u64,
}

impl FdtProp {
    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw property value
    pub fn raw(&self) -> &[u8] {
        &self.value
    }

    /// Property value as a single big-endian 32-bit cell
    pub fn as_u32(&self) -> Result<u32, FdtError> {
        let bytes: [u8; 4] = self.value[..]
            .try_into()
            .map_err(|_| FdtError::BadValue(self.name.clone()))?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Property value as a NUL-terminated string
    pub fn as_str(&self) -> Result<&str, FdtError> {
        let value = self.value.strip_suffix(&[0]).unwrap_or(&self.value);
        std::str::from_utf8(value).map_err(|_| FdtError::BadValue(self.name.clone()))
    }

    /// Absolute offset and length of the property value in the backing image
    pub fn blob_info(&self) -> (u64, u64) {
        (self.image_offset, self.value.len() as u64)
    }
}

/// Device Tree Node
#[derive(Debug, Clone, Default)]
pub struct FdtNode {
    name: String,
    props: Vec<FdtProp>,
    children: Vec<FdtNode>,
}

impl FdtNode {
    /// Node name (empty for the root node)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find a direct child node by name
    pub fn child(&self, name: &str) -> Option<&FdtNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Find a property of this node by name
    pub fn prop(&self, name: &str) -> Option<&FdtProp> {
        self.props.iter().find(|p| p.name == name)
    }

    /// Child nodes in declaration order
    pub fn children(&self) -> &[FdtNode] {
        &self.children
    }
}

/// Flattened Device Tree
#[derive(Debug)]
pub struct Fdt {
    root: FdtNode,
    total_size: u32,
}

impl Fdt {
    /// Parse a device tree blob
    ///
    /// # Arguments
    ///
    /// * `blob`        - Device tree bytes, starting at the FDT header
    /// * `base_offset` - Byte offset of `blob` inside the backing image;
    ///                   recorded so property values can be located in the
    ///                   image without reparsing
    pub fn parse(blob: &[u8], base_offset: u64) -> Result<Self, FdtError> {
        let magic = be32(blob, 0)?;
        if magic != FDT_MAGIC {
            return Err(FdtError::BadMagic(magic));
        }
        let total_size = be32(blob, 4)?;
        let off_struct = be32(blob, 8)? as usize;
        let off_strings = be32(blob, 12)? as usize;

        let mut cursor = off_struct;
        let mut stack: Vec<FdtNode> = Vec::new();
        let mut root: Option<FdtNode> = None;

        loop {
            let token_offset = cursor;
            let token = be32(blob, cursor)?;
            cursor += 4;
            match token {
                FDT_BEGIN_NODE => {
                    let name = cstr(blob, cursor)?;
                    cursor = align4(cursor + name.len() + 1);
                    stack.push(FdtNode {
                        name: name.to_string(),
                        ..Default::default()
                    });
                }
                FDT_PROP => {
                    let len = be32(blob, cursor)? as usize;
                    let name_off = be32(blob, cursor + 4)? as usize;
                    cursor += 8;
                    let value = blob
                        .get(cursor..cursor + len)
                        .ok_or(FdtError::Truncated(cursor))?;
                    let prop = FdtProp {
                        name: cstr(blob, off_strings + name_off)?.to_string(),
                        value: value.to_vec(),
                        image_offset: base_offset + cursor as u64,
                    };
                    cursor = align4(cursor + len);
                    stack
                        .last_mut()
                        .ok_or(FdtError::BadToken {
                            offset: token_offset,
                            token,
                        })?
                        .props
                        .push(prop);
                }
                FDT_END_NODE => {
                    let node = stack.pop().ok_or(FdtError::BadToken {
                        offset: token_offset,
                        token,
                    })?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => root = Some(node),
                    }
                }
                FDT_NOP => {}
                FDT_END => break,
                _ => {
                    return Err(FdtError::BadToken {
                        offset: token_offset,
                        token,
                    })
                }
            }
        }

        if !stack.is_empty() {
            return Err(FdtError::Truncated(cursor));
        }
        let root = root.ok_or(FdtError::Truncated(cursor))?;
        log::debug!(
            "parsed device tree: {} bytes, {} top-level nodes",
            total_size,
            root.children.len()
        );
        Ok(Self { root, total_size })
    }

    /// Parse a device tree embedded in a file
    ///
    /// Reads the header at `offset` to discover the declared total size,
    /// then reads and parses exactly that many bytes.
    pub fn parse_file(path: &Path, offset: u64) -> Result<Self, FdtError> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; FDT_HEADER_SIZE];
        file.read_exact(&mut header)?;

        let magic = be32(&header, 0)?;
        if magic != FDT_MAGIC {
            return Err(FdtError::BadMagic(magic));
        }
        let total_size = be32(&header, 4)? as usize;
        if total_size < FDT_HEADER_SIZE {
            return Err(FdtError::Truncated(total_size));
        }

        let mut blob = vec![0u8; total_size];
        blob[..FDT_HEADER_SIZE].copy_from_slice(&header);
        file.read_exact(&mut blob[FDT_HEADER_SIZE..])?;
        Self::parse(&blob, offset)
    }

    /// Declared total size of the tree
    pub fn total_size(&self) -> u64 {
        self.total_size as u64
    }

    /// Root node
    pub fn root(&self) -> &FdtNode {
        &self.root
    }

    /// Resolve a node by absolute path, e.g. `/images/kernel@1`
    pub fn node(&self, path: &str) -> Result<&FdtNode, FdtError> {
        let mut node = &self.root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node
                .child(segment)
                .ok_or_else(|| FdtError::PathNotFound(path.to_string()))?;
        }
        Ok(node)
    }

    /// Resolve a property by absolute path, e.g. `/images/kernel@1/hash@1/value`
    pub fn prop(&self, path: &str) -> Result<&FdtProp, FdtError> {
        let (node_path, prop_name) = path
            .rsplit_once('/')
            .ok_or_else(|| FdtError::PathNotFound(path.to_string()))?;
        self.node(node_path)?
            .prop(prop_name)
            .ok_or_else(|| FdtError::PathNotFound(path.to_string()))
    }
}

fn be32(blob: &[u8], offset: usize) -> Result<u32, FdtError> {
    let bytes = blob
        .get(offset..offset + 4)
        .ok_or(FdtError::Truncated(offset))?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn cstr(blob: &[u8], offset: usize) -> Result<&str, FdtError> {
    let tail = blob.get(offset..).ok_or(FdtError::Truncated(offset))?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(FdtError::Truncated(offset))?;
    std::str::from_utf8(&tail[..end]).map_err(|_| FdtError::Truncated(offset))
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Device Tree Builder
///
/// Writes version 17 trees with an empty memory reservation map. The
/// counterpart of [`Fdt::parse`], used to compose FIT fixtures and images.
#[derive(Default)]
pub struct Builder {
    structure: Vec<u8>,
    strings: Vec<u8>,
    string_offsets: HashMap<String, u32>,
    depth: usize,
}

impl Builder {
    /// Create a builder with the root node open
    pub fn new() -> Self {
        let mut builder = Self::default();
        builder.push_token(FDT_BEGIN_NODE);
        builder.push_name("");
        builder
    }

    /// Open a child node
    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        self.push_token(FDT_BEGIN_NODE);
        self.push_name(name);
        self.depth += 1;
        self
    }

    /// Close the current node
    pub fn end_node(&mut self) -> &mut Self {
        assert!(self.depth > 0, "end_node without matching begin_node");
        self.push_token(FDT_END_NODE);
        self.depth -= 1;
        self
    }

    /// Add a raw byte property to the current node
    pub fn prop_bytes(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let name_off = self.string_offset(name);
        self.push_token(FDT_PROP);
        self.structure
            .extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.structure.extend_from_slice(&name_off.to_be_bytes());
        self.structure.extend_from_slice(value);
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
        self
    }

    /// Add a single-cell property to the current node
    pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop_bytes(name, &value.to_be_bytes())
    }

    /// Add a NUL-terminated string property to the current node
    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.prop_bytes(name, &bytes)
    }

    /// Close the root node and serialize the tree
    pub fn finish(mut self) -> Vec<u8> {
        assert_eq!(self.depth, 0, "finish with unclosed nodes");
        self.push_token(FDT_END_NODE);
        self.push_token(FDT_END);

        // header, then an empty (terminator-only) reservation map
        let off_mem_rsvmap = FDT_HEADER_SIZE as u32;
        let off_dt_struct = off_mem_rsvmap + 16;
        let off_dt_strings = off_dt_struct + self.structure.len() as u32;
        let total_size = off_dt_strings + self.strings.len() as u32;

        let mut blob = Vec::with_capacity(total_size as usize);
        for field in [
            FDT_MAGIC,
            total_size,
            off_dt_struct,
            off_dt_strings,
            off_mem_rsvmap,
            FDT_VERSION,
            FDT_LAST_COMP_VERSION,
            0, // boot_cpuid_phys
            self.strings.len() as u32,
            self.structure.len() as u32,
        ] {
            blob.extend_from_slice(&field.to_be_bytes());
        }
        blob.extend_from_slice(&[0u8; 16]);
        blob.extend_from_slice(&self.structure);
        blob.extend_from_slice(&self.strings);
        blob
    }

    fn push_token(&mut self, token: u32) {
        self.structure.extend_from_slice(&token.to_be_bytes());
    }

    fn push_name(&mut self, name: &str) {
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        if let Some(&off) = self.string_offsets.get(name) {
            return off;
        }
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        self.string_offsets.insert(name.to_string(), off);
        off
    }
}
