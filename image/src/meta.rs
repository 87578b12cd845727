/*++

Licensed under the Apache-2.0 license.

File Name:

    meta.rs

Abstract:

    File contains the flash image metadata partition: the partition
    offset/size table and firmware version information, stored as two
    newline-terminated JSON documents with an MD5 checksum.

--*/

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::ImageError;

/// Fixed offset of the meta partition in the flash image
pub const META_PART_OFFSET: u64 = 0x000F_0000;

/// Size of the meta partition (one erase block)
pub const META_PART_SIZE: usize = 64 * 1024;

/// Newest meta format version this library understands
pub const SUPPORTED_META_VER: u32 = 1;

/// Partition table entry, read-only once loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartInfo {
    /// Partition name
    pub name: String,

    /// Byte offset in the backing image
    pub offset: u64,

    /// Byte length
    pub size: u64,

    /// Partition type tag ("rom", "raw", "fit", "data", ...)
    #[serde(rename = "type")]
    pub part_type: String,

    /// Expected content checksum, present for fixed-content partitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,

    /// FIT node count, present for fit partitions
    #[serde(rename = "num-nodes", default, skip_serializing_if = "Option::is_none")]
    pub num_nodes: Option<u32>,
}

/// Firmware version information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfos {
    /// Firmware version string
    #[serde(default)]
    pub fw_ver: String,

    /// U-Boot version string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uboot_ver: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MetaDoc {
    #[serde(rename = "FBOBMC_IMAGE_META_VER")]
    meta_ver: u32,
    version_infos: VersionInfos,
    part_infos: Vec<PartInfo>,
}

#[derive(Serialize, Deserialize)]
struct ChecksumDoc {
    meta_md5: String,
}

/// Flash Image Metadata
#[derive(Debug)]
pub struct ImageMeta {
    path: PathBuf,
    meta_ver: u32,
    version_infos: VersionInfos,
    part_infos: Vec<PartInfo>,
}

impl ImageMeta {
    /// Load and verify the meta partition of a flash image
    ///
    /// # Arguments
    ///
    /// * `path` - Flash device or image file
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ImageError> {
        let path = path.into();
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(META_PART_OFFSET))?;
        let mut buf = Vec::with_capacity(META_PART_SIZE);
        file.take(META_PART_SIZE as u64).read_to_end(&mut buf)?;

        let not_found = |reason: &str| ImageError::MetaNotFound {
            path: path.clone(),
            reason: reason.to_string(),
        };

        let mut lines = buf.splitn(3, |&b| b == b'\n');
        let meta_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| not_found("meta partition is empty"))?;
        let checksum_line = lines
            .next()
            .ok_or_else(|| not_found("missing meta checksum line"))?;

        let checksum: ChecksumDoc = serde_json::from_slice(checksum_line)
            .map_err(|e| not_found(&format!("bad checksum line: {e}")))?;
        let computed = hex::encode(Md5::digest(meta_line));
        if !checksum.meta_md5.eq_ignore_ascii_case(&computed) {
            return Err(ImageError::MetaChecksumMismatch {
                expected: checksum.meta_md5,
                computed,
            });
        }

        let doc: MetaDoc = serde_json::from_slice(meta_line)
            .map_err(|e| not_found(&format!("bad meta line: {e}")))?;
        if doc.meta_ver == 0 || doc.meta_ver > SUPPORTED_META_VER {
            return Err(ImageError::UnsupportedMetaVersion(doc.meta_ver));
        }

        log::debug!(
            "loaded image meta ver {} from {}: fw_ver {:?}, {} partitions",
            doc.meta_ver,
            path.display(),
            doc.version_infos.fw_ver,
            doc.part_infos.len()
        );
        Ok(Self {
            path,
            meta_ver: doc.meta_ver,
            version_infos: doc.version_infos,
            part_infos: doc.part_infos,
        })
    }

    /// Backing image path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Meta format version
    pub fn meta_version(&self) -> u32 {
        self.meta_ver
    }

    /// Firmware version string
    pub fn fw_version(&self) -> &str {
        &self.version_infos.fw_ver
    }

    /// Version information block
    pub fn version_infos(&self) -> &VersionInfos {
        &self.version_infos
    }

    /// Look up a partition by name
    pub fn part_info(&self, name: &str) -> Result<&PartInfo, ImageError> {
        self.part_infos
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ImageError::UnknownPartition(name.to_string()))
    }

    /// Partition table in image order
    pub fn part_infos(&self) -> &[PartInfo] {
        &self.part_infos
    }

    /// Encode a meta partition image: the meta document, its checksum
    /// document, each newline-terminated
    pub fn encode(
        version_infos: &VersionInfos,
        part_infos: &[PartInfo],
    ) -> Result<Vec<u8>, ImageError> {
        let doc = MetaDoc {
            meta_ver: SUPPORTED_META_VER,
            version_infos: version_infos.clone(),
            part_infos: part_infos.to_vec(),
        };
        let meta_line = serde_json::to_string(&doc)?;
        let checksum = ChecksumDoc {
            meta_md5: hex::encode(Md5::digest(meta_line.as_bytes())),
        };
        let mut out = meta_line.into_bytes();
        out.push(b'\n');
        out.extend_from_slice(serde_json::to_string(&checksum)?.as_bytes());
        out.push(b'\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_parts() -> Vec<PartInfo> {
        vec![
            PartInfo {
                name: "spl".to_string(),
                offset: 0,
                size: 0x4_0000,
                part_type: "rom".to_string(),
                md5: None,
                num_nodes: None,
            },
            PartInfo {
                name: "u-boot-fit".to_string(),
                offset: 0x8_0000,
                size: 0x6_0000,
                part_type: "fit".to_string(),
                md5: None,
                num_nodes: Some(1),
            },
        ]
    }

    fn write_image(meta: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0xffu8; META_PART_OFFSET as usize])
            .unwrap();
        file.write_all(meta).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_round_trip() {
        let versions = VersionInfos {
            fw_ver: "fw-v2025.08.1".to_string(),
            uboot_ver: Some("2019.04".to_string()),
        };
        let meta = ImageMeta::encode(&versions, &sample_parts()).unwrap();
        let image = write_image(&meta);

        let loaded = ImageMeta::load(image.path()).unwrap();
        assert_eq!(loaded.meta_version(), SUPPORTED_META_VER);
        assert_eq!(loaded.fw_version(), "fw-v2025.08.1");
        let fit = loaded.part_info("u-boot-fit").unwrap();
        assert_eq!(fit.offset, 0x8_0000);
        assert_eq!(fit.size, 0x6_0000);
        assert_eq!(fit.part_type, "fit");
    }

    #[test]
    fn test_unknown_partition() {
        let meta = ImageMeta::encode(&VersionInfos::default(), &sample_parts()).unwrap();
        let image = write_image(&meta);
        let loaded = ImageMeta::load(image.path()).unwrap();
        let err = loaded.part_info("os-fit").unwrap_err();
        assert!(matches!(err, ImageError::UnknownPartition(name) if name == "os-fit"));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut meta = ImageMeta::encode(&VersionInfos::default(), &sample_parts()).unwrap();
        // corrupt one byte of the meta document, keep the checksum line
        let pos = meta.iter().position(|&b| b == b'p').unwrap();
        meta[pos] = b'q';
        let image = write_image(&meta);
        let err = ImageMeta::load(image.path()).unwrap_err();
        assert!(matches!(err, ImageError::MetaChecksumMismatch { .. }));
    }

    #[test]
    fn test_erased_meta_partition() {
        let image = write_image(&[0xffu8; 64]);
        let err = ImageMeta::load(image.path()).unwrap_err();
        assert!(matches!(err, ImageError::MetaNotFound { .. }));
    }
}
