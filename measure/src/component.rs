/*++

Licensed under the Apache-2.0 license.

File Name:

    component.rs

Abstract:

    File contains the table-driven component measurement engine: one
    parameterized routine over a component descriptor, covering the plain
    partition hashes, the embedded-hash indirections for u-boot and the OS
    chain, and the recalculation integrity check.

--*/

use std::path::Path;

use mboot_image::{vbs, Fdt, ImageMeta, PartInfo};

use crate::{hash_range, HashAlgo, MeasureConfig, MeasureError, Pcr};

/// Size of the u-boot FIT header region; it holds the key-store and the
/// signed u-boot hash, and the u-boot payload starts right after it
pub const UBOOT_FIT_HEADER_SIZE: u64 = 0x4000;

/// Size of the synthetic pre-first-boot u-boot environment
pub const BLANK_UBOOT_ENV_SIZE: usize = 64 * 1024;

/// OS FIT sub-components in mandated chain order
pub const OS_SUB_COMPONENTS: [&str; 3] = ["kernel", "ramdisk", "fdt"];

/// Component byte source
#[derive(Debug, Clone, Copy)]
pub enum ComponentKind {
    /// Full partition content
    Partition { part: &'static str },

    /// Fixed-size prefix of a partition, regardless of the partition size
    PartitionPrefix { part: &'static str, len: u64 },

    /// The signed u-boot hash embedded in the u-boot FIT header
    UbootFit,

    /// A synthetic all-zero buffer, no file read
    ZeroFill { len: usize },

    /// The verified-boot status structure
    VbsStruct,

    /// The three signed hashes embedded in an OS FIT, chained in order
    OsFit { part: &'static str },
}

/// Component Descriptor
#[derive(Debug, Clone, Copy)]
pub struct ComponentDesc {
    /// Component name as reported
    pub name: &'static str,

    /// Register the component extends
    pub pcr_id: u8,

    /// Byte source
    pub kind: ComponentKind,
}

pub const SPL: ComponentDesc = ComponentDesc {
    name: "spl",
    pcr_id: 0,
    kind: ComponentKind::Partition { part: "spl" },
};

pub const KEY_STORE: ComponentDesc = ComponentDesc {
    name: "key-store",
    pcr_id: 1,
    kind: ComponentKind::PartitionPrefix {
        part: "u-boot-fit",
        len: UBOOT_FIT_HEADER_SIZE,
    },
};

pub const UBOOT: ComponentDesc = ComponentDesc {
    name: "u-boot",
    pcr_id: 2,
    kind: ComponentKind::UbootFit,
};

pub const UBOOT_ENV: ComponentDesc = ComponentDesc {
    name: "u-boot-env",
    pcr_id: 3,
    kind: ComponentKind::Partition { part: "u-boot-env" },
};

pub const BLANK_UBOOT_ENV: ComponentDesc = ComponentDesc {
    name: "blank-u-boot-env",
    pcr_id: 3,
    kind: ComponentKind::ZeroFill {
        len: BLANK_UBOOT_ENV_SIZE,
    },
};

// measured instead of u-boot when booting the golden image; never shares a
// register instance with the primary u-boot
pub const REC_UBOOT: ComponentDesc = ComponentDesc {
    name: "rec-u-boot",
    pcr_id: 2,
    kind: ComponentKind::Partition { part: "rec-u-boot" },
};

pub const VBS: ComponentDesc = ComponentDesc {
    name: "vbs",
    pcr_id: 5,
    kind: ComponentKind::VbsStruct,
};

pub const OS: ComponentDesc = ComponentDesc {
    name: "os",
    pcr_id: 9,
    kind: ComponentKind::OsFit { part: "os-fit" },
};

pub const REC_OS: ComponentDesc = ComponentDesc {
    name: "rec-os",
    pcr_id: 9,
    kind: ComponentKind::OsFit { part: "os-fit" },
};

/// Measurement Environment
///
/// The seam between the engine and the image container: the backing image,
/// its partition table, and the live verified-boot status.
pub trait MeasureEnv {
    /// Backing image path
    fn image_path(&self) -> &Path;

    /// Partition offset/size lookup
    fn part_info(&self, name: &str) -> Result<PartInfo, MeasureError>;

    /// Raw verified-boot status bytes
    fn read_vbs(&self) -> Result<Vec<u8>, MeasureError>;
}

impl MeasureEnv for ImageMeta {
    fn image_path(&self) -> &Path {
        self.path()
    }

    fn part_info(&self, name: &str) -> Result<PartInfo, MeasureError> {
        Ok(ImageMeta::part_info(self, name)?.clone())
    }

    fn read_vbs(&self) -> Result<Vec<u8>, MeasureError> {
        Ok(vbs::read_vbs()?)
    }
}

/// Unchained component measurement, as used by the allow-list generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMeasurement {
    /// Single chain input
    Single(Vec<u8>),

    /// The three OS chain inputs, in chain order
    OsChain {
        kernel: Vec<u8>,
        ramdisk: Vec<u8>,
        fdt: Vec<u8>,
    },
}

/// Component Measurement Engine
pub struct Measurer<'a, Env: MeasureEnv> {
    env: &'a Env,
    cfg: MeasureConfig,
}

impl<'a, Env: MeasureEnv> Measurer<'a, Env> {
    /// Create a new instance of `Measurer`
    ///
    /// # Arguments
    ///
    /// * `env` - Measurement environment
    /// * `cfg` - Report algorithm and recalculation switch
    pub fn new(env: &'a Env, cfg: MeasureConfig) -> Self {
        Self { env, cfg }
    }

    /// Measure a component into a fresh register and return the chained
    /// register value
    pub fn measure(&self, desc: &ComponentDesc) -> Result<Vec<u8>, MeasureError> {
        let inputs = self.chain_inputs(desc)?;
        let mut pcr = Pcr::new(self.cfg.algo);
        for input in &inputs {
            pcr.extend(input);
        }
        log::debug!(
            "measured {} into pcr{}: [{}]",
            desc.name,
            desc.pcr_id,
            hex::encode(pcr.value())
        );
        Ok(pcr.value().to_vec())
    }

    /// Measure a component without chaining and return the raw chain
    /// input(s), as the allow-list generator consumes them
    pub fn measure_raw(&self, desc: &ComponentDesc) -> Result<RawMeasurement, MeasureError> {
        let mut inputs = self.chain_inputs(desc)?;
        match desc.kind {
            ComponentKind::OsFit { .. } => match <[Vec<u8>; 3]>::try_from(inputs) {
                Ok([kernel, ramdisk, fdt]) => Ok(RawMeasurement::OsChain {
                    kernel,
                    ramdisk,
                    fdt,
                }),
                Err(_) => unreachable!("os chain always yields three inputs"),
            },
            _ => match inputs.pop() {
                Some(input) => Ok(RawMeasurement::Single(input)),
                None => unreachable!("every component yields a chain input"),
            },
        }
    }

    /// Compute the register chain inputs for a component, in extend order
    fn chain_inputs(&self, desc: &ComponentDesc) -> Result<Vec<Vec<u8>>, MeasureError> {
        let algo = self.cfg.algo;
        match desc.kind {
            ComponentKind::Partition { part } => {
                let part = self.env.part_info(part)?;
                let digest =
                    hash_range(self.env.image_path(), part.offset, part.size, algo)?;
                Ok(vec![digest])
            }
            ComponentKind::PartitionPrefix { part, len } => {
                let part = self.env.part_info(part)?;
                let digest = hash_range(self.env.image_path(), part.offset, len, algo)?;
                Ok(vec![digest])
            }
            ComponentKind::UbootFit => Ok(vec![self.uboot_chain_input(desc)?]),
            ComponentKind::ZeroFill { len } => Ok(vec![algo.digest(&vec![0u8; len])]),
            ComponentKind::VbsStruct => Ok(vec![algo.digest(&self.env.read_vbs()?)]),
            ComponentKind::OsFit { part } => self.os_chain_inputs(desc, part),
        }
    }

    /// Chain input for u-boot: the report hash of the signed hash embedded
    /// in the FIT header, one level removed from the content so the SPL
    /// measurement code stays decoupled from the report algorithm
    fn uboot_chain_input(&self, desc: &ComponentDesc) -> Result<Vec<u8>, MeasureError> {
        let fit = self.env.part_info("u-boot-fit")?;
        // the signed metadata lives entirely inside the fixed-size header
        let header = crate::read_range(
            self.env.image_path(),
            fit.offset,
            UBOOT_FIT_HEADER_SIZE,
        )?;
        let fdt = Fdt::parse(&header, fit.offset)?;

        let size = fdt.prop("/images/firmware@1/data-size")?.as_u32()? as u64;
        let embedded = fdt.prop("/images/firmware@1/hash@1/value")?.raw().to_vec();
        let fit_algo = fdt.prop("/images/firmware@1/hash@1/algo")?.as_str()?.to_string();

        if self.cfg.recalc {
            // the FIT signature algorithm is independent of the report and
            // register algorithms
            let fit_algo = HashAlgo::from_name(&fit_algo)?;
            let measured = hash_range(
                self.env.image_path(),
                fit.offset + UBOOT_FIT_HEADER_SIZE,
                size,
                fit_algo,
            )?;
            if measured != embedded {
                return Err(MeasureError::ImageIntegrity {
                    component: desc.name.to_string(),
                    size,
                    expected: hex::encode(&embedded),
                    measured: hex::encode(&measured),
                });
            }
        }

        Ok(self.cfg.algo.digest(&embedded))
    }

    /// Chain inputs for the OS FIT: the report hash of each signed
    /// sub-component hash, in the fixed order kernel, ramdisk, fdt
    fn os_chain_inputs(
        &self,
        desc: &ComponentDesc,
        part: &str,
    ) -> Result<Vec<Vec<u8>>, MeasureError> {
        let fit = self.env.part_info(part)?;
        let fdt = Fdt::parse_file(self.env.image_path(), fit.offset)?;

        let mut inputs = Vec::with_capacity(OS_SUB_COMPONENTS.len());
        for sub in OS_SUB_COMPONENTS {
            let embedded = fdt
                .prop(&format!("/images/{sub}@1/hash@1/value"))?
                .raw()
                .to_vec();
            let fit_algo = fdt
                .prop(&format!("/images/{sub}@1/hash@1/algo"))?
                .as_str()?
                .to_string();
            let (data_offset, data_size) =
                fdt.prop(&format!("/images/{sub}@1/data"))?.blob_info();

            if self.cfg.recalc {
                let fit_algo = HashAlgo::from_name(&fit_algo)?;
                let measured =
                    hash_range(self.env.image_path(), data_offset, data_size, fit_algo)?;
                if measured != embedded {
                    return Err(MeasureError::ImageIntegrity {
                        component: format!("{}.{sub}", desc.name),
                        size: data_size,
                        expected: hex::encode(&embedded),
                        measured: hex::encode(&measured),
                    });
                }
            }

            inputs.push(self.cfg.algo.digest(&embedded));
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;

    struct FakeEnv {
        path: PathBuf,
        parts: HashMap<&'static str, PartInfo>,
        vbs: Vec<u8>,
    }

    impl MeasureEnv for FakeEnv {
        fn image_path(&self) -> &Path {
            &self.path
        }

        fn part_info(&self, name: &str) -> Result<PartInfo, MeasureError> {
            self.parts.get(name).cloned().ok_or_else(|| {
                MeasureError::Image(mboot_image::ImageError::UnknownPartition(name.to_string()))
            })
        }

        fn read_vbs(&self) -> Result<Vec<u8>, MeasureError> {
            Ok(self.vbs.clone())
        }
    }

    fn part(name: &str, offset: u64, size: u64) -> PartInfo {
        PartInfo {
            name: name.to_string(),
            offset,
            size,
            part_type: "raw".to_string(),
            md5: None,
            num_nodes: None,
        }
    }

    fn cfg(algo: HashAlgo) -> MeasureConfig {
        MeasureConfig {
            algo,
            recalc: false,
        }
    }

    fn spl_env(content: &[u8]) -> (tempfile::NamedTempFile, FakeEnv) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        let env = FakeEnv {
            path: file.path().to_path_buf(),
            parts: HashMap::from([("spl", part("spl", 0, content.len() as u64))]),
            vbs: vec![0x11; 56],
        };
        (file, env)
    }

    #[test]
    fn test_measure_spl_extends_zero_register() {
        let (_file, env) = spl_env(b"ABC");
        let value = Measurer::new(&env, cfg(HashAlgo::Sha256))
            .measure(&SPL)
            .unwrap();

        // sha256(32 zero bytes || sha256(b"ABC"))
        assert_eq!(
            hex::encode(value),
            "7198f6a012eed119e684456ea8488f45f3d245a4118d05b01f98a7efa0014250"
        );
    }

    #[test]
    fn test_measure_raw_is_unchained() {
        let (_file, env) = spl_env(b"ABC");
        let raw = Measurer::new(&env, cfg(HashAlgo::Sha256))
            .measure_raw(&SPL)
            .unwrap();
        assert_eq!(
            raw,
            RawMeasurement::Single(HashAlgo::Sha256.digest(b"ABC"))
        );
    }

    #[test]
    fn test_blank_uboot_env() {
        let (_file, env) = spl_env(b"unused");
        let measurer = Measurer::new(&env, cfg(HashAlgo::Sha256));
        let value = measurer.measure(&BLANK_UBOOT_ENV).unwrap();

        let mut pcr = Pcr::new(HashAlgo::Sha256);
        pcr.extend(&HashAlgo::Sha256.digest(&[0u8; BLANK_UBOOT_ENV_SIZE]));
        assert_eq!(value, pcr.value());
        // anchored: sha256(64 KiB zeros) extended into a zero register
        assert_eq!(
            hex::encode(pcr.value()),
            "0a559d620b5414cb52aad1f23e65ab6f66fcd4db03379db2f8d79fa79d4d46ce"
        );
    }

    #[test]
    fn test_measure_vbs() {
        let (_file, env) = spl_env(b"unused");
        let value = Measurer::new(&env, cfg(HashAlgo::Sha1)).measure(&VBS).unwrap();
        let mut pcr = Pcr::new(HashAlgo::Sha1);
        pcr.extend(&HashAlgo::Sha1.digest(&[0x11; 56]));
        assert_eq!(value, pcr.value());
    }

    #[test]
    fn test_unknown_partition_aborts() {
        let (_file, env) = spl_env(b"ABC");
        let err = Measurer::new(&env, cfg(HashAlgo::Sha256))
            .measure(&UBOOT_ENV)
            .unwrap_err();
        assert!(matches!(
            err,
            MeasureError::Image(mboot_image::ImageError::UnknownPartition(_))
        ));
    }

    #[test]
    fn test_partition_truncated_aborts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"short").unwrap();
        file.flush().unwrap();
        let env = FakeEnv {
            path: file.path().to_path_buf(),
            parts: HashMap::from([("spl", part("spl", 0, 4096))]),
            vbs: Vec::new(),
        };
        let err = Measurer::new(&env, cfg(HashAlgo::Sha256))
            .measure(&SPL)
            .unwrap_err();
        assert!(matches!(err, MeasureError::TruncatedRead { .. }));
    }
}
