use std::{ffi::CString, mem};

use object::{elf::SHT_SYMTAB, Endian, Endianness};

use super::{ParseError, Section};
use crate::bpf_map_def;

const KERNEL_VERSION_ANY: u32 = 0xFFFF_FFFE;

/// The longest license string accepted, including the NULL terminator.
pub const LICENSE_MAX_LEN: usize = 128;

/// The fixed size of one record in the `maps` section.
pub const MAP_DEF_SIZE: usize = mem::size_of::<bpf_map_def>();

/// What a metadata section contributes to the load.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataSection {
    License(CString),
    Version(KernelVersion),
    Maps(Vec<bpf_map_def>),
    SymbolTable,
}

/// Classifies `section` by name and type, parsing its content when it is one
/// of the metadata sections. Returns `Ok(None)` for every other section.
pub(crate) fn parse_metadata_section(
    section: &Section,
    endianness: Endianness,
) -> Result<Option<MetadataSection>, ParseError> {
    Ok(Some(match section.name.as_str() {
        "license" => MetadataSection::License(parse_license(&section.data)?),
        "version" => MetadataSection::Version(parse_version(&section.data, endianness)?),
        "maps" => MetadataSection::Maps(parse_map_defs(&section.data, endianness)),
        _ if section.kind == SHT_SYMTAB => MetadataSection::SymbolTable,
        _ => return Ok(None),
    }))
}

/// Parses the content of the `license` section.
///
/// The string ends at the first NULL byte, if any.
pub fn parse_license(data: &[u8]) -> Result<CString, ParseError> {
    if data.len() > LICENSE_MAX_LEN {
        return Err(ParseError::InvalidLicense {
            data: data.to_vec(),
        });
    }

    let len = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    CString::new(&data[..len]).map_err(|_| ParseError::InvalidLicense {
        data: data.to_vec(),
    })
}

/// Parses the content of the `version` section, which must be exactly one
/// 32 bit word.
pub fn parse_version(data: &[u8], endianness: Endianness) -> Result<KernelVersion, ParseError> {
    let data: [u8; 4] = data
        .try_into()
        .map_err(|_| ParseError::InvalidKernelVersion {
            data: data.to_vec(),
        })?;

    Ok(match endianness.read_u32_bytes(data) {
        KERNEL_VERSION_ANY => KernelVersion::Any,
        v => KernelVersion::Version(v),
    })
}

/// Parses the `maps` section as a packed array of [`bpf_map_def`] records.
///
/// Trailing bytes that don't form a whole record are ignored.
pub fn parse_map_defs(data: &[u8], endianness: Endianness) -> Vec<bpf_map_def> {
    data.chunks_exact(MAP_DEF_SIZE)
        .map(|record| {
            let field = |i: usize| {
                let b = &record[i * 4..i * 4 + 4];
                endianness.read_u32_bytes([b[0], b[1], b[2], b[3]])
            };
            bpf_map_def {
                map_type: field(0),
                key_size: field(1),
                value_size: field(2),
                max_entries: field(3),
                map_flags: field(4),
            }
        })
        .collect()
}

/// The kernel version programs are submitted with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelVersion {
    Version(u32),
    Any,
}

/// Objects without a `version` section are submitted with version 0.
impl Default for KernelVersion {
    fn default() -> Self {
        KernelVersion::Version(0)
    }
}

impl From<KernelVersion> for u32 {
    fn from(version: KernelVersion) -> u32 {
        match version {
            KernelVersion::Any => KERNEL_VERSION_ANY,
            KernelVersion::Version(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use object::{
        elf::{SHT_PROGBITS, SHT_SYMTAB},
        Endianness,
    };

    use super::*;
    use crate::{
        generated::bpf_map_type::{BPF_MAP_TYPE_ARRAY, BPF_MAP_TYPE_HASH},
        test_utils::{map_def_bytes, section},
    };

    #[test]
    fn test_parse_license() {
        assert_eq!(parse_license(b"GPL\0").unwrap().to_str().unwrap(), "GPL");
        assert_eq!(parse_license(b"GPL").unwrap().to_str().unwrap(), "GPL");
        assert_eq!(parse_license(b"GPL\0junk").unwrap().to_str().unwrap(), "GPL");
        assert_eq!(parse_license(b"").unwrap().to_bytes(), b"");

        let long = vec![b'a'; LICENSE_MAX_LEN + 1];
        assert_matches!(parse_license(&long), Err(ParseError::InvalidLicense { .. }));
        let max = vec![b'a'; LICENSE_MAX_LEN];
        assert_eq!(parse_license(&max).unwrap().to_bytes().len(), LICENSE_MAX_LEN);
    }

    #[test]
    fn test_kernel_version_default() {
        assert_eq!(KernelVersion::default(), KernelVersion::Version(0));
        assert_eq!(u32::from(KernelVersion::default()), 0);
        assert_eq!(u32::from(KernelVersion::Any), 0xFFFF_FFFE);
    }

    #[test]
    fn test_parse_version() {
        assert_matches!(
            parse_version(b"", Endianness::Little),
            Err(ParseError::InvalidKernelVersion { .. })
        );

        assert_matches!(
            parse_version(b"123", Endianness::Little),
            Err(ParseError::InvalidKernelVersion { data }) if data == b"123"
        );

        assert_matches!(
            parse_version(b"12345", Endianness::Little),
            Err(ParseError::InvalidKernelVersion { .. })
        );

        assert_eq!(
            parse_version(&0xFFFF_FFFEu32.to_le_bytes(), Endianness::Little)
                .expect("failed to parse magic version"),
            KernelVersion::Any
        );

        assert_eq!(
            parse_version(&0xFFFF_FFFEu32.to_be_bytes(), Endianness::Big)
                .expect("failed to parse magic version"),
            KernelVersion::Any
        );

        assert_eq!(
            parse_version(&0x040f00u32.to_le_bytes(), Endianness::Little)
                .expect("failed to parse version"),
            KernelVersion::Version(0x040f00)
        );
    }

    #[test]
    fn test_parse_map_defs() {
        let hash = bpf_map_def {
            map_type: BPF_MAP_TYPE_HASH,
            key_size: 4,
            value_size: 8,
            max_entries: 1024,
            map_flags: 1,
        };
        let array = bpf_map_def {
            map_type: BPF_MAP_TYPE_ARRAY,
            key_size: 4,
            value_size: 8,
            max_entries: 10,
            map_flags: 0,
        };
        let mut data = map_def_bytes(&[hash, array]);

        assert_eq!(parse_map_defs(&data, Endianness::Little), vec![hash, array]);

        // a partial trailing record is dropped
        data.extend([0u8; MAP_DEF_SIZE - 1]);
        assert_eq!(parse_map_defs(&data, Endianness::Little).len(), 2);

        assert!(parse_map_defs(&[0u8; MAP_DEF_SIZE - 1], Endianness::Little).is_empty());
    }

    #[test]
    fn test_parse_metadata_section() {
        let le = Endianness::Little;

        assert_matches!(
            parse_metadata_section(&section("license", SHT_PROGBITS, b"GPL\0"), le),
            Ok(Some(MetadataSection::License(license))) if license.to_bytes() == b"GPL"
        );
        assert_matches!(
            parse_metadata_section(&section("version", SHT_PROGBITS, &7u32.to_le_bytes()), le),
            Ok(Some(MetadataSection::Version(KernelVersion::Version(7))))
        );
        assert_matches!(
            parse_metadata_section(&section("version", SHT_PROGBITS, b"abc"), le),
            Err(ParseError::InvalidKernelVersion { .. })
        );
        assert_matches!(
            parse_metadata_section(&section("maps", SHT_PROGBITS, &[0u8; MAP_DEF_SIZE]), le),
            Ok(Some(MetadataSection::Maps(defs))) if defs.len() == 1
        );
        assert_matches!(
            parse_metadata_section(&section(".symtab", SHT_SYMTAB, &[0u8; 24]), le),
            Ok(Some(MetadataSection::SymbolTable))
        );
        assert_matches!(
            parse_metadata_section(&section("kprobe/foo", SHT_PROGBITS, &[0u8; 8]), le),
            Ok(None)
        );
    }
}
