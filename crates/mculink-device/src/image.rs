use bytes::Buf;

use mculink_wire::WireError;

use crate::error::Result;

/// Wire size of an image header.
pub const IMAGE_HEADER_SIZE: usize = 36;

/// The fixed header at the front of a loaded module or application
/// image. Offsets are relative to the start of the image; all fields
/// little-endian.
///
/// This is the handoff contract only; relocation and entry into the
/// image belong to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// Entry point offset. Non-zero for applications, zero for modules.
    pub entry: u32,
    pub module_offset: u32,
    pub module_size: u32,
    pub data_offset: u32,
    pub data_size: u32,
    pub bss_offset: u32,
    pub bss_size: u32,
    pub got_offset: u32,
    pub got_size: u32,
}

impl ImageHeader {
    /// Parse the header from the front of a staged image.
    pub fn parse(image: &[u8]) -> Result<ImageHeader> {
        if image.len() < IMAGE_HEADER_SIZE {
            return Err(WireError::Truncated.into());
        }
        let mut buf = &image[..IMAGE_HEADER_SIZE];
        Ok(ImageHeader {
            entry: buf.get_u32_le(),
            module_offset: buf.get_u32_le(),
            module_size: buf.get_u32_le(),
            data_offset: buf.get_u32_le(),
            data_size: buf.get_u32_le(),
            bss_offset: buf.get_u32_le(),
            bss_size: buf.get_u32_le(),
            got_offset: buf.get_u32_le(),
            got_size: buf.get_u32_le(),
        })
    }

    /// An application carries an entry point; a module does not.
    pub fn is_application(&self) -> bool {
        self.entry != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(header: &ImageHeader) -> Vec<u8> {
        let fields = [
            header.entry,
            header.module_offset,
            header.module_size,
            header.data_offset,
            header.data_size,
            header.bss_offset,
            header.bss_size,
            header.got_offset,
            header.got_size,
        ];
        fields.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn parse_roundtrip() {
        let header = ImageHeader {
            entry: 0x91,
            module_offset: 0x24,
            module_size: 0x40,
            data_offset: 0x64,
            data_size: 0x10,
            bss_offset: 0x74,
            bss_size: 0x20,
            got_offset: 0x94,
            got_size: 0x08,
        };
        let mut bytes = encode(&header);
        bytes.extend_from_slice(&[0xAB; 16]); // trailing image body

        assert_eq!(ImageHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn entry_discriminates_application_from_module() {
        let mut header = ImageHeader::parse(&[0u8; IMAGE_HEADER_SIZE]).unwrap();
        assert!(!header.is_application());
        header.entry = 0x200;
        assert!(header.is_application());
    }

    #[test]
    fn short_image_rejected() {
        assert!(ImageHeader::parse(&[0u8; 10]).is_err());
    }
}
