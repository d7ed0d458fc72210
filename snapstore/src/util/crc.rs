const MASK_DELTA: u32 = 0xa282ead8;

/// Masked crc32 of `data`, so a crc stored inside checksummed bytes does not
/// checksum to itself.
pub fn masked_crc(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    crc_mask(hasher.finalize())
}

pub fn crc_mask(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

pub fn crc_unmask(crc_masked: u32) -> u32 {
    let rot = crc_masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn mask() {
        let raw = crc32fast::hash(b"resnet");
        assert_ne!(crc_mask(raw), raw);
        assert_eq!(crc_unmask(masked_crc(b"resnet")), raw);
        assert_ne!(masked_crc(b"resnet"), masked_crc(b"resnes"));
    }
}
