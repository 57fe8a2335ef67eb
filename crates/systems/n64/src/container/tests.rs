use super::kinds::{
    ANIMATIONFS_LAYOUT, HVQFS_LAYOUT, MAINFS_LAYOUT, STRINGS_FLAT_LAYOUT, STRINGS_NESTED_LAYOUT,
};
use super::*;
use crate::test_support::{ShortCodec, ToyCodec};
use romfs_core::RawCodec;

const RAW: PackOptions = PackOptions {
    force_decompressed: false,
};
const FORCE: PackOptions = PackOptions {
    force_decompressed: true,
};

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn pack_to_vec(container: &IndexedContainer, options: PackOptions) -> Vec<u8> {
    let len = container.byte_length(options);
    let mut buf = vec![0xEE; len];
    let next = container.pack(&mut buf, 0, options).unwrap();
    assert_eq!(next, len);
    buf
}

fn sample_mainfs() -> IndexedContainer {
    let mut fs = IndexedContainer::new(MAINFS_LAYOUT);
    fs.write(0, 0, b"first file".to_vec()).unwrap();
    fs.write_compressed(0, 1, CompressionTag::LZSS, vec![0xAB; 40], &ToyCodec)
        .unwrap();
    fs.write(1, 0, vec![1, 2, 3]).unwrap();
    fs.write_compressed(2, 0, CompressionTag::SLIDE, vec![7; 9], &ToyCodec)
        .unwrap();
    fs
}

#[test]
fn empty_container_is_just_a_count() {
    let fs = IndexedContainer::new(MAINFS_LAYOUT);
    assert_eq!(fs.byte_length(RAW), 4);

    let bytes = pack_to_vec(&fs, RAW);
    assert_eq!(bytes, vec![0, 0, 0, 0]);

    let back = IndexedContainer::extract(MAINFS_LAYOUT, &bytes, 0, &RawCodec).unwrap();
    assert_eq!(back.directory_count(), 0);
}

#[test]
fn handmade_mainfs_roundtrip() {
    let mut bytes = words(&[1, 8, 1, 8, 3, 0]);
    bytes.extend_from_slice(b"abc");
    bytes.resize(32, 0);

    let fs = IndexedContainer::extract(MAINFS_LAYOUT, &bytes, 0, &RawCodec).unwrap();
    assert_eq!(fs.directory_count(), 1);
    assert_eq!(fs.entry_count(0), Some(1));
    assert_eq!(fs.get(0, 0), Some(&b"abc"[..]));
    assert_eq!(fs.byte_length(RAW), 32);
    assert_eq!(pack_to_vec(&fs, RAW), bytes);
}

#[test]
fn handmade_flat_strings_roundtrip() {
    let mut bytes = words(&[3, 16, 18, 21]);
    bytes.extend_from_slice(b"hiabc");
    bytes.resize(32, 0);

    let strings = IndexedContainer::extract(STRINGS_FLAT_LAYOUT, &bytes, 0, &RawCodec).unwrap();
    assert_eq!(strings.directory_count(), 1);
    // The end offset is not an entry
    assert_eq!(strings.entry_count(0), Some(2));
    assert_eq!(strings.get(0, 0), Some(&b"hi"[..]));
    assert_eq!(strings.get(0, 1), Some(&b"abc"[..]));
    assert_eq!(pack_to_vec(&strings, RAW), bytes);
}

#[test]
fn extract_at_offset_inside_larger_buffer() {
    let mut rom = vec![0x55; 0x40];
    let mut region = words(&[1, 8, 1, 8, 3, 0]);
    region.extend_from_slice(b"xyz");
    region.resize(32, 0);
    rom.extend_from_slice(&region);
    rom.extend_from_slice(&[0x66; 16]);

    let fs = IndexedContainer::extract(MAINFS_LAYOUT, &rom, 0x40, &RawCodec).unwrap();
    assert_eq!(fs.get(0, 0), Some(&b"xyz"[..]));
}

#[test]
fn hvq_sentinels_and_offsets() {
    let mut hvq = IndexedContainer::new(HVQFS_LAYOUT);
    hvq.write(0, 0, vec![0xA1; 3]).unwrap();
    hvq.write(1, 0, vec![0xB1; 5]).unwrap();
    hvq.write(1, 1, vec![0xC1; 2]).unwrap();

    let bytes = pack_to_vec(&hvq, RAW);
    assert_eq!(bytes.len(), 56);
    // Directory table: count includes the end offset
    assert_eq!(&bytes[0..16], &words(&[3, 16, 32, 56])[..]);
    assert_eq!(&bytes[16..28], &words(&[2, 12, 15])[..]);
    assert_eq!(&bytes[32..48], &words(&[3, 16, 21, 23])[..]);
    assert_eq!(&bytes[28..31], &[0xA1; 3]);
    assert_eq!(bytes[31], 0);
    assert_eq!(&bytes[48..53], &[0xB1; 5]);
    assert_eq!(&bytes[53..55], &[0xC1; 2]);

    let back = IndexedContainer::extract(HVQFS_LAYOUT, &bytes, 0, &RawCodec).unwrap();
    assert_eq!(back, hvq);
}

#[test]
fn compressed_entries_keep_their_blob() {
    let fs = sample_mainfs();
    let bytes = pack_to_vec(&fs, RAW);

    let back = IndexedContainer::extract(MAINFS_LAYOUT, &bytes, 0, &ToyCodec).unwrap();
    let entry = back.entry(0, 1).unwrap();
    assert_eq!(entry.tag(), CompressionTag::LZSS);
    assert_eq!(entry.data(), &[0xAB; 40][..]);
    assert_eq!(entry.compressed_blob(), Some(&[40u8, 0xAB, 0][..]));
    assert_eq!(back.get(2, 0), Some(&[7u8; 9][..]));

    // pack(extract(bytes)) == bytes
    assert_eq!(pack_to_vec(&back, RAW), bytes);
    assert_eq!(back, fs);
}

#[test]
fn sliding_window_tags_repeat_the_size() {
    let mut fs = IndexedContainer::new(MAINFS_LAYOUT);
    fs.write_compressed(0, 0, CompressionTag::FSLIDE, vec![3; 20], &ToyCodec)
        .unwrap();
    let bytes = pack_to_vec(&fs, RAW);
    // dir table (8) + entry table (8), then the entry header
    assert_eq!(&bytes[16..28], &words(&[20, 4, 20])[..]);
    assert_eq!(&bytes[28..31], &[20, 3, 0]);
    assert_eq!(fs.byte_length(RAW), 32);
}

#[test]
fn write_drops_stale_compressed_blob() {
    let mut fs = IndexedContainer::new(MAINFS_LAYOUT);
    fs.write_compressed(0, 0, CompressionTag::RLE, vec![0; 64], &ToyCodec)
        .unwrap();
    // 8 + 8 of tables, 8 header + 3 blob padded to 12, dir padded to 16
    assert_eq!(fs.byte_length(RAW), 32);

    fs.write(0, 0, vec![9; 64]).unwrap();
    let entry = fs.entry(0, 0).unwrap();
    assert_eq!(entry.tag(), CompressionTag::NONE);
    assert_eq!(entry.compressed_blob(), None);
    assert_eq!(fs.byte_length(RAW), 96);

    let bytes = pack_to_vec(&fs, RAW);
    assert_eq!(&bytes[16..24], &words(&[64, 0])[..]);
    assert_eq!(&bytes[24..88], &[9u8; 64][..]);
}

#[test]
fn force_decompressed_writes_raw_entries() {
    let fs = sample_mainfs();
    assert!(fs.byte_length(FORCE) > fs.byte_length(RAW));

    let bytes = pack_to_vec(&fs, FORCE);
    let back = IndexedContainer::extract(MAINFS_LAYOUT, &bytes, 0, &RawCodec).unwrap();
    for (dir, entries) in fs.directories().enumerate() {
        for (index, entry) in entries.iter().enumerate() {
            let original = entry.as_ref().unwrap();
            let rebuilt = back.entry(dir, index).unwrap();
            assert_eq!(rebuilt.tag(), CompressionTag::NONE);
            assert_eq!(rebuilt.data(), original.data());
        }
    }
}

#[test]
fn sparse_writes_create_placeholders() {
    let mut fs = IndexedContainer::new(MAINFS_LAYOUT);
    fs.write(1, 2, b"late".to_vec()).unwrap();
    assert_eq!(fs.directory_count(), 2);
    assert_eq!(fs.entry_count(0), Some(0));
    assert_eq!(fs.entry_count(1), Some(3));
    assert_eq!(fs.get(1, 0), None);

    let bytes = pack_to_vec(&fs, RAW);
    let back = IndexedContainer::extract(MAINFS_LAYOUT, &bytes, 0, &RawCodec).unwrap();
    assert_eq!(back.entry_count(1), Some(3));
    // Placeholders come back as empty raw entries
    assert_eq!(back.get(1, 0), Some(&[][..]));
    assert_eq!(back.entry(1, 1).unwrap().tag(), CompressionTag::NONE);
    assert_eq!(back.get(1, 2), Some(&b"late"[..]));
    assert_eq!(pack_to_vec(&back, RAW), bytes);
}

#[test]
fn clear_entry_leaves_placeholder() {
    let mut hvq = IndexedContainer::new(HVQFS_LAYOUT);
    hvq.write(0, 0, vec![1; 4]).unwrap();
    hvq.write(0, 1, vec![2; 4]).unwrap();
    hvq.clear_entry(0, 0);
    assert_eq!(hvq.entry_count(0), Some(2));
    assert_eq!(hvq.get(0, 0), None);

    let bytes = pack_to_vec(&hvq, RAW);
    let back = IndexedContainer::extract(HVQFS_LAYOUT, &bytes, 0, &RawCodec).unwrap();
    assert_eq!(back.get(0, 0), Some(&[][..]));
    assert_eq!(back.get(0, 1), Some(&[2u8; 4][..]));
}

#[test]
fn length_contract_holds_for_every_layout() {
    let layouts = [
        MAINFS_LAYOUT,
        STRINGS_FLAT_LAYOUT,
        STRINGS_NESTED_LAYOUT,
        HVQFS_LAYOUT,
        ANIMATIONFS_LAYOUT,
    ];
    for layout in layouts {
        let mut container = IndexedContainer::new(layout);
        for dir in 0..3usize {
            if layout.nesting == Nesting::Flat && dir > 0 {
                break;
            }
            for entry in 0..5usize {
                let len = (dir * 7 + entry * 5) % 13;
                if entry == 3 {
                    continue;
                }
                container
                    .write(dir, entry, vec![(dir + entry) as u8; len])
                    .unwrap();
            }
        }
        if layout.entries == EntryFormat::Typed {
            container
                .write_compressed(0, 3, CompressionTag::RLE, vec![4; 30], &ToyCodec)
                .unwrap();
        }

        for options in [RAW, FORCE] {
            let len = container.byte_length(options);
            let mut buf = vec![0u8; len + 9];
            let next = container.pack(&mut buf, 5, options).unwrap();
            assert_eq!(next, 5 + len, "{:?}", layout);
            assert!(buf[next..].iter().all(|&b| b == 0));
        }

        let bytes = pack_to_vec(&container, RAW);
        let back = IndexedContainer::extract(layout, &bytes, 0, &ToyCodec).unwrap();
        assert_eq!(pack_to_vec(&back, RAW), bytes, "{:?}", layout);
    }
}

#[test]
fn flat_container_rejects_other_directories() {
    let mut strings = IndexedContainer::new(STRINGS_FLAT_LAYOUT);
    assert!(matches!(
        strings.write(1, 0, vec![]),
        Err(ContainerError::InvalidSlot { dir: 1 })
    ));
    assert_eq!(strings.directory_count(), 1);
}

#[test]
fn bare_entries_cannot_be_compressed() {
    let mut hvq = IndexedContainer::new(HVQFS_LAYOUT);
    let err = hvq
        .write_compressed(0, 0, CompressionTag::LZSS, vec![1, 2], &ToyCodec)
        .unwrap_err();
    assert!(matches!(err, ContainerError::CompressionUnsupported { .. }));
    assert_eq!(hvq.directory_count(), 0);
}

#[test]
fn decompressed_size_mismatch_is_fatal() {
    let bytes = pack_to_vec(&sample_mainfs(), RAW);
    let err = IndexedContainer::extract(MAINFS_LAYOUT, &bytes, 0, &ShortCodec).unwrap_err();
    assert!(matches!(
        err,
        ContainerError::DecompressedSizeMismatch {
            dir: 0,
            entry: 1,
            expected: 40,
            actual: 39
        }
    ));
}

#[test]
fn unknown_tag_surfaces_codec_error() {
    let bytes = pack_to_vec(&sample_mainfs(), RAW);
    let err = IndexedContainer::extract(MAINFS_LAYOUT, &bytes, 0, &RawCodec).unwrap_err();
    assert!(matches!(err, ContainerError::Codec(_)));
}

#[test]
fn truncated_region_is_reported() {
    let bytes = pack_to_vec(&sample_mainfs(), RAW);
    let cut = &bytes[..bytes.len() / 2];
    let err = IndexedContainer::extract(MAINFS_LAYOUT, cut, 0, &ToyCodec).unwrap_err();
    assert!(matches!(err, ContainerError::Truncated { .. }));

    // A count that promises more offsets than exist
    let bogus = words(&[0x4000_0000]);
    assert!(IndexedContainer::extract(MAINFS_LAYOUT, &bogus, 0, &RawCodec).is_err());
    assert!(IndexedContainer::extract(MAINFS_LAYOUT, &bogus, 64, &RawCodec).is_err());
}

#[test]
fn pack_into_short_buffer_fails() {
    let fs = sample_mainfs();
    let mut buf = vec![0u8; fs.byte_length(RAW) - 1];
    assert!(matches!(
        fs.pack(&mut buf, 0, RAW),
        Err(ContainerError::Truncated { .. })
    ));
}

#[test]
fn nested_strings_roundtrip_per_locale() {
    let mut strings = IndexedContainer::new(STRINGS_NESTED_LAYOUT);
    for locale in 0..3usize {
        for index in 0..4usize {
            let text = format!("msg {} in locale {}", index, locale);
            strings
                .write_compressed(locale, index, CompressionTag::LZSS, text.into_bytes(), &ToyCodec)
                .unwrap();
        }
    }
    let bytes = pack_to_vec(&strings, RAW);
    let back = IndexedContainer::extract(STRINGS_NESTED_LAYOUT, &bytes, 0, &ToyCodec).unwrap();
    assert_eq!(back.get(2, 3), Some(&b"msg 3 in locale 2"[..]));
    assert_eq!(back, strings);
}
