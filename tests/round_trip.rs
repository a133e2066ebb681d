use proptest::prelude::*;
use receipt_archive::codec::Codec;
use receipt_archive::{
    ArchiveError, ArchiveMember, ArchiveReader, CompressedBlock, build_archive, compress,
    decompress, extract_member,
};

/// Deterministic, effectively incompressible bytes.
fn noise(len: usize, mut state: u64) -> Vec<u8> {
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

fn archive_of(primary: &[u8], thumbnail: &[u8]) -> Vec<u8> {
    let codec = Codec::default();
    build_archive(&[
        ArchiveMember::new("image", CompressedBlock::compress(&codec, primary).unwrap()),
        ArchiveMember::new("thumbnail", CompressedBlock::compress(&codec, thumbnail).unwrap()),
    ])
    .unwrap()
}

#[test]
fn test_hello_world_round_trip() {
    let compressed = compress(b"Hello World").unwrap();
    assert!(!compressed.is_empty());
    assert_eq!(decompress(&compressed, 11).unwrap(), b"Hello World");
}

#[test]
fn test_codec_edge_buffers() {
    let all_bytes: Vec<u8> = (0..=255u8).collect();
    for input in [Vec::new(), b"x".to_vec(), all_bytes, noise(70_000, 3)] {
        let compressed = compress(&input).unwrap();
        assert_eq!(decompress(&compressed, input.len() as u32).unwrap(), input);
    }
}

#[test]
fn test_receipt_sized_archive() {
    let image = noise(50_000, 0x9E37_79B9_7F4A_7C15);
    let thumbnail = noise(5_000, 0xD1B5_4A32_D192_ED03);
    let archive = archive_of(&image, &thumbnail);

    let extracted_image = extract_member(&archive, "image").unwrap();
    assert_eq!(extracted_image.len(), 50_000);
    assert_eq!(extracted_image, image);

    let extracted_thumbnail = extract_member(&archive, "thumbnail").unwrap();
    assert_eq!(extracted_thumbnail.len(), 5_000);
    assert_eq!(extracted_thumbnail, thumbnail);
}

#[test]
fn test_truncated_archive_is_invalid() {
    let cases = [
        (noise(50_000, 11), noise(5_000, 12)),
        (vec![0u8; 50_000], vec![0u8; 5_000]),
        (vec![0xFF; 50_000], vec![0xFF; 5_000]),
    ];

    for (primary, thumbnail) in &cases {
        let archive = archive_of(primary, thumbnail);
        let payloads_end = ArchiveReader::new(&archive).entries().unwrap()[1]
            .data_range()
            .end;

        for cut in [archive.len() * 8 / 10, payloads_end] {
            for name in ["image", "thumbnail"] {
                let err = extract_member(&archive[..cut], name).unwrap_err();
                assert!(
                    matches!(err, ArchiveError::InvalidFormat(_)),
                    "{} cut to {} of {}: unexpected {:?}",
                    name,
                    cut,
                    archive.len(),
                    err
                );
            }
        }
    }
}

#[test]
fn test_build_is_deterministic() {
    let image = noise(10_000, 5);
    let thumbnail = noise(1_000, 6);
    assert_eq!(archive_of(&image, &thumbnail), archive_of(&image, &thumbnail));
}

#[test]
fn test_central_directory_is_accurate() {
    let image = noise(3_000, 21);
    let thumbnail = b"tiny".to_vec();
    let archive = archive_of(&image, &thumbnail);

    let reader = ArchiveReader::new(&archive);
    let central = reader.central_directory().unwrap();
    assert_eq!(central.len(), 2);

    assert_eq!(central[0].name, "image");
    assert_eq!(central[0].uncompressed_size, 3_000);
    assert_eq!(central[0].crc32, crc32fast::hash(&image));
    assert_eq!(central[0].lfh_offset, 4);
    assert_eq!(&archive[4..8], b"PK\x03\x04");

    let thumb_offset = central[1].lfh_offset as usize;
    assert_eq!(&archive[thumb_offset..thumb_offset + 4], b"PK\x03\x04");
    assert_eq!(&archive[thumb_offset + 30..thumb_offset + 39], b"thumbnail");
    assert_eq!(central[1].crc32, crc32fast::hash(&thumbnail));
}

#[test]
fn test_substring_names_are_distinct() {
    let codec = Codec::default();
    let archive = build_archive(&[
        ArchiveMember::new("thumbnail_image", CompressedBlock::compress(&codec, b"a").unwrap()),
        ArchiveMember::new("image", CompressedBlock::compress(&codec, b"b").unwrap()),
    ])
    .unwrap();

    assert_eq!(extract_member(&archive, "image").unwrap(), b"b");
    assert_eq!(extract_member(&archive, "thumbnail_image").unwrap(), b"a");
}

proptest! {
    #[test]
    fn prop_codec_round_trip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let compressed = compress(&data).unwrap();
        prop_assert_eq!(decompress(&compressed, data.len() as u32).unwrap(), data);
    }

    #[test]
    fn prop_archive_round_trip(
        primary in proptest::collection::vec(any::<u8>(), 0..4096),
        thumbnail in proptest::collection::vec(any::<u8>(), 0..1024),
    ) {
        let archive = archive_of(&primary, &thumbnail);
        prop_assert_eq!(extract_member(&archive, "image").unwrap(), primary);
        prop_assert_eq!(extract_member(&archive, "thumbnail").unwrap(), thumbnail);
    }

    #[test]
    fn prop_missing_member_never_panics(
        primary in proptest::collection::vec(any::<u8>(), 0..512),
        name in "[a-z]{1,12}",
    ) {
        prop_assume!(name != "image" && name != "thumbnail");
        let archive = archive_of(&primary, b"thumb");
        prop_assert!(
            matches!(
                extract_member(&archive, &name),
                Err(ArchiveError::MemberNotFound(_))
            ),
            "expected MemberNotFound"
        );
    }

    #[test]
    fn prop_small_expected_size_stays_in_bounds(
        data in proptest::collection::vec(any::<u8>(), 1..2048),
        cut in 1usize..2048,
    ) {
        let expected = cut.min(data.len());
        let compressed = compress(&data).unwrap();
        let out = decompress(&compressed, expected as u32).unwrap();
        prop_assert_eq!(out.len(), expected);
        prop_assert_eq!(&out[..], &data[..expected]);
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = extract_member(&data, "image");
        let _ = ArchiveReader::new(&data).central_directory();
    }
}
