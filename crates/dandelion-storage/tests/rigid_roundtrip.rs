use dandelion_storage::{
    DriveType, ImageError, RigidImage, ADDRESS_MARK, CRC_FLAG, WORDS_PER_TRACK,
};

#[test]
fn save_then_load_round_trips_the_full_grid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");

    let mut image = RigidImage::blank(DriveType::Sa1004);
    // Sprinkle data and tag flags across the grid.
    for cylinder in (0..256).step_by(37) {
        for head in 0..4 {
            image.set_cell(cylinder, head, 0, ADDRESS_MARK | (cylinder as u32));
            image.set_cell(
                cylinder,
                head,
                WORDS_PER_TRACK - 1,
                CRC_FLAG | (head as u32) << 8,
            );
            image.set_cell(cylinder, head, 1234, 0xA5A5);
        }
    }

    image.save(&path).unwrap();
    let loaded = RigidImage::load(&path).unwrap();
    assert_eq!(loaded, image);
}

#[test]
fn load_rejects_wrong_length_and_unknown_type() {
    let dir = tempfile::tempdir().unwrap();

    let short = dir.path().join("short.img");
    std::fs::write(&short, [0u8, 1, 2, 3]).unwrap();
    assert!(matches!(
        RigidImage::load(&short),
        Err(ImageError::Corrupt(_))
    ));

    let bad_type = dir.path().join("badtype.img");
    std::fs::write(&bad_type, [9u8]).unwrap();
    assert!(matches!(
        RigidImage::load(&bad_type),
        Err(ImageError::Corrupt(_))
    ));
}

#[test]
fn resave_overwrites_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");

    let mut image = RigidImage::blank(DriveType::Q2040);
    image.set_cell(0, 0, 0, 0x1111);
    image.save(&path).unwrap();

    image.set_cell(0, 0, 0, 0x2222);
    image.save(&path).unwrap();

    let loaded = RigidImage::load(&path).unwrap();
    assert_eq!(loaded.cell(0, 0, 0), 0x2222);
    // No temp file left behind.
    assert!(!path.with_extension("tmp").exists());
}
