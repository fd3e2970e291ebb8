//! Integration tests for shared memory segments

use segdir::{
    memory::{AccessMode, BackingType, RegionConfig, Segment},
    SegdirError,
};
use tempfile::TempDir;

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config(dir: &TempDir) -> RegionConfig {
        RegionConfig::new("segtest").with_base_dir(dir.path())
    }

    #[test]
    fn test_create_write_attach_read() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let mut segment = Segment::create(&config, 10, 64).unwrap();
        assert_eq!(segment.key(), 10);
        assert_eq!(segment.size(), 64);
        assert_eq!(segment.mode(), AccessMode::CreateExclusive);
        assert_eq!(segment.write(8, b"payload").unwrap(), 7);

        let reader = Segment::attach_existing(&config, 10, 0).unwrap();
        assert_eq!(reader.size(), 64);
        assert_eq!(reader.read(8, 7).unwrap(), b"payload");
        assert_eq!(reader.read(0, 8).unwrap(), vec![0u8; 8]);
    }

    #[test]
    fn test_create_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let _first = Segment::create(&config, 11, 16).unwrap();
        let second = Segment::create(&config, 11, 16);
        assert!(matches!(second, Err(SegdirError::SegmentExists { key: 11 })));
    }

    #[test]
    fn test_attach_missing_segment() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        assert!(matches!(
            Segment::attach_existing(&config, 12, 0),
            Err(SegdirError::SegmentNotFound { key: 12 })
        ));
        assert!(matches!(
            Segment::attach_writable(&config, 12, 0),
            Err(SegdirError::SegmentNotFound { key: 12 })
        ));
        assert!(!Segment::exists(&config, 12));
    }

    #[test]
    fn test_zero_size_create_rejected() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        assert!(matches!(
            Segment::create(&config, 13, 0),
            Err(SegdirError::InvalidParameter { .. })
        ));
        assert!(!Segment::exists(&config, 13));
    }

    #[test]
    fn test_bounds_checks() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let mut segment = Segment::create(&config, 14, 10).unwrap();
        assert!(segment.write(0, &[1u8; 10]).is_ok());
        assert!(matches!(
            segment.write(5, &[1u8; 6]),
            Err(SegdirError::SegmentOutOfBounds { offset: 5, len: 6, size: 10 })
        ));
        assert!(matches!(
            segment.read(10, 1),
            Err(SegdirError::SegmentOutOfBounds { .. })
        ));
        assert!(matches!(
            segment.read(usize::MAX, 2),
            Err(SegdirError::SegmentOutOfBounds { .. })
        ));
        assert_eq!(segment.read(10, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_attach_with_length() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let mut segment = Segment::create(&config, 15, 32).unwrap();
        segment.write(0, b"abcdef").unwrap();

        let view = Segment::attach_existing(&config, 15, 3).unwrap();
        assert_eq!(view.size(), 3);
        assert_eq!(view.read(0, 3).unwrap(), b"abc");
        assert!(view.read(0, 4).is_err());

        assert!(matches!(
            Segment::attach_existing(&config, 15, 33),
            Err(SegdirError::SegmentOutOfBounds { len: 33, size: 32, .. })
        ));
    }

    #[test]
    fn test_read_only_attach_cannot_write() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let _segment = Segment::create(&config, 16, 8).unwrap();
        let mut reader = Segment::attach_existing(&config, 16, 0).unwrap();
        assert!(matches!(reader.write(0, b"x"), Err(SegdirError::Resource { .. })));

        let mut writer = Segment::attach_writable(&config, 16, 0).unwrap();
        assert_eq!(writer.mode(), AccessMode::AttachWritable);
        assert!(writer.write(0, b"x").is_ok());
    }

    #[test]
    fn test_close_invalidates_handle() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let mut segment = Segment::create(&config, 17, 8).unwrap();
        segment.close();
        assert!(!segment.is_open());
        assert!(matches!(segment.read(0, 1), Err(SegdirError::NotOpen { key: 17 })));
        assert!(matches!(segment.write(0, b"x"), Err(SegdirError::NotOpen { key: 17 })));

        // Closing does not remove the segment
        assert!(Segment::exists(&config, 17));
    }

    #[test]
    fn test_delete_removes_segment() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        let mut segment = Segment::create(&config, 18, 8).unwrap();
        segment.delete().unwrap();
        assert!(!segment.is_open());
        assert!(matches!(
            Segment::attach_existing(&config, 18, 0),
            Err(SegdirError::SegmentNotFound { .. })
        ));

        // The key can be reused once deleted
        let recreated = Segment::create(&config, 18, 4).unwrap();
        assert_eq!(recreated.size(), 4);
    }

    #[test]
    fn test_remove_missing_segment() {
        let dir = TempDir::new().unwrap();
        let config = file_config(&dir);

        assert!(matches!(
            Segment::remove(&config, 19),
            Err(SegdirError::SegmentNotFound { key: 19 })
        ));
    }

    #[test]
    fn test_posix_shm_segment() {
        let config = RegionConfig::new(format!("segdir-segtest-{}", std::process::id()))
            .with_backing_type(BackingType::PosixShm);
        let _ = Segment::remove(&config, 1);

        let mut segment = Segment::create(&config, 1, 128).unwrap();
        segment.write(0, b"shared").unwrap();
        assert!(matches!(
            Segment::create(&config, 1, 128),
            Err(SegdirError::SegmentExists { .. })
        ));

        let reader = Segment::attach_existing(&config, 1, 0).unwrap();
        assert_eq!(reader.size(), 128);
        assert_eq!(reader.read(0, 6).unwrap(), b"shared");
        drop(reader);

        segment.delete().unwrap();
        assert!(!Segment::exists(&config, 1));
    }
}
