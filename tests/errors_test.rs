#[cfg(test)]
mod error_tests {
    use crabdvr::avi::ClipName;
    use crabdvr::errors::DvrError;
    use crabdvr::DvrConfig;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_dvr_error_initialization() {
        let error = DvrError::InitializationError("Test init error".to_string());
        assert!(error.to_string().contains("Initialization error"));
        assert!(error.to_string().contains("Test init error"));
    }

    #[test]
    fn test_dvr_error_playback_refused() {
        let error = DvrError::PlaybackRefused("capture in progress".to_string());
        assert_eq!(error.to_string(), "Playback refused: capture in progress");
    }

    #[test]
    fn test_dvr_error_debug_format() {
        let error = DvrError::MuxingError("Debug test".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("MuxingError"));
        assert!(debug_str.contains("Debug test"));
    }

    #[test]
    fn test_all_error_variant_messages() {
        let test_cases = vec![
            (
                DvrError::InitializationError("test".to_string()),
                "Initialization error",
            ),
            (
                DvrError::ConfigError("test".to_string()),
                "Configuration error",
            ),
            (DvrError::StorageError("test".to_string()), "Storage error"),
            (DvrError::MuxingError("test".to_string()), "Muxing error"),
            (
                DvrError::PlaybackRefused("test".to_string()),
                "Playback refused",
            ),
            (DvrError::PlaybackError("test".to_string()), "Playback error"),
            (
                DvrError::InvalidFilename("test".to_string()),
                "Invalid clip file name",
            ),
        ];

        for (error, expected_prefix) in test_cases {
            let display = error.to_string();
            assert!(
                display.starts_with(expected_prefix),
                "Error '{}' should start with '{}'",
                display,
                expected_prefix
            );
            assert!(display.contains("test"));
            assert!(error.source().is_none());
        }
    }

    #[test]
    fn test_io_error_converts_and_keeps_source() {
        fn open_card() -> Result<(), DvrError> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no card"))?;
            Ok(())
        }

        let error = open_card().unwrap_err();
        assert!(matches!(error, DvrError::IoError(_)));
        assert!(error.to_string().contains("no card"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DvrError::InitializationError("clock".to_string()).is_fatal());
        assert!(DvrError::ConfigError("ram".to_string()).is_fatal());
        assert!(!DvrError::StorageError("full".to_string()).is_fatal());
        assert!(!DvrError::PlaybackRefused("busy".to_string()).is_fatal());
        assert!(!DvrError::IoError(io::Error::new(io::ErrorKind::Other, "x")).is_fatal());
    }

    #[test]
    fn test_bad_clip_names_report_the_path() {
        let error = ClipName::parse("/20240315/holiday.avi").unwrap_err();
        match error {
            DvrError::InvalidFilename(path) => assert_eq!(path, "/20240315/holiday.avi"),
            other => panic!("Expected InvalidFilename, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_config_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crabdvr.toml");
        std::fs::write(&path, "[recording]\nmin_seconds = \"thirty\"\n").unwrap();

        let error = DvrConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(error, DvrError::ConfigError(_)));
        assert!(error.to_string().contains("Failed to parse config file"));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<DvrError>();
        assert_sync::<DvrError>();
    }

    #[test]
    fn test_error_chaining_patterns() {
        fn open_clip() -> Result<(), DvrError> {
            Err(DvrError::StorageError("card removed".to_string()))
        }

        fn start_playback() -> Result<u32, DvrError> {
            open_clip()?;
            Ok(0)
        }

        match start_playback() {
            Err(DvrError::StorageError(msg)) => assert_eq!(msg, "card removed"),
            _ => panic!("Expected StorageError to propagate"),
        }

        let boxed: Box<dyn Error> = Box::new(DvrError::PlaybackError("read".to_string()));
        assert!(boxed.to_string().contains("read"));
    }
}
