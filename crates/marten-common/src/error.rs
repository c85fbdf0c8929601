//! Error types for MartenDB.

use thiserror::Error;

/// Result type alias using MartenError.
pub type Result<T> = std::result::Result<T, MartenError>;

/// Errors that can occur in MartenDB operations.
#[derive(Debug, Error)]
pub enum MartenError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Page not found: file {file_id}, page {page_no}")]
    PageNotFound { file_id: u32, page_no: u32 },

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("Page full, unable to insert record")]
    PageFull,

    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("End of file")]
    EndOfFile,

    // Type errors
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    // Index errors
    #[error("Bad index info: {0}")]
    BadIndexInfo(String),

    #[error("Bad scan opcodes")]
    BadOpcodes,

    #[error("Bad scan range: low {low} exceeds high {high}")]
    BadScanRange { low: i32, high: i32 },

    #[error("No such key found in index")]
    NoSuchKeyFound,

    #[error("Scan not initialized")]
    ScanNotInitialized,

    #[error("Index scan completed")]
    IndexScanCompleted,

    #[error("B+ tree corrupted: {0}")]
    TreeCorrupted(String),

    // Configuration errors
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let marten_err: MartenError = io_err.into();
        assert!(matches!(marten_err, MartenError::Io(_)));
        assert!(marten_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_storage_errors_display() {
        let err = MartenError::FileNotFound("orders.8".to_string());
        assert_eq!(err.to_string(), "File not found: orders.8");

        let err = MartenError::PageNotFound {
            file_id: 2,
            page_no: 42,
        };
        assert_eq!(err.to_string(), "Page not found: file 2, page 42");

        let err = MartenError::BufferPoolFull;
        assert_eq!(err.to_string(), "Buffer pool full, unable to allocate frame");

        let err = MartenError::RecordTooLarge { size: 9000, max: 8000 };
        assert_eq!(err.to_string(), "Record too large: 9000 bytes (max 8000)");
    }

    #[test]
    fn test_scan_errors_display() {
        assert_eq!(MartenError::BadOpcodes.to_string(), "Bad scan opcodes");
        assert_eq!(
            MartenError::BadScanRange { low: 10, high: 5 }.to_string(),
            "Bad scan range: low 10 exceeds high 5"
        );
        assert_eq!(
            MartenError::NoSuchKeyFound.to_string(),
            "No such key found in index"
        );
        assert_eq!(
            MartenError::ScanNotInitialized.to_string(),
            "Scan not initialized"
        );
        assert_eq!(
            MartenError::IndexScanCompleted.to_string(),
            "Index scan completed"
        );
    }

    #[test]
    fn test_index_errors_display() {
        let err = MartenError::BadIndexInfo("attribute offset mismatch".to_string());
        assert_eq!(err.to_string(), "Bad index info: attribute offset mismatch");

        let err = MartenError::UnsupportedType("FLOAT64".to_string());
        assert_eq!(err.to_string(), "Unsupported type: FLOAT64");

        let err = MartenError::TreeCorrupted("leaf missing".to_string());
        assert_eq!(err.to_string(), "B+ tree corrupted: leaf missing");
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = MartenError::InvalidParameter {
            name: "leaf_slots".to_string(),
            value: "1".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parameter: leaf_slots = 1");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(MartenError::EndOfFile)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MartenError>();
    }
}
