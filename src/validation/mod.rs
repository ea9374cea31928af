//! Pre-upload validation of import files.

pub mod csv_validator;

pub use csv_validator::{
    validate, CsvValidationError, CsvValidationResult, CsvValidationWarning,
    MAX_RECORDS_TO_VALIDATE, VALIDATION_SAMPLE_SIZE,
};
