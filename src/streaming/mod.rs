//! Streaming file output for downloaded exports.

mod atomic_writer;

pub use atomic_writer::AtomicFileWriter;
