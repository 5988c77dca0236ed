//! Work units making up the read → split → write pipeline.

mod reader;
mod splitter;
mod writer;

pub use reader::Reader;
pub use splitter::Splitter;
pub use writer::Writer;
