pub mod content_stream;
pub mod image_xobject;
pub mod optimizer;
pub mod reader;
pub mod writer;
