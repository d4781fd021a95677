pub mod grouper;
pub mod labels;

pub use grouper::{DecodeError, Entry, Grouper, StreamGroups, StreamKey, Watermark};
pub use labels::{Label, LabelSchema, LabelTypeError};
