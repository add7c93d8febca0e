//! Script front end: segmentation, value typing and variable scopes

pub mod resolver;
pub mod segmenter;
pub mod value;
pub mod variables;

pub use resolver::{parse_datetime, parse_number, Resolver};
pub use segmenter::{segment_script, strip_code_fence, ScriptLine, Segment};
pub use value::{Keyword, Payload, Value, ValueKind};
pub use variables::{GlobalVariables, VariableStore};
