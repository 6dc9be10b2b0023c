pub mod error;
pub mod value;

pub use error::{Result, TrackError};
pub use value::{DataType, Value};

pub type Row = Vec<Value>;
