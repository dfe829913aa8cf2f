pub mod error;
pub mod money;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;
