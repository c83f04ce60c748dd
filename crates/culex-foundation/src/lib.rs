pub mod error;
pub mod shutdown;
pub mod state;

pub use error::*;
pub use shutdown::*;
pub use state::*;
