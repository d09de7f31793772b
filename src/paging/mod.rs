//! Paging Strategies
//!
//! Pagers track where the next page starts and commit or roll back each
//! advance depending on how the fetch went.

mod cursor;
mod offset;
mod pager;

pub use cursor::*;
pub use offset::*;
pub use pager::*;
