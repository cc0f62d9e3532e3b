pub mod train;
pub mod util;
