#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use self::unix::{allocate, deallocate, max_size, min_size, page_size};

#[cfg(not(unix))]
compile_error!("memory-pool only supports unix targets");
