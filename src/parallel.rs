//! Parallel chunk evaluation using Rayon
//!
//! Enable with the `parallel` feature (on by default):
//! ```toml
//! femsym = { version = "0.1", features = ["parallel"] }
//! ```
//!
//! Chunks only read shared state: the compiled program, the bindings and
//! the results of uniform steps. Each chunk owns its point-dependent slots.

use std::ops::Range;

use rayon::prelude::*;

/// Run `f` on every chunk on the rayon pool, keeping chunk order.
///
/// If several chunks fail, which error is returned is unspecified.
pub(crate) fn map_chunks<T, E, F>(chunks: &[Range<usize>], f: F) -> Result<Vec<T>, E>
where
    T: Send,
    E: Send,
    F: Fn(&Range<usize>) -> Result<T, E> + Sync + Send,
{
    chunks.par_iter().map(f).collect()
}
