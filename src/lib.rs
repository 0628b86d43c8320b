pub mod backend;
pub mod double;
pub mod error;
pub mod estimate;
pub mod intersect;
pub mod leaf;
pub mod mem;
pub mod phrase;
pub mod position;
pub mod postlist;
pub mod query;
pub mod select;
pub mod stats;
pub mod submatch;
pub mod union;
pub mod util;
pub mod value_range;
pub mod weight;

pub use error::Error;
pub use postlist::{DocCount, DocId, PostList, TermCount, TermFreqs, TermPos, TreeHandle, Wdf};
pub use query::Query;
pub use submatch::SubMatch;
