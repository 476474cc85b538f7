pub mod feed;
pub mod m3u;
pub mod model;

pub use feed::*;
pub use model::*;
