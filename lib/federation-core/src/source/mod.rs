//! The per-endpoint triple-source façade (§4.1): a uniform `evaluate`/`ask`/`get_statements`
//! surface over both remote SPARQL endpoints and co-located local stores.

pub mod buffer;
pub mod local;
pub mod remote;
mod trait_def;

pub use local::LocalTripleSource;
pub use remote::RemoteTripleSource;
pub use trait_def::{BindingStream, TripleSource, TripleStream};
