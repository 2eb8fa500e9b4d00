// Core modules for the tuple space server
pub mod protocol; // length-prefixed codec + Request/Response types
pub mod storage; // Dict: the raw key -> value map
pub mod stats; // counters, snapshots and the periodic reporter
pub mod space; // TupleSpace: Dict + Stats behind one guard
pub mod net; // bind_listener + Server (thread per connection)
pub mod client; // request-file client
pub mod cli; // command line front end
pub mod error;

// Re-export the public surface for easier access
pub use error::*;
pub use protocol::*;
pub use storage::*;
pub use stats::*;
pub use space::*;
pub use net::*;
